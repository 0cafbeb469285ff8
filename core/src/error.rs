use std::path::PathBuf;

use thiserror::Error;

/// Record store failures that reach the host.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record store unavailable at {location}")]
    Unavailable {
        location: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("could not create a scratch store")]
    Scratch(#[source] std::io::Error),

    #[error("record store is running in degraded read-only mode")]
    ReadOnly,
}

/// Photo asset failures surfaced to the caller.
///
/// Missing files are not an error: loads return `None` and deletes succeed.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("could not create photo directory {}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid image data: {0}")]
    InvalidImage(#[source] image::ImageError),

    #[error("failed to write {}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
