//! Photo assets on disk: one directory holding `<id>.jpg` and
//! `<id>_thumb.jpg` per entry.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::AssetError;

pub const PHOTOS_DIR_NAME: &str = "FitzyPhotos";
pub const DEFAULT_PHOTO_QUALITY: u8 = 85;
pub const DEFAULT_THUMBNAIL_QUALITY: u8 = 80;
pub const DEFAULT_THUMBNAIL_MAX_DIMENSION: u32 = 320;

#[must_use]
pub fn photo_filename(entry_id: Uuid) -> String {
    format!("{entry_id}.jpg")
}

#[must_use]
pub fn thumbnail_filename(entry_id: Uuid) -> String {
    format!("{entry_id}_thumb.jpg")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoOptions {
    /// JPEG quality, 1-100.
    pub quality: u8,
    pub also_save_thumbnail: bool,
    pub thumbnail_quality: u8,
    /// Longest side of the thumbnail. Smaller images are not upscaled.
    pub thumbnail_max_dimension: u32,
}

impl Default for PhotoOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_PHOTO_QUALITY,
            also_save_thumbnail: true,
            thumbnail_quality: DEFAULT_THUMBNAIL_QUALITY,
            thumbnail_max_dimension: DEFAULT_THUMBNAIL_MAX_DIMENSION,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssetStore {
    dir: PathBuf,
}

impl AssetStore {
    /// The directory is created lazily on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Encodes `bytes` as `<entry_id>.jpg` and, if asked, a downscaled
    /// `<entry_id>_thumb.jpg`. Returns the photo filename to store on the
    /// entry. A failed thumbnail is logged and does not fail the save.
    pub fn save_image(
        &self,
        bytes: &[u8],
        entry_id: Uuid,
        options: &PhotoOptions,
    ) -> Result<String, AssetError> {
        let image = image::load_from_memory(bytes).map_err(AssetError::InvalidImage)?;
        self.ensure_directory()?;

        let filename = photo_filename(entry_id);
        self.write_jpeg(&image, &filename, options.quality)?;

        if options.also_save_thumbnail {
            let thumb = downscale(image, options.thumbnail_max_dimension);
            if let Err(err) =
                self.write_jpeg(&thumb, &thumbnail_filename(entry_id), options.thumbnail_quality)
            {
                warn!(entry = %entry_id, "Thumbnail not saved: {err}");
            }
        }
        Ok(filename)
    }

    /// Writes `bytes` as the entry's thumbnail without resizing.
    pub fn save_thumbnail(&self, bytes: &[u8], entry_id: Uuid, quality: u8) -> Result<String, AssetError> {
        let image = image::load_from_memory(bytes).map_err(AssetError::InvalidImage)?;
        self.ensure_directory()?;
        let filename = thumbnail_filename(entry_id);
        self.write_jpeg(&image, &filename, quality)?;
        Ok(filename)
    }

    #[must_use]
    pub fn load_image(&self, filename: &str) -> Option<Vec<u8>> {
        let path = self.path_for(filename)?;
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                debug!(path = %path.display(), "Photo not loaded: {err}");
                None
            }
        }
    }

    #[must_use]
    pub fn load_image_for(&self, entry_id: Uuid) -> Option<Vec<u8>> {
        self.load_image(&photo_filename(entry_id))
    }

    #[must_use]
    pub fn load_thumbnail_for(&self, entry_id: Uuid) -> Option<Vec<u8>> {
        self.load_image(&thumbnail_filename(entry_id))
    }

    /// Best effort. A missing file is not an error.
    pub fn delete(&self, filename: &str) {
        let Some(path) = self.path_for(filename) else {
            return;
        };
        if let Err(err) = fs::remove_file(&path) {
            debug!(path = %path.display(), "Delete ignored: {err}");
        }
    }

    /// Removes the stored photo (or the one derived from the id) and the
    /// thumbnail.
    pub fn delete_all(&self, entry_id: Uuid, stored_filename: Option<&str>) {
        match stored_filename {
            Some(name) => self.delete(name),
            None => self.delete(&photo_filename(entry_id)),
        }
        self.delete(&thumbnail_filename(entry_id));
    }

    pub fn photos_directory(&self) -> Result<PathBuf, AssetError> {
        self.ensure_directory()?;
        Ok(self.dir.clone())
    }

    fn ensure_directory(&self) -> Result<(), AssetError> {
        if self.dir.is_dir() {
            return Ok(());
        }
        if self.dir.exists() {
            warn!(path = %self.dir.display(), "Replacing file that occupies the photo directory path");
            if let Err(err) = fs::remove_file(&self.dir) {
                debug!(path = %self.dir.display(), "Remove failed: {err}");
            }
        }
        fs::create_dir_all(&self.dir).map_err(|source| {
            error!(path = %self.dir.display(), "Could not create photo directory: {source}");
            AssetError::CreateDirectory {
                path: self.dir.clone(),
                source,
            }
        })
    }

    /// `None` for names that would escape the directory.
    fn path_for(&self, filename: &str) -> Option<PathBuf> {
        let escapes = filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..");
        if escapes {
            debug!(filename, "Rejected photo filename");
            return None;
        }
        Some(self.dir.join(filename))
    }

    fn write_jpeg(&self, image: &DynamicImage, filename: &str, quality: u8) -> Result<(), AssetError> {
        let data = encode_jpeg(image, quality)?;
        let target = self.dir.join(filename);
        write_atomic(&self.dir, &target, filename, &data).map_err(|source| {
            error!(path = %target.display(), "Write failed: {source}");
            AssetError::WriteFailed {
                path: target.clone(),
                source,
            }
        })
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, AssetError> {
    let mut data = Vec::new();
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut data, quality.clamp(1, 100)))
        .map_err(AssetError::InvalidImage)?;
    Ok(data)
}

/// Aspect-preserving shrink so the longer side is at most `max_dimension`.
fn downscale(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let longest = image.width().max(image.height());
    if max_dimension == 0 || longest <= max_dimension {
        return image;
    }
    image.resize(max_dimension, max_dimension, FilterType::Triangle)
}

/// Temp file in the same directory, fsync, rename. Readers see the old file
/// or the new one, never a partial write.
fn write_atomic(dir: &Path, target: &Path, filename: &str, data: &[u8]) -> io::Result<()> {
    let temp = dir.join(format!(".{filename}.{}.tmp", Uuid::new_v4().simple()));
    let result = write_synced(&temp, data).and_then(|()| fs::rename(&temp, target));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}
