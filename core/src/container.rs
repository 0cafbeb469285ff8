use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info};

use crate::clock::Clock;
use crate::config::{LoadPolicy, StoreConfig, StoreLocation};
use crate::context::{ChangeNotification, Context, ContextKind};
use crate::db::{Database, Scratch};
use crate::error::StoreError;
use crate::merge::MergePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Ready,
    /// The configured store failed to load. Reads are served from an empty
    /// in-memory store and commits are refused.
    Degraded,
}

#[derive(Debug, Clone)]
enum Backing {
    File(std::path::PathBuf),
    Scratch(Scratch),
}

/// Owns where the data lives and hands out contexts over it.
pub struct PersistentContainer {
    backing: Backing,
    status: StoreStatus,
    merge_policy: MergePolicy,
    clock: Arc<dyn Clock>,
    notifier: UnboundedSender<ChangeNotification>,
}

impl PersistentContainer {
    /// Loads the store and returns it with the primary context and the
    /// receiving end of the isolated-commit notifications.
    pub fn load(
        config: &StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, Context, UnboundedReceiver<ChangeNotification>), StoreError> {
        let (notifier, notifications) = mpsc::unbounded_channel();

        let (backing, db, status) = match open_backing(&config.location) {
            Ok((backing, db)) => {
                info!(location = %config.location, "Record store loaded");
                (backing, db, StoreStatus::Ready)
            }
            Err(err) => {
                error!(location = %config.location, "Record store load failed: {err}");
                match config.load_policy {
                    LoadPolicy::Abort => return Err(err),
                    LoadPolicy::Degrade => {
                        let (backing, db) = open_scratch()?;
                        info!("Serving reads from an empty in-memory store");
                        (backing, db, StoreStatus::Degraded)
                    }
                }
            }
        };

        let container = Self {
            backing,
            status,
            merge_policy: config.merge_policy,
            clock,
            notifier,
        };
        let primary = Context::new(
            ContextKind::Primary,
            db,
            container.merge_policy,
            container.is_read_only(),
            container.clock.clone(),
            None,
        );
        Ok((container, primary, notifications))
    }

    #[must_use]
    pub fn status(&self) -> StoreStatus {
        self.status
    }

    fn is_read_only(&self) -> bool {
        self.status == StoreStatus::Degraded
    }

    /// A fresh context on its own connection with the container's merge
    /// policy. Its commits are announced to the primary context.
    pub fn new_isolated_context(&self) -> Result<Context, StoreError> {
        let db = match &self.backing {
            Backing::File(path) => Database::open(path),
            Backing::Scratch(scratch) => Database::open_scratch(scratch),
        }
        .map_err(|source| StoreError::Unavailable {
            location: self.location_label(),
            source,
        })?;
        Ok(Context::new(
            ContextKind::Isolated,
            db,
            self.merge_policy,
            self.is_read_only(),
            self.clock.clone(),
            Some(self.notifier.clone()),
        ))
    }

    fn location_label(&self) -> String {
        match &self.backing {
            Backing::File(path) => path.display().to_string(),
            Backing::Scratch(scratch) => scratch.path().display().to_string(),
        }
    }
}

fn open_backing(location: &StoreLocation) -> Result<(Backing, Database), StoreError> {
    match location {
        StoreLocation::OnDisk(path) => {
            let db = Database::open(path).map_err(|source| StoreError::Unavailable {
                location: location.to_string(),
                source,
            })?;
            Ok((Backing::File(path.clone()), db))
        }
        StoreLocation::InMemory => open_scratch(),
    }
}

/// In-memory stores live in a scratch WAL file that is removed with its last
/// connection.
fn open_scratch() -> Result<(Backing, Database), StoreError> {
    let scratch = Scratch::new().map_err(StoreError::Scratch)?;
    let db = Database::open_scratch(&scratch).map_err(|source| StoreError::Unavailable {
        location: scratch.path().display().to_string(),
        source,
    })?;
    Ok((Backing::Scratch(scratch), db))
}
