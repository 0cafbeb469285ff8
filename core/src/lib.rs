//! Local data layer for the fitzy weight journal.

pub mod assets;
pub mod clock;
pub mod config;
pub mod container;
pub mod context;
pub mod db;
pub mod error;
pub mod merge;
pub mod models;
pub mod record_store;
pub mod service;

pub use assets::{AssetStore, PhotoOptions};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DeploymentProfile, LoadPolicy, StoreConfig, StoreLocation};
pub use container::StoreStatus;
pub use context::{ChangeNotification, Context, SaveStatus};
pub use error::{AssetError, StoreError};
pub use merge::MergePolicy;
pub use models::{DayKey, EntryUpsert, ProfileUpdate, UserProfile, WeightEntry};
pub use record_store::{Projection, RecordStore};
pub use service::JournalService;
