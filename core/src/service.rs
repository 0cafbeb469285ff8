use std::path::PathBuf;

use tracing::{debug, warn};

use crate::assets::{AssetStore, PhotoOptions};
use crate::config::StoreConfig;
use crate::error::{AssetError, StoreError};
use crate::models::{DayKey, EntryUpsert, WeightEntry};
use crate::record_store::RecordStore;

/// Records and photos together. Photos are written before the record that
/// names them, and removed after the record is gone.
pub struct JournalService {
    store: RecordStore,
    assets: AssetStore,
    photo_options: PhotoOptions,
}

impl JournalService {
    pub fn new(store: RecordStore, assets: AssetStore) -> Self {
        Self {
            store,
            assets,
            photo_options: PhotoOptions::default(),
        }
    }

    pub fn open(config: &StoreConfig, photos_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Ok(Self::new(RecordStore::open(config)?, AssetStore::new(photos_dir)))
    }

    #[must_use]
    pub fn with_photo_options(mut self, options: PhotoOptions) -> Self {
        self.photo_options = options;
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RecordStore {
        &mut self.store
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    /// Upserts the day's entry. With a photo, the image is saved under the
    /// entry's id first; an invalid or unwritable photo leaves the record
    /// untouched. Photo files the store did not end up referencing are
    /// removed again.
    pub fn log_weight(
        &mut self,
        day: impl Into<DayKey>,
        weight_kg: f64,
        photo: Option<&[u8]>,
        note: Option<String>,
    ) -> Result<WeightEntry, AssetError> {
        let day = day.into();
        let id = self.store.entry_id_for_day(day);

        let mut upsert = EntryUpsert::new(day, weight_kg).with_id(id);
        upsert.note = note.clone();
        let Some(bytes) = photo else {
            return Ok(self.store.upsert_entry(&upsert));
        };
        let mut photo_id = id;
        let mut filename = self.assets.save_image(bytes, id, &self.photo_options)?;
        let mut entry = self.store.upsert_entry(&upsert.with_photo(filename.clone()));

        // Another context stored this day first and its id won the merge.
        if entry.id != id {
            debug!(staged = %id, stored = %entry.id, "Renaming photo to the stored entry");
            let renamed = self.assets.save_image(bytes, entry.id, &self.photo_options)?;
            self.assets.delete_all(id, Some(filename.as_str()));
            let mut upsert = EntryUpsert::new(day, weight_kg)
                .with_id(entry.id)
                .with_photo(renamed.clone());
            upsert.note = note;
            entry = self.store.upsert_entry(&upsert);
            (photo_id, filename) = (entry.id, renamed);
        }

        let stored = self.store.fetch_entry(day).and_then(|e| e.photo_filename);
        if stored.as_deref() != Some(filename.as_str()) {
            warn!(entry = %photo_id, "Stored entry does not reference the new photo; removing it");
            self.assets.delete_all(photo_id, Some(filename.as_str()));
            entry.photo_filename = stored;
        }
        Ok(entry)
    }

    /// Deletes the day's entry and its photos. Returns false when the day had
    /// no entry.
    pub fn delete_entry(&mut self, day: impl Into<DayKey>) -> bool {
        let Some(entry) = self.store.delete_entry_for_day(day) else {
            return false;
        };
        debug!(entry = %entry.id, "Removing photos for deleted entry");
        self.assets
            .delete_all(entry.id, entry.photo_filename.as_deref());
        true
    }

    #[must_use]
    pub fn load_photo(&self, day: impl Into<DayKey>, thumbnail: bool) -> Option<Vec<u8>> {
        let entry = self.store.fetch_entry(day)?;
        if thumbnail {
            return self.assets.load_thumbnail_for(entry.id);
        }
        match &entry.photo_filename {
            Some(name) => self.assets.load_image(name),
            None => None,
        }
    }

    pub fn photos_directory(&self) -> Result<PathBuf, AssetError> {
        self.assets.photos_directory()
    }
}
