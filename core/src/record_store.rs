//! The foreground record store: a primary context plus the cached
//! projection that presentation code reads without querying.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::container::{PersistentContainer, StoreStatus};
use crate::context::{ChangeNotification, Context, SaveStatus};
use crate::error::StoreError;
use crate::models::{DayKey, EntryUpsert, ProfileUpdate, UserProfile, WeightEntry};

/// Derived read view. Recomputed wholesale after every mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Projection {
    pub profile: Option<UserProfile>,
    pub today_entry: Option<WeightEntry>,
    /// Ascending by day.
    pub recent_entries: Vec<WeightEntry>,
}

pub struct RecordStore {
    container: PersistentContainer,
    view: Context,
    clock: Arc<dyn Clock>,
    recent_window_days: u32,
    projection: Projection,
    observers: watch::Sender<Projection>,
    merges: UnboundedReceiver<ChangeNotification>,
}

impl RecordStore {
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(config: &StoreConfig, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let (container, view, merges) = PersistentContainer::load(config, clock.clone())?;
        let (observers, _) = watch::channel(Projection::default());
        let mut store = Self {
            container,
            view,
            clock,
            recent_window_days: config.recent_window_days,
            projection: Projection::default(),
            observers,
            merges,
        };
        store.refresh_all();
        Ok(store)
    }

    /// Ephemeral store for tests and previews.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(&StoreConfig::in_memory())
    }

    /// In-memory store seeded with a profile and the last ten days of entries.
    pub fn preview(clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let mut store = Self::open_with_clock(&StoreConfig::in_memory(), clock)?;
        store.update_profile(ProfileUpdate {
            height_cm: Some(178.0),
            target_weight_kg: Some(72.0),
        });
        let today = store.clock.today();
        for i in 0..10_u32 {
            let mut upsert = EntryUpsert::new(today.days_before(i), 75.0 - f64::from(i) * 0.2);
            if i % 3 == 0 {
                upsert = upsert.with_note("Felt good");
            }
            store.view.upsert_entry(&upsert);
        }
        store.save();
        store.refresh_all();
        Ok(store)
    }

    #[must_use]
    pub fn status(&self) -> StoreStatus {
        self.container.status()
    }

    #[must_use]
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// The receiver always holds the latest projection.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Projection> {
        self.observers.subscribe()
    }

    pub fn refresh_all(&mut self) {
        let today = self.clock.today();
        self.projection = Projection {
            // A profile handed out while commits are refused stays cached.
            profile: self.fetch_profile().or_else(|| self.projection.profile.clone()),
            today_entry: self.fetch_entry(today),
            recent_entries: self.fetch_recent_entries(self.recent_window_days),
        };
        self.publish();
    }

    fn publish(&self) {
        self.observers.send_replace(self.projection.clone());
    }

    // --- Profile ---

    pub fn get_or_create_profile(&mut self) -> UserProfile {
        if let Some(profile) = &self.projection.profile {
            return profile.clone();
        }
        let mut profile = self.view.get_or_create_profile();
        if self.save().is_committed() {
            profile = self.fetch_profile().unwrap_or(profile);
        }
        self.projection.profile = Some(profile.clone());
        self.publish();
        profile
    }

    pub fn update_profile(&mut self, update: ProfileUpdate) -> UserProfile {
        let profile = self.view.update_profile(&update);
        let profile = match self.save() {
            SaveStatus::Committed(_) => self.fetch_profile().unwrap_or(profile),
            SaveStatus::Clean => profile,
            SaveStatus::Failed => {
                let mut kept = self.projection.profile.clone().unwrap_or(profile);
                kept.apply(&update, self.clock.now());
                self.projection.profile = Some(kept.clone());
                self.refresh_all();
                return kept;
            }
        };
        self.projection.profile = Some(profile.clone());
        self.publish();
        profile
    }

    #[must_use]
    pub fn fetch_profile(&self) -> Option<UserProfile> {
        self.view.fetch_profile().unwrap_or_else(|err| {
            error!("Profile fetch failed: {err:#}");
            None
        })
    }

    // --- Entries ---

    /// Creates or updates the entry for the upsert's day. A missing photo
    /// filename keeps the stored one.
    ///
    /// Returns the row as committed, which differs from the upsert's id when
    /// another context stored the same day first.
    pub fn upsert_entry(&mut self, upsert: &EntryUpsert) -> WeightEntry {
        let staged = self.view.upsert_entry(upsert);
        let entry = match self.save() {
            SaveStatus::Failed => {
                self.refresh_all();
                return staged;
            }
            SaveStatus::Committed(_) => self.fetch_entry(staged.day).unwrap_or(staged),
            SaveStatus::Clean => staged,
        };
        if entry.day == self.clock.today() {
            self.projection.today_entry = Some(entry.clone());
        }
        self.projection.recent_entries = self.fetch_recent_entries(self.recent_window_days);
        self.publish();
        entry
    }

    pub fn delete_entry(&mut self, entry: &WeightEntry) {
        if self.view.delete_entry(entry.id).is_some() {
            self.save();
        }
        self.refresh_all();
    }

    /// Deletes the entry for `day`, returning it so callers can clean up its
    /// photo. A day without an entry is a no-op.
    pub fn delete_entry_for_day(&mut self, day: impl Into<DayKey>) -> Option<WeightEntry> {
        let removed = self.view.delete_entry_for_day(day);
        if removed.is_some() {
            self.save();
            self.refresh_all();
        }
        removed
    }

    #[must_use]
    pub fn fetch_entry(&self, day: impl Into<DayKey>) -> Option<WeightEntry> {
        let day = day.into();
        self.view.fetch_entry(day).unwrap_or_else(|err| {
            error!(day = %day, "Entry fetch failed: {err:#}");
            None
        })
    }

    /// Entries from `days_back` days ago through today, ascending by day.
    #[must_use]
    pub fn fetch_recent_entries(&self, days_back: u32) -> Vec<WeightEntry> {
        let end = self.clock.today();
        let start = end.days_before(days_back);
        self.view
            .fetch_entries_between(start, end)
            .unwrap_or_else(|err| {
                error!(days_back, "Recent entries fetch failed: {err:#}");
                Vec::new()
            })
    }

    /// Id the entry for `day` has or will get, so assets can be named before
    /// the record is written.
    #[must_use]
    pub fn entry_id_for_day(&self, day: impl Into<DayKey>) -> uuid::Uuid {
        self.fetch_entry(day)
            .map_or_else(uuid::Uuid::new_v4, |entry| entry.id)
    }

    // --- Contexts ---

    /// Commits the primary context if it has pending changes.
    pub fn save(&mut self) -> SaveStatus {
        self.view.save()
    }

    /// An independent context for background work, with the same merge
    /// policy. Its commits reach the projection through
    /// [`merge_background_changes`](Self::merge_background_changes).
    pub fn new_isolated_context(&self) -> Result<Context, StoreError> {
        self.container.new_isolated_context()
    }

    #[cfg(test)]
    pub(crate) fn view_mut(&mut self) -> &mut Context {
        &mut self.view
    }

    /// Drains commit notifications from isolated contexts and refreshes the
    /// projection once if any arrived. Returns how many were merged.
    pub fn merge_background_changes(&mut self) -> usize {
        let mut merged = 0;
        while let Ok(notification) = self.merges.try_recv() {
            debug!(origin = ?notification.origin, "Merging background changes");
            merged += 1;
        }
        if merged > 0 {
            self.refresh_all();
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Local, TimeZone, Utc};

    use super::*;
    use crate::clock::ManualClock;

    fn local(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(y, m, d, h, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn day(s: &str) -> DayKey {
        DayKey::parse(s).unwrap()
    }

    fn store_at(now: DateTime<Utc>) -> (RecordStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let store = RecordStore::open_with_clock(&StoreConfig::in_memory(), clock.clone()).unwrap();
        (store, clock)
    }

    #[test]
    fn test_get_or_create_profile_defaults_and_is_idempotent() {
        let (mut store, _clock) = store_at(local(2026, 1, 29, 9));
        assert!(store.projection().profile.is_none());

        let first = store.get_or_create_profile();
        assert!((first.height_cm - 170.0).abs() < f64::EPSILON);
        assert!((first.target_weight_kg - 70.0).abs() < f64::EPSILON);

        let second = store.get_or_create_profile();
        assert_eq!(first.id, second.id);
        assert_eq!(store.fetch_profile().map(|p| p.id), Some(first.id));
        assert_eq!(store.projection().profile.as_ref().map(|p| p.id), Some(first.id));
    }

    #[test]
    fn test_update_profile_only_touches_supplied_fields() {
        let (mut store, clock) = store_at(local(2026, 1, 29, 9));
        let created = store.get_or_create_profile();

        clock.advance(Duration::hours(1));
        let updated = store.update_profile(ProfileUpdate {
            height_cm: None,
            target_weight_kg: Some(65.5),
        });

        assert_eq!(updated.id, created.id);
        assert!((updated.height_cm - 170.0).abs() < f64::EPSILON);
        assert!((updated.target_weight_kg - 65.5).abs() < f64::EPSILON);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
        assert_eq!(store.fetch_profile(), Some(updated));
    }

    #[test]
    fn test_upsert_same_day_overwrites_and_keeps_created_at() {
        let (mut store, clock) = store_at(local(2026, 1, 29, 9));

        let first = store.upsert_entry(&EntryUpsert::new(day("2026-01-29"), 88.6));
        clock.advance(Duration::minutes(30));
        let second = store.upsert_entry(
            &EntryUpsert::new(day("2026-01-29"), 87.9).with_note("felt good"),
        );

        assert_eq!(first.id, second.id);
        assert!((second.weight_kg - 87.9).abs() < f64::EPSILON);
        assert_eq!(second.note.as_deref(), Some("felt good"));
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);

        let recent = store.fetch_recent_entries(90);
        assert_eq!(recent.len(), 1);
        assert_eq!(store.fetch_entry(day("2026-01-29")), Some(second));
    }

    #[test]
    fn test_upsert_normalizes_instant_to_day() {
        let (mut store, _clock) = store_at(local(2026, 1, 29, 9));
        let morning = Local.with_ymd_and_hms(2026, 1, 29, 7, 15, 0).unwrap();
        let evening = Local.with_ymd_and_hms(2026, 1, 29, 21, 40, 0).unwrap();

        let a = store.upsert_entry(&EntryUpsert::new(morning, 88.6));
        let b = store.upsert_entry(&EntryUpsert::new(evening, 88.1));
        assert_eq!(a.id, b.id);
        assert_eq!(store.fetch_recent_entries(90).len(), 1);
    }

    #[test]
    fn test_upsert_without_photo_keeps_existing_photo() {
        let (mut store, _clock) = store_at(local(2026, 1, 29, 9));
        let first = store.upsert_entry(
            &EntryUpsert::new(day("2026-01-29"), 88.6).with_photo("abc.jpg"),
        );
        assert_eq!(first.photo_filename.as_deref(), Some("abc.jpg"));

        let second = store.upsert_entry(&EntryUpsert::new(day("2026-01-29"), 88.0));
        assert_eq!(second.photo_filename.as_deref(), Some("abc.jpg"));
        assert_eq!(
            store.fetch_entry(day("2026-01-29")).and_then(|e| e.photo_filename),
            Some("abc.jpg".to_string())
        );
    }

    #[test]
    fn test_upsert_today_updates_projection() {
        let (mut store, _clock) = store_at(local(2026, 1, 29, 9));
        let mut rx = store.subscribe();

        let entry = store.upsert_entry(&EntryUpsert::new(day("2026-01-29"), 88.6));
        assert_eq!(store.projection().today_entry, Some(entry.clone()));
        assert_eq!(store.projection().recent_entries, vec![entry.clone()]);

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().today_entry, Some(entry));
    }

    #[test]
    fn test_upsert_other_day_leaves_today_entry() {
        let (mut store, _clock) = store_at(local(2026, 1, 29, 9));
        store.upsert_entry(&EntryUpsert::new(day("2026-01-20"), 89.0));
        assert!(store.projection().today_entry.is_none());
        assert_eq!(store.projection().recent_entries.len(), 1);
    }

    #[test]
    fn test_recent_entries_window_and_order() {
        let (mut store, _clock) = store_at(local(2026, 6, 30, 9));
        for d in ["2026-06-30", "2026-04-01", "2026-06-01", "2026-03-31", "2026-01-15"] {
            store.upsert_entry(&EntryUpsert::new(day(d), 80.0));
        }

        let days: Vec<String> = store
            .fetch_recent_entries(90)
            .iter()
            .map(|e| e.day.to_string())
            .collect();
        // 90 days before 2026-06-30 is 2026-04-01.
        assert_eq!(days, vec!["2026-04-01", "2026-06-01", "2026-06-30"]);
        assert_eq!(store.projection().recent_entries.len(), 3);
    }

    #[test]
    fn test_recent_entries_with_huge_window_returns_everything() {
        let (mut store, _clock) = store_at(local(2026, 6, 30, 9));
        for d in ["2026-06-30", "1999-12-31", "1970-01-01"] {
            store.upsert_entry(&EntryUpsert::new(day(d), 80.0));
        }
        let recent = store.fetch_recent_entries(u32::MAX);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent.first().map(|e| e.day), Some(day("1970-01-01")));
    }

    #[test]
    fn test_upsert_returns_row_committed_by_another_context() {
        let (mut store, _clock) = store_at(local(2026, 1, 29, 9));
        let staged = store
            .view_mut()
            .upsert_entry(&EntryUpsert::new(day("2026-01-29"), 88.6));

        let mut background = store.new_isolated_context().unwrap();
        let stored = background.upsert_entry(&EntryUpsert::new(day("2026-01-29"), 89.2));
        assert!(background.save().is_committed());
        assert_ne!(stored.id, staged.id);

        let entry = store.upsert_entry(&EntryUpsert::new(day("2026-01-29"), 88.4));
        assert_eq!(entry.id, stored.id);
        assert_eq!(store.fetch_entry(day("2026-01-29")), Some(entry.clone()));
        assert_eq!(store.projection().today_entry, Some(entry));
        assert_eq!(store.fetch_recent_entries(90).len(), 1);
    }

    #[test]
    fn test_delete_entry_for_day() {
        let (mut store, _clock) = store_at(local(2026, 1, 29, 9));
        store.upsert_entry(&EntryUpsert::new(day("2026-01-29"), 88.6));

        let removed = store.delete_entry_for_day(day("2026-01-29"));
        assert!(removed.is_some());
        assert!(store.fetch_entry(day("2026-01-29")).is_none());
        assert!(store.projection().today_entry.is_none());
        assert!(store.projection().recent_entries.is_empty());
    }

    #[test]
    fn test_delete_missing_day_is_noop() {
        let (mut store, _clock) = store_at(local(2026, 1, 29, 9));
        store.upsert_entry(&EntryUpsert::new(day("2026-01-28"), 88.6));
        assert!(store.delete_entry_for_day(day("2026-01-29")).is_none());
        assert_eq!(store.fetch_recent_entries(90).len(), 1);
    }

    #[test]
    fn test_delete_entry_by_value() {
        let (mut store, _clock) = store_at(local(2026, 1, 29, 9));
        let entry = store.upsert_entry(&EntryUpsert::new(day("2026-01-29"), 88.6));
        store.delete_entry(&entry);
        assert!(store.fetch_entry(day("2026-01-29")).is_none());
        // Deleting again is harmless.
        store.delete_entry(&entry);
    }

    #[test]
    fn test_save_is_clean_without_changes() {
        let (mut store, _clock) = store_at(local(2026, 1, 29, 9));
        assert_eq!(store.save(), SaveStatus::Clean);
    }

    #[test]
    fn test_background_changes_reach_projection_after_merge() {
        let (mut store, _clock) = store_at(local(2026, 1, 29, 9));
        let mut background = store.new_isolated_context().unwrap();

        let entry = background.upsert_entry(&EntryUpsert::new(day("2026-01-29"), 88.6));
        assert!(background.save().is_committed());

        // Not visible in the cached projection until merged.
        assert!(store.projection().today_entry.is_none());
        assert_eq!(store.merge_background_changes(), 1);
        assert_eq!(store.projection().today_entry, Some(entry));
        assert_eq!(store.merge_background_changes(), 0);
    }

    #[test]
    fn test_entry_id_for_day_prefers_existing() {
        let (mut store, _clock) = store_at(local(2026, 1, 29, 9));
        let entry = store.upsert_entry(&EntryUpsert::new(day("2026-01-29"), 88.6));
        assert_eq!(store.entry_id_for_day(day("2026-01-29")), entry.id);
        assert_ne!(store.entry_id_for_day(day("2026-01-30")), entry.id);
    }

    #[test]
    fn test_preview_store_is_seeded() {
        let clock = Arc::new(ManualClock::new(local(2026, 1, 29, 9)));
        let store = RecordStore::preview(clock).unwrap();

        let profile = store.projection().profile.clone().unwrap();
        assert!((profile.height_cm - 178.0).abs() < f64::EPSILON);
        assert!((profile.target_weight_kg - 72.0).abs() < f64::EPSILON);

        let recent = &store.projection().recent_entries;
        assert_eq!(recent.len(), 10);
        assert_eq!(recent.first().map(|e| e.day), Some(day("2026-01-20")));
        let today = store.projection().today_entry.clone().unwrap();
        assert!((today.weight_kg - 75.0).abs() < f64::EPSILON);
        assert_eq!(today.note.as_deref(), Some("Felt good"));
    }
}
