//! Write contexts over the shared database.
//!
//! A context stages changes in memory and reads through them, so callers see
//! their own uncommitted edits. `save` applies the staged changes in one
//! transaction, merging each touched row property by property with whatever
//! other contexts committed in the meantime.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use rusqlite::Connection;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::{self, Database};
use crate::error::StoreError;
use crate::merge::{self, MergePolicy};
use crate::models::{DayKey, EntryUpsert, ProfileUpdate, UserProfile, WeightEntry};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Primary,
    Isolated,
}

/// What one commit changed, published to the primary context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeNotification {
    pub origin: Option<ContextId>,
    pub inserted: Vec<Uuid>,
    pub updated: Vec<Uuid>,
    pub deleted: Vec<Uuid>,
    pub profile_changed: bool,
}

impl ChangeNotification {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
            && !self.profile_changed
    }
}

/// Outcome of `save`. Commit failures are reported here, never as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    /// Nothing was pending; no transaction was opened.
    Clean,
    Committed(ChangeNotification),
    /// The commit was rolled back and the staged changes discarded. Data read
    /// before the failure may be stale.
    Failed,
}

impl SaveStatus {
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }
}

#[derive(Debug, Clone)]
struct Staged<T> {
    base: Option<T>,
    current: T,
}

#[derive(Debug, Default)]
struct ChangeSet {
    profile: Option<Staged<UserProfile>>,
    entries: BTreeMap<Uuid, Staged<WeightEntry>>,
    deleted: HashMap<Uuid, DayKey>,
}

impl ChangeSet {
    fn is_empty(&self) -> bool {
        self.profile.is_none() && self.entries.is_empty() && self.deleted.is_empty()
    }

    fn staged_for_day(&self, day: DayKey) -> Option<&WeightEntry> {
        self.entries
            .values()
            .map(|s| &s.current)
            .find(|e| e.day == day)
    }
}

/// Rows as this context last read them from the database. They become the
/// merge base when a row is first staged.
#[derive(Debug, Default)]
struct Snapshots {
    profile: Option<UserProfile>,
    entries: HashMap<Uuid, WeightEntry>,
}

/// A write handle with its own connection. `Send` but not `Sync`: move it to
/// one worker and keep it there.
pub struct Context {
    id: ContextId,
    kind: ContextKind,
    db: Database,
    policy: MergePolicy,
    read_only: bool,
    clock: Arc<dyn Clock>,
    changes: ChangeSet,
    snapshots: RefCell<Snapshots>,
    notifier: Option<UnboundedSender<ChangeNotification>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("policy", &self.policy)
            .field("read_only", &self.read_only)
            .field("has_changes", &self.has_changes())
            .finish_non_exhaustive()
    }
}

impl Context {
    pub(crate) fn new(
        kind: ContextKind,
        db: Database,
        policy: MergePolicy,
        read_only: bool,
        clock: Arc<dyn Clock>,
        notifier: Option<UnboundedSender<ChangeNotification>>,
    ) -> Self {
        Self {
            id: ContextId::next(),
            kind,
            db,
            policy,
            read_only,
            clock,
            changes: ChangeSet::default(),
            snapshots: RefCell::default(),
            notifier,
        }
    }

    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    #[must_use]
    pub fn merge_policy(&self) -> MergePolicy {
        self.policy
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    fn conn(&self) -> &Connection {
        self.db.conn()
    }

    fn observe_entry(&self, entry: &WeightEntry) {
        if !self.changes.entries.contains_key(&entry.id) {
            self.snapshots
                .borrow_mut()
                .entries
                .insert(entry.id, entry.clone());
        }
    }

    fn observe_profile(&self, profile: &UserProfile) {
        if self.changes.profile.is_none() {
            self.snapshots.borrow_mut().profile = Some(profile.clone());
        }
    }

    // --- Reads (see staged changes) ---

    pub fn fetch_profile(&self) -> Result<Option<UserProfile>> {
        if let Some(staged) = &self.changes.profile {
            return Ok(Some(staged.current.clone()));
        }
        let stored = db::get_profile(self.conn())?;
        if let Some(profile) = &stored {
            self.observe_profile(profile);
        }
        Ok(stored)
    }

    pub fn fetch_entry(&self, day: impl Into<DayKey>) -> Result<Option<WeightEntry>> {
        let day = day.into();
        if let Some(entry) = self.changes.staged_for_day(day) {
            return Ok(Some(entry.clone()));
        }
        let stored = db::get_entry_by_day(self.conn(), day)?
            .filter(|e| !self.changes.deleted.contains_key(&e.id));
        if let Some(entry) = &stored {
            self.observe_entry(entry);
        }
        Ok(stored)
    }

    pub fn fetch_entry_by_id(&self, id: Uuid) -> Result<Option<WeightEntry>> {
        if let Some(staged) = self.changes.entries.get(&id) {
            return Ok(Some(staged.current.clone()));
        }
        if self.changes.deleted.contains_key(&id) {
            return Ok(None);
        }
        let stored = db::get_entry_by_id(self.conn(), id)?;
        if let Some(entry) = &stored {
            self.observe_entry(entry);
        }
        Ok(stored)
    }

    /// Entries with `start <= day <= end`, ascending by day.
    pub fn fetch_entries_between(&self, start: DayKey, end: DayKey) -> Result<Vec<WeightEntry>> {
        let mut by_day: BTreeMap<DayKey, WeightEntry> = db::get_entries_between(self.conn(), start, end)?
            .into_iter()
            .filter(|e| !self.changes.deleted.contains_key(&e.id))
            .inspect(|e| self.observe_entry(e))
            .map(|e| (e.day, e))
            .collect();
        for staged in self.changes.entries.values() {
            let entry = &staged.current;
            if entry.day >= start && entry.day <= end {
                by_day.insert(entry.day, entry.clone());
            }
        }
        Ok(by_day.into_values().collect())
    }

    // --- Writes (staged until save) ---

    /// Returns the profile, staging a default one when none exists yet.
    pub fn get_or_create_profile(&mut self) -> UserProfile {
        match self.fetch_profile() {
            Ok(Some(profile)) => return profile,
            Ok(None) => {}
            Err(err) => error!(context = %self.id, "Profile fetch failed: {err:#}"),
        }
        let created = UserProfile::with_defaults(self.clock.now());
        debug!(context = %self.id, profile = %created.id, "Creating default profile");
        // The defaults are the base, so only later edits count as changes when
        // another context created the profile first.
        self.changes.profile = Some(Staged {
            base: Some(created.clone()),
            current: created.clone(),
        });
        created
    }

    pub fn update_profile(&mut self, update: &ProfileUpdate) -> UserProfile {
        let mut profile = self.get_or_create_profile();
        if profile.apply(update, self.clock.now()) {
            self.stage_profile(profile.clone());
        }
        profile
    }

    fn stage_profile(&mut self, profile: UserProfile) {
        if let Some(staged) = &mut self.changes.profile {
            staged.current = profile;
            return;
        }
        let seen = self.snapshots.borrow().profile.clone();
        let base = seen.or_else(|| {
            db::get_profile(self.conn()).unwrap_or_else(|err| {
                error!(context = %self.id, "Profile fetch failed: {err:#}");
                None
            })
        });
        self.changes.profile = Some(Staged {
            base,
            current: profile,
        });
    }

    /// Day-bucketed upsert: updates the entry for `upsert.day` in place, or
    /// stages a new one.
    pub fn upsert_entry(&mut self, upsert: &EntryUpsert) -> WeightEntry {
        let now = self.clock.now();
        let existing = self.fetch_entry(upsert.day).unwrap_or_else(|err| {
            error!(context = %self.id, day = %upsert.day, "Entry fetch failed: {err:#}");
            None
        });

        let entry = match existing {
            Some(mut entry) => {
                entry.weight_kg = upsert.weight_kg;
                if let Some(filename) = &upsert.photo_filename {
                    entry.photo_filename = Some(filename.clone());
                }
                entry.note.clone_from(&upsert.note);
                entry.updated_at = now;
                entry
            }
            None => WeightEntry {
                id: upsert.id.unwrap_or_else(Uuid::new_v4),
                day: upsert.day,
                weight_kg: upsert.weight_kg,
                photo_filename: upsert.photo_filename.clone(),
                note: upsert.note.clone(),
                created_at: now,
                updated_at: now,
            },
        };

        self.stage_entry(entry.clone());
        entry
    }

    fn stage_entry(&mut self, entry: WeightEntry) {
        if let Some(staged) = self.changes.entries.get_mut(&entry.id) {
            staged.current = entry;
            return;
        }
        let seen = self.snapshots.borrow().entries.get(&entry.id).cloned();
        let base = seen.or_else(|| {
            db::get_entry_by_id(self.conn(), entry.id).unwrap_or_else(|err| {
                error!(context = %self.id, entry = %entry.id, "Entry fetch failed: {err:#}");
                None
            })
        });
        self.changes.entries.insert(
            entry.id,
            Staged {
                base,
                current: entry,
            },
        );
    }

    /// Stages a deletion. Returns the entry that will be removed, if any.
    pub fn delete_entry(&mut self, id: Uuid) -> Option<WeightEntry> {
        if let Some(staged) = self.changes.entries.remove(&id) {
            if staged.base.is_some() {
                self.changes.deleted.insert(id, staged.current.day);
            }
            return Some(staged.current);
        }
        if self.changes.deleted.contains_key(&id) {
            return None;
        }
        match db::get_entry_by_id(self.conn(), id) {
            Ok(Some(entry)) => {
                self.changes.deleted.insert(id, entry.day);
                Some(entry)
            }
            Ok(None) => None,
            Err(err) => {
                error!(context = %self.id, entry = %id, "Entry fetch failed: {err:#}");
                None
            }
        }
    }

    pub fn delete_entry_for_day(&mut self, day: impl Into<DayKey>) -> Option<WeightEntry> {
        let day = day.into();
        match self.fetch_entry(day) {
            Ok(Some(entry)) => self.delete_entry(entry.id),
            Ok(None) => None,
            Err(err) => {
                error!(context = %self.id, day = %day, "Entry fetch failed: {err:#}");
                None
            }
        }
    }

    /// Discards every staged change.
    pub fn rollback(&mut self) {
        self.changes = ChangeSet::default();
        self.snapshots = RefCell::default();
    }

    // --- Commit ---

    /// Commits staged changes if there are any. Failures are logged and the
    /// staged changes dropped; nothing is retried.
    pub fn save(&mut self) -> SaveStatus {
        if !self.has_changes() {
            return SaveStatus::Clean;
        }
        if self.read_only {
            warn!(context = %self.id, "Discarding changes: {}", StoreError::ReadOnly);
            self.rollback();
            return SaveStatus::Failed;
        }

        let changes = std::mem::take(&mut self.changes);
        self.snapshots = RefCell::default();
        let policy = self.policy;
        match self.db.write(|tx| apply_changes(tx, policy, changes)) {
            Ok(mut notification) => {
                notification.origin = Some(self.id);
                debug!(
                    context = %self.id,
                    inserted = notification.inserted.len(),
                    updated = notification.updated.len(),
                    deleted = notification.deleted.len(),
                    "Committed changes"
                );
                if let Some(notifier) = &self.notifier {
                    if !notification.is_empty() && notifier.send(notification.clone()).is_err() {
                        debug!(context = %self.id, "Primary context gone; change notification dropped");
                    }
                }
                SaveStatus::Committed(notification)
            }
            Err(err) => {
                error!(context = %self.id, "Save failed: {err:#}");
                SaveStatus::Failed
            }
        }
    }
}

fn apply_changes(
    conn: &Connection,
    policy: MergePolicy,
    changes: ChangeSet,
) -> Result<ChangeNotification> {
    let mut notification = ChangeNotification::default();

    if let Some(staged) = changes.profile {
        notification.profile_changed = apply_profile(conn, policy, &staged)?;
    }

    for id in changes.deleted.keys() {
        if db::delete_entry(conn, *id)? {
            notification.deleted.push(*id);
        }
    }

    for staged in changes.entries.into_values() {
        let ours = &staged.current;
        let theirs = match &staged.base {
            Some(_) => db::get_entry_by_id(conn, ours.id)?,
            // A fresh insert may collide with a row another context committed
            // for the same day; it merges into that row.
            None => db::get_entry_by_day(conn, ours.day)?,
        };

        match (theirs, &staged.base) {
            (None, None) => {
                db::insert_entry(conn, ours)?;
                notification.inserted.push(ours.id);
            }
            (None, Some(_)) => {
                debug!(entry = %ours.id, "Entry deleted by another context; update dropped");
            }
            (Some(theirs), base) => {
                let merged = merge::three_way(policy, base.as_ref(), ours, &theirs);
                if merged != theirs {
                    db::update_entry(conn, &merged)?;
                    notification.updated.push(merged.id);
                }
            }
        }
    }

    Ok(notification)
}

fn apply_profile(conn: &Connection, policy: MergePolicy, staged: &Staged<UserProfile>) -> Result<bool> {
    let ours = &staged.current;
    match db::get_profile(conn)? {
        None => {
            db::insert_profile(conn, ours)?;
            Ok(true)
        }
        Some(theirs) => {
            let merged = merge::three_way(policy, staged.base.as_ref(), ours, &theirs);
            if merged == theirs {
                return Ok(false);
            }
            db::update_profile(conn, &merged)?;
            Ok(true)
        }
    }
}
