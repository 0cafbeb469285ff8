use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use tempfile::TempDir;
use uuid::Uuid;

use crate::models::{DayKey, UserProfile, WeightEntry};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const PROFILE_COLUMNS: &str = "id, height_cm, target_weight_kg, created_at, updated_at";
const ENTRY_COLUMNS: &str = "id, day, weight_kg, photo_filename, note, created_at, updated_at";

/// A throwaway database file in its own temporary directory. Connections
/// opened on clones of the same `Scratch` share the data, and the files are
/// removed once the last clone is dropped.
#[derive(Debug, Clone)]
pub struct Scratch(Arc<TempDir>);

impl Scratch {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("fitzy-").tempdir()?;
        Ok(Self(Arc::new(dir)))
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.0.path().join("fitzy.db")
    }
}

/// One SQLite connection. Every context owns its own.
pub struct Database {
    conn: Connection,
    _scratch: Option<Scratch>,
}

impl Database {
    /// WAL mode with a busy timeout: concurrent writers on other connections
    /// wait for each other instead of failing.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        Self::open_with(path, None)
    }

    /// Opens the scratch database, keeping its directory alive for as long as
    /// this connection is.
    pub fn open_scratch(scratch: &Scratch) -> rusqlite::Result<Self> {
        Self::open_with(&scratch.path(), Some(scratch.clone()))
    }

    fn open_with(path: &Path, scratch: Option<Scratch>) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        let db = Database {
            conn,
            _scratch: scratch,
        };
        db.create_schema()?;
        Ok(db)
    }

    fn create_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_profile (
                id TEXT PRIMARY KEY NOT NULL,
                singleton INTEGER NOT NULL DEFAULT 1 UNIQUE CHECK (singleton = 1),
                height_cm REAL NOT NULL,
                target_weight_kg REAL NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS weight_entries (
                id TEXT PRIMARY KEY NOT NULL,
                day TEXT NOT NULL UNIQUE,
                weight_kg REAL NOT NULL,
                photo_filename TEXT,
                note TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Runs `f` inside an immediate transaction, so concurrent committers
    /// are serialized and the last one to commit sees every earlier commit.
    pub fn write<T>(&mut self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin write transaction")?;
        let out = f(&tx)?;
        tx.commit().context("Failed to commit write transaction")?;
        Ok(out)
    }
}

// --- Row mapping helpers ---

fn uuid_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn profile_from_row(row: &rusqlite::Row) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: uuid_column(row, 0)?,
        height_cm: row.get(1)?,
        target_weight_kg: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<WeightEntry> {
    Ok(WeightEntry {
        id: uuid_column(row, 0)?,
        day: row.get(1)?,
        weight_kg: row.get(2)?,
        photo_filename: row.get(3)?,
        note: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

// --- Profile ---

pub fn get_profile(conn: &Connection) -> Result<Option<UserProfile>> {
    let profile = conn
        .query_row(
            &format!("SELECT {PROFILE_COLUMNS} FROM user_profile LIMIT 1"),
            [],
            profile_from_row,
        )
        .optional()?;
    Ok(profile)
}

pub fn insert_profile(conn: &Connection, profile: &UserProfile) -> Result<()> {
    conn.execute(
        "INSERT INTO user_profile (id, height_cm, target_weight_kg, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            profile.id.to_string(),
            profile.height_cm,
            profile.target_weight_kg,
            profile.created_at,
            profile.updated_at
        ],
    )?;
    Ok(())
}

pub fn update_profile(conn: &Connection, profile: &UserProfile) -> Result<()> {
    conn.execute(
        "UPDATE user_profile SET height_cm = ?1, target_weight_kg = ?2, updated_at = ?3
         WHERE id = ?4",
        params![
            profile.height_cm,
            profile.target_weight_kg,
            profile.updated_at,
            profile.id.to_string()
        ],
    )?;
    Ok(())
}

// --- Weight entries ---

pub fn get_entry_by_day(conn: &Connection, day: DayKey) -> Result<Option<WeightEntry>> {
    let entry = conn
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM weight_entries WHERE day = ?1"),
            params![day],
            entry_from_row,
        )
        .optional()?;
    Ok(entry)
}

pub fn get_entry_by_id(conn: &Connection, id: Uuid) -> Result<Option<WeightEntry>> {
    let entry = conn
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM weight_entries WHERE id = ?1"),
            params![id.to_string()],
            entry_from_row,
        )
        .optional()?;
    Ok(entry)
}

/// Entries with `start <= day <= end`, ascending by day.
pub fn get_entries_between(conn: &Connection, start: DayKey, end: DayKey) -> Result<Vec<WeightEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM weight_entries
         WHERE day >= ?1 AND day <= ?2 ORDER BY day ASC"
    ))?;
    let entries = stmt
        .query_map(params![start, end], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

pub fn count_entries(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM weight_entries", [], |row| row.get(0))?;
    Ok(count)
}

pub fn insert_entry(conn: &Connection, entry: &WeightEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO weight_entries (id, day, weight_kg, photo_filename, note, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.id.to_string(),
            entry.day,
            entry.weight_kg,
            entry.photo_filename,
            entry.note,
            entry.created_at,
            entry.updated_at
        ],
    )
    .with_context(|| format!("Failed to insert weight entry for {}", entry.day))?;
    Ok(())
}

pub fn update_entry(conn: &Connection, entry: &WeightEntry) -> Result<()> {
    conn.execute(
        "UPDATE weight_entries
         SET weight_kg = ?1, photo_filename = ?2, note = ?3, updated_at = ?4
         WHERE id = ?5",
        params![
            entry.weight_kg,
            entry.photo_filename,
            entry.note,
            entry.updated_at,
            entry.id.to_string()
        ],
    )?;
    Ok(())
}

pub fn delete_entry(conn: &Connection, id: Uuid) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM weight_entries WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-29T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn sample_entry(day: &str, weight_kg: f64) -> WeightEntry {
        WeightEntry {
            id: Uuid::new_v4(),
            day: DayKey::parse(day).unwrap(),
            weight_kg,
            photo_filename: None,
            note: Some("Morning weigh-in".to_string()),
            created_at: now(),
            updated_at: now(),
        }
    }

    fn memory_db() -> Database {
        Database::open_scratch(&Scratch::new().unwrap()).unwrap()
    }

    #[test]
    fn test_insert_and_get_entry_by_day() {
        let db = memory_db();
        let entry = sample_entry("2026-01-29", 88.6);
        insert_entry(db.conn(), &entry).unwrap();

        let loaded = get_entry_by_day(db.conn(), entry.day).unwrap().unwrap();
        assert_eq!(loaded, entry);
        assert_eq!(get_entry_by_id(db.conn(), entry.id).unwrap(), Some(entry));
    }

    #[test]
    fn test_get_entry_returns_none_for_missing_day() {
        let db = memory_db();
        let day = DayKey::parse("2026-01-29").unwrap();
        assert!(get_entry_by_day(db.conn(), day).unwrap().is_none());
    }

    #[test]
    fn test_day_is_unique() {
        let db = memory_db();
        insert_entry(db.conn(), &sample_entry("2026-01-29", 88.6)).unwrap();
        assert!(insert_entry(db.conn(), &sample_entry("2026-01-29", 87.0)).is_err());
        assert_eq!(count_entries(db.conn()).unwrap(), 1);
    }

    #[test]
    fn test_entries_between_is_inclusive_and_ascending() {
        let db = memory_db();
        for (day, w) in [("2026-01-31", 88.0), ("2026-01-01", 90.0), ("2026-01-15", 89.0)] {
            insert_entry(db.conn(), &sample_entry(day, w)).unwrap();
        }
        insert_entry(db.conn(), &sample_entry("2025-12-31", 91.0)).unwrap();

        let entries = get_entries_between(
            db.conn(),
            DayKey::parse("2026-01-01").unwrap(),
            DayKey::parse("2026-01-31").unwrap(),
        )
        .unwrap();
        let days: Vec<String> = entries.iter().map(|e| e.day.to_string()).collect();
        assert_eq!(days, vec!["2026-01-01", "2026-01-15", "2026-01-31"]);
    }

    #[test]
    fn test_update_and_delete_entry() {
        let db = memory_db();
        let mut entry = sample_entry("2026-01-29", 88.6);
        insert_entry(db.conn(), &entry).unwrap();

        entry.weight_kg = 87.9;
        entry.photo_filename = Some(format!("{}.jpg", entry.id));
        update_entry(db.conn(), &entry).unwrap();
        let loaded = get_entry_by_id(db.conn(), entry.id).unwrap().unwrap();
        assert!((loaded.weight_kg - 87.9).abs() < f64::EPSILON);
        assert_eq!(loaded.photo_filename, entry.photo_filename);

        assert!(delete_entry(db.conn(), entry.id).unwrap());
        assert!(!delete_entry(db.conn(), entry.id).unwrap());
    }

    #[test]
    fn test_profile_is_singleton() {
        let db = memory_db();
        assert!(get_profile(db.conn()).unwrap().is_none());

        let profile = UserProfile::with_defaults(now());
        insert_profile(db.conn(), &profile).unwrap();
        assert_eq!(get_profile(db.conn()).unwrap(), Some(profile));

        let second = UserProfile::with_defaults(now());
        assert!(insert_profile(db.conn(), &second).is_err());
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let mut db = memory_db();
        let entry = sample_entry("2026-01-29", 88.6);
        let result: Result<()> = db.write(|tx| {
            insert_entry(tx, &entry)?;
            anyhow::bail!("boom")
        });
        assert!(result.is_err());
        assert_eq!(count_entries(db.conn()).unwrap(), 0);
    }

    #[test]
    fn test_scratch_is_visible_across_connections() {
        let scratch = Scratch::new().unwrap();
        let a = Database::open_scratch(&scratch).unwrap();
        let b = Database::open_scratch(&scratch).unwrap();
        insert_entry(a.conn(), &sample_entry("2026-01-29", 88.6)).unwrap();
        assert_eq!(count_entries(b.conn()).unwrap(), 1);
    }

    #[test]
    fn test_scratch_outlives_its_creator() {
        let scratch = Scratch::new().unwrap();
        let path = scratch.path();
        let db = Database::open_scratch(&scratch).unwrap();
        drop(scratch);
        insert_entry(db.conn(), &sample_entry("2026-01-29", 88.6)).unwrap();
        assert!(path.exists());
        drop(db);
        assert!(!path.exists());
    }

    #[test]
    fn test_writers_on_two_connections_wait_for_each_other() {
        let scratch = Scratch::new().unwrap();
        let mut holder = Database::open_scratch(&scratch).unwrap();
        let other = scratch.clone();

        let waiter = std::thread::spawn(move || {
            let mut db = Database::open_scratch(&other).unwrap();
            db.write(|tx| insert_entry(tx, &sample_entry("2026-01-28", 88.0)))
        });
        holder
            .write(|tx| {
                insert_entry(tx, &sample_entry("2026-01-29", 88.6))?;
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .unwrap();

        waiter.join().unwrap().unwrap();
        assert_eq!(count_entries(holder.conn()).unwrap(), 2);
    }
}
