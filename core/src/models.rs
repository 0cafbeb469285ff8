use std::fmt;

use anyhow::{Result, bail};
use chrono::{DateTime, Days, Local, NaiveDate, TimeZone, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_HEIGHT_CM: f64 = 170.0;
pub const DEFAULT_TARGET_WEIGHT_KG: f64 = 70.0;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Calendar-day key in the local calendar. Entries are unique per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(NaiveDate);

impl DayKey {
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Truncates an instant to its day in the local calendar.
    #[must_use]
    pub fn from_instant<Tz: TimeZone>(at: &DateTime<Tz>) -> Self {
        Self(at.with_timezone(&Local).date_naive())
    }

    #[must_use]
    pub fn date(self) -> NaiveDate {
        self.0
    }

    /// Saturates at the earliest representable day.
    #[must_use]
    pub fn days_before(self, days: u32) -> Self {
        Self(
            self.0
                .checked_sub_days(Days::new(u64::from(days)))
                .unwrap_or(NaiveDate::MIN),
        )
    }

    pub fn parse(s: &str) -> Result<Self> {
        match NaiveDate::parse_from_str(s, DAY_FORMAT) {
            Ok(date) => Ok(Self(date)),
            Err(_) => bail!("Invalid day '{s}'. Must be YYYY-MM-DD"),
        }
    }
}

impl From<NaiveDate> for DayKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl From<DateTime<Utc>> for DayKey {
    fn from(at: DateTime<Utc>) -> Self {
        Self::from_instant(&at)
    }
}

impl From<DateTime<Local>> for DayKey {
    fn from(at: DateTime<Local>) -> Self {
        Self(at.date_naive())
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DAY_FORMAT))
    }
}

impl ToSql for DayKey {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for DayKey {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        NaiveDate::parse_from_str(s, DAY_FORMAT)
            .map(Self)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

// --- Profile ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub height_cm: f64,
    pub target_weight_kg: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    #[must_use]
    pub fn with_defaults(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            height_cm: DEFAULT_HEIGHT_CM,
            target_weight_kg: DEFAULT_TARGET_WEIGHT_KG,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies the supplied fields only. Returns whether anything was supplied.
    pub fn apply(&mut self, update: &ProfileUpdate, now: DateTime<Utc>) -> bool {
        if update.is_empty() {
            return false;
        }
        if let Some(h) = update.height_cm {
            self.height_cm = h;
        }
        if let Some(t) = update.target_weight_kg {
            self.target_weight_kg = t;
        }
        self.updated_at = now;
        true
    }
}

/// Partial profile update: `None` leaves a field untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProfileUpdate {
    pub height_cm: Option<f64>,
    pub target_weight_kg: Option<f64>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.height_cm.is_none() && self.target_weight_kg.is_none()
    }
}

// --- Weight entries ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub id: Uuid,
    pub day: DayKey,
    pub weight_kg: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to a day-bucketed upsert.
///
/// `photo_filename: None` never clears an existing photo; `note` is always
/// written, so `None` clears it. `id` is only used when a new entry is
/// created, letting callers name assets before the record exists.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryUpsert {
    pub day: DayKey,
    pub weight_kg: f64,
    pub photo_filename: Option<String>,
    pub note: Option<String>,
    pub id: Option<Uuid>,
}

impl EntryUpsert {
    pub fn new(day: impl Into<DayKey>, weight_kg: f64) -> Self {
        Self {
            day: day.into(),
            weight_kg,
            photo_filename: None,
            note: None,
            id: None,
        }
    }

    #[must_use]
    pub fn with_photo(mut self, filename: impl Into<String>) -> Self {
        self.photo_filename = Some(filename.into());
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }
}

/// Validate a weight before it reaches the store. The store itself accepts
/// any value; this is for callers taking user input.
pub fn validate_weight_kg(weight_kg: f64) -> Result<()> {
    if !weight_kg.is_finite() || weight_kg <= 0.0 {
        bail!("Weight must be a positive number (got {weight_kg})");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_day_key_from_local_instant_truncates_time() {
        let at = Local.with_ymd_and_hms(2026, 1, 29, 23, 59, 59).unwrap();
        let day = DayKey::from(at);
        assert_eq!(day.to_string(), "2026-01-29");
        let morning = Local.with_ymd_and_hms(2026, 1, 29, 0, 0, 1).unwrap();
        assert_eq!(DayKey::from(morning), day);
    }

    #[test]
    fn test_day_key_parse_and_days_before() {
        let day = DayKey::parse("2026-03-01").unwrap();
        assert_eq!(day.days_before(1).to_string(), "2026-02-28");
        assert!(DayKey::parse("01/03/2026").is_err());
        assert_eq!(day.days_before(u32::MAX).date(), NaiveDate::MIN);
    }

    #[test]
    fn test_profile_defaults() {
        let now = ts("2026-01-29T08:00:00Z");
        let profile = UserProfile::with_defaults(now);
        assert!((profile.height_cm - 170.0).abs() < f64::EPSILON);
        assert!((profile.target_weight_kg - 70.0).abs() < f64::EPSILON);
        assert_eq!(profile.created_at, profile.updated_at);
    }

    #[test]
    fn test_profile_apply_partial_update() {
        let created = ts("2026-01-29T08:00:00Z");
        let later = ts("2026-01-30T08:00:00Z");
        let mut profile = UserProfile::with_defaults(created);

        let changed = profile.apply(
            &ProfileUpdate {
                height_cm: Some(182.0),
                target_weight_kg: None,
            },
            later,
        );

        assert!(changed);
        assert!((profile.height_cm - 182.0).abs() < f64::EPSILON);
        assert!((profile.target_weight_kg - 70.0).abs() < f64::EPSILON);
        assert_eq!(profile.created_at, created);
        assert_eq!(profile.updated_at, later);
    }

    #[test]
    fn test_profile_apply_empty_update_is_noop() {
        let created = ts("2026-01-29T08:00:00Z");
        let mut profile = UserProfile::with_defaults(created);
        assert!(!profile.apply(&ProfileUpdate::default(), ts("2026-02-01T00:00:00Z")));
        assert_eq!(profile.updated_at, created);
    }

    #[test]
    fn test_validate_weight_kg() {
        assert!(validate_weight_kg(72.4).is_ok());
        assert!(validate_weight_kg(0.0).is_err());
        assert!(validate_weight_kg(-3.0).is_err());
        assert!(validate_weight_kg(f64::NAN).is_err());
    }

    #[test]
    fn test_weight_entry_serializes_day_as_string() {
        let now = ts("2026-01-29T08:00:00Z");
        let entry = WeightEntry {
            id: Uuid::nil(),
            day: DayKey::parse("2026-01-29").unwrap(),
            weight_kg: 88.6,
            photo_filename: None,
            note: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["day"], "2026-01-29");
        assert!(json.get("photo_filename").is_none());
    }
}
