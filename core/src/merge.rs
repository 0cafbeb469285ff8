//! Property-level three-way merge applied when a context commits.
//!
//! `base` is the row as the committing context first saw it (`None` for a
//! fresh insert), `ours` is the context's current value and `theirs` is what
//! the database holds at commit time. The merged value starts from `theirs`
//! so identity and creation time survive, then takes every field `ours`
//! changed according to the policy.

use chrono::{DateTime, Utc};

use crate::models::{UserProfile, WeightEntry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergePolicy {
    /// Fields changed by the committing context win, even when the store
    /// changed them too. Untouched fields keep the stored value.
    #[default]
    PropertyTrump,
    /// Fields changed on both sides keep the stored value.
    StoreTrump,
}

pub trait Mergeable: Clone {
    type Field: Copy + PartialEq + std::fmt::Debug + 'static;

    const FIELDS: &'static [Self::Field];

    fn field_differs(&self, other: &Self, field: Self::Field) -> bool;

    /// Optional fields left empty on a fresh insert do not count as changes.
    fn field_is_unset(&self, field: Self::Field) -> bool;

    fn take_field(&mut self, from: &Self, field: Self::Field);

    fn updated_at(&self) -> DateTime<Utc>;

    fn set_updated_at(&mut self, at: DateTime<Utc>);
}

pub fn changed_fields<T: Mergeable>(base: Option<&T>, current: &T) -> Vec<T::Field> {
    T::FIELDS
        .iter()
        .copied()
        .filter(|&f| match base {
            Some(b) => current.field_differs(b, f),
            None => !current.field_is_unset(f),
        })
        .collect()
}

#[must_use]
pub fn three_way<T: Mergeable>(policy: MergePolicy, base: Option<&T>, ours: &T, theirs: &T) -> T {
    let ours_changed = changed_fields(base, ours);
    let theirs_changed = match base {
        Some(b) => changed_fields(Some(b), theirs),
        // We never saw their row, so every field of it is news to us.
        None => T::FIELDS.to_vec(),
    };

    let mut merged = theirs.clone();
    let mut took_any = false;
    for field in ours_changed {
        if !theirs.field_differs(ours, field) {
            continue;
        }
        if !theirs_changed.contains(&field) || policy == MergePolicy::PropertyTrump {
            merged.take_field(ours, field);
            took_any = true;
        }
    }
    if took_any {
        merged.set_updated_at(ours.updated_at().max(theirs.updated_at()));
    }
    merged
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryField {
    WeightKg,
    PhotoFilename,
    Note,
}

impl Mergeable for WeightEntry {
    type Field = EntryField;

    const FIELDS: &'static [EntryField] =
        &[EntryField::WeightKg, EntryField::PhotoFilename, EntryField::Note];

    fn field_differs(&self, other: &Self, field: EntryField) -> bool {
        match field {
            EntryField::WeightKg => self.weight_kg.to_bits() != other.weight_kg.to_bits(),
            EntryField::PhotoFilename => self.photo_filename != other.photo_filename,
            EntryField::Note => self.note != other.note,
        }
    }

    fn field_is_unset(&self, field: EntryField) -> bool {
        match field {
            EntryField::WeightKg => false,
            EntryField::PhotoFilename => self.photo_filename.is_none(),
            EntryField::Note => self.note.is_none(),
        }
    }

    fn take_field(&mut self, from: &Self, field: EntryField) {
        match field {
            EntryField::WeightKg => self.weight_kg = from.weight_kg,
            EntryField::PhotoFilename => self.photo_filename.clone_from(&from.photo_filename),
            EntryField::Note => self.note.clone_from(&from.note),
        }
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    HeightCm,
    TargetWeightKg,
}

impl Mergeable for UserProfile {
    type Field = ProfileField;

    const FIELDS: &'static [ProfileField] = &[ProfileField::HeightCm, ProfileField::TargetWeightKg];

    fn field_differs(&self, other: &Self, field: ProfileField) -> bool {
        match field {
            ProfileField::HeightCm => self.height_cm.to_bits() != other.height_cm.to_bits(),
            ProfileField::TargetWeightKg => {
                self.target_weight_kg.to_bits() != other.target_weight_kg.to_bits()
            }
        }
    }

    fn field_is_unset(&self, _field: ProfileField) -> bool {
        false
    }

    fn take_field(&mut self, from: &Self, field: ProfileField) {
        match field {
            ProfileField::HeightCm => self.height_cm = from.height_cm,
            ProfileField::TargetWeightKg => self.target_weight_kg = from.target_weight_kg,
        }
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}
