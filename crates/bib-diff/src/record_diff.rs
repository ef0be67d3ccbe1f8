//! Record-level diff: which incoming fields differ from the stored record.

use bib_types::Record;
use serde::{Deserialize, Serialize};

/// The result of comparing an incoming record against a stored one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDiff {
    /// `true` iff no incoming field differs.
    #[serde(rename = "Match")]
    pub matched: bool,
    /// Keys of the incoming record whose values differ, in its key order.
    #[serde(rename = "Changed")]
    pub changed: Vec<String>,
}

impl RecordDiff {
    /// Returns `true` if nothing changed.
    pub fn is_match(&self) -> bool {
        self.matched
    }

    /// Number of changed fields.
    pub fn len(&self) -> usize {
        self.changed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Compare every key of `new` against `old`.
///
/// A key is changed when `old` does not hold it or holds a different value.
/// A key missing from `old` counts as changed even if `new` maps it to
/// `null`. Keys present only in `old` are not considered.
pub fn diff_records(old: &Record, new: &Record) -> RecordDiff {
    let changed: Vec<String> = new
        .iter()
        .filter(|(key, value)| old.get(key.as_str()) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect();

    RecordDiff {
        matched: changed.is_empty(),
        changed,
    }
}

/// Extract the changed fields of `new` named by `diff`.
///
/// Returns `None` when the diff reports no changes.
pub fn delta_from_diff(new: &Record, diff: &RecordDiff) -> Option<Record> {
    if diff.changed.is_empty() {
        return None;
    }

    let delta = diff
        .changed
        .iter()
        .filter_map(|key| new.get(key).map(|value| (key.clone(), value.clone())))
        .collect();
    Some(delta)
}

/// Diff `new` against `old` (a missing `old` is an empty record) and return
/// the changed fields, or `None` if nothing changed.
pub fn generate_delta(old: Option<&Record>, new: &Record) -> Option<Record> {
    let empty = Record::new();
    let old = old.unwrap_or(&empty);
    delta_from_diff(new, &diff_records(old, new))
}
