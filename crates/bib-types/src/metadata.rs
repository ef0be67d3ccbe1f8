use serde::{Deserialize, Serialize};

/// Derived fingerprint and bookkeeping for one record.
///
/// Persisted as JSON with the field names `GUID`, `Length`, `QHash`, `MD5`,
/// `Ingest` and, once the record has been deleted, `Deleted`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// The record GUID this metadata belongs to. Never changes once stored.
    #[serde(rename = "GUID")]
    pub guid: String,
    /// Character count (UTF-16 code units) of the serialized record.
    #[serde(rename = "Length")]
    pub length: usize,
    /// Fast non-cryptographic fingerprint, `HSH-<n>`.
    #[serde(rename = "QHash")]
    pub qhash: String,
    /// Hex MD5 digest of the serialized record.
    #[serde(rename = "MD5")]
    pub md5: String,
    /// Epoch-ms of the last write that actually changed content.
    #[serde(rename = "Ingest")]
    pub ingest: i64,
    /// Epoch-ms tombstone time, set by delete.
    #[serde(rename = "Deleted", default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<i64>,
}

impl Metadata {
    /// Returns `true` if the record has been tombstoned.
    pub fn is_deleted(&self) -> bool {
        self.deleted.is_some()
    }

    /// Mark this metadata as deleted at the given time.
    pub fn tombstone(&mut self, at_ms: i64) {
        self.deleted = Some(at_ms);
    }

    /// The most recent time this metadata was touched: the tombstone time if
    /// it is later than the last ingest.
    pub fn last_touched(&self) -> i64 {
        match self.deleted {
            Some(deleted) => deleted.max(self.ingest),
            None => self.ingest,
        }
    }

    /// First fingerprint field of `fresh` that differs from this entry,
    /// checked cheapest first: `Length`, `QHash`, then `MD5`. Ingest and
    /// tombstone times are ignored.
    pub fn changed_field(&self, fresh: &Metadata) -> Option<&'static str> {
        if self.length != fresh.length {
            Some("Length")
        } else if self.qhash != fresh.qhash {
            Some("QHash")
        } else if self.md5 != fresh.md5 {
            Some("MD5")
        } else {
            None
        }
    }
}
