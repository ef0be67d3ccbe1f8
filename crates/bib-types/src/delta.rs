//! Field-level change history for a record.

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// One recorded change: the new values of the fields that changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(rename = "Delta")]
    pub delta: Record,
    /// Epoch-ms of the write that produced this change.
    #[serde(rename = "Ingest")]
    pub ingest: i64,
}

/// Append-only ordered list of deltas for one record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeltaContainer {
    #[serde(rename = "RecordGUID")]
    pub record_guid: String,
    #[serde(rename = "Deltas")]
    pub deltas: Vec<Delta>,
}

impl DeltaContainer {
    /// An empty container for a record that has no history yet.
    pub fn empty(record_guid: impl Into<String>) -> Self {
        Self {
            record_guid: record_guid.into(),
            deltas: Vec::new(),
        }
    }

    /// Append a change. The list is never reordered or truncated.
    pub fn push(&mut self, delta: Record, ingest: i64) {
        self.deltas.push(Delta { delta, ingest });
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// The most recent change, if any.
    pub fn latest(&self) -> Option<&Delta> {
        self.deltas.last()
    }
}
