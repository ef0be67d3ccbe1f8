use async_trait::async_trait;
use bib_types::{DeltaContainer, Metadata, Record, TimeWindow};

use crate::error::StoreResult;

/// Primitive persistence operations for Bibliograph records.
///
/// All implementations must satisfy these invariants:
/// - Operations are keyed by (source, GUID) and contain no merge, dedup or
///   delta-accumulation logic.
/// - `record_exists` depends only on the presence of the record body.
/// - `read_delta` always yields a container, synthesizing an empty one when
///   no valid history exists.
/// - `persist_delete` of an absent record succeeds and returns `false`.
/// - Every operation other than `initialize` fails with
///   [`StoreError::NotInitialized`](crate::StoreError::NotInitialized) until
///   `initialize` has completed.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Prepare the backend for use (create and check the storage root).
    async fn initialize(&self) -> StoreResult<()>;

    /// Create a source keyspace. Creating an existing source is a no-op.
    async fn source_create(&self, source: &str) -> StoreResult<()>;

    /// Check whether a source keyspace exists.
    async fn source_exists(&self, source: &str) -> StoreResult<bool>;

    /// Replace the stored body of a record with `body` (compact JSON).
    async fn persist_record(&self, source: &str, guid: &str, body: &str) -> StoreResult<()>;

    /// Read a record body. Returns `Ok(None)` if it does not exist.
    async fn read_record(&self, source: &str, guid: &str) -> StoreResult<Option<Record>>;

    /// Check whether a record body exists.
    async fn record_exists(&self, source: &str, guid: &str) -> StoreResult<bool>;

    /// Store the metadata entry of a record.
    ///
    /// `expected_md5` is a compare-and-swap hint: a backend that supports it
    /// rejects the write with [`StoreError::Conflict`](crate::StoreError::Conflict)
    /// when the stored MD5 differs. Backends without CAS ignore it.
    async fn persist_metadata(
        &self,
        source: &str,
        guid: &str,
        metadata: &Metadata,
        expected_md5: Option<&str>,
    ) -> StoreResult<()>;

    /// Read the metadata of a record. Returns `Ok(None)` if none was stored.
    async fn read_metadata(&self, source: &str, guid: &str) -> StoreResult<Option<Metadata>>;

    /// Replace the delta history of the record named by `metadata.guid`.
    async fn persist_delta(
        &self,
        source: &str,
        metadata: &Metadata,
        container: &DeltaContainer,
    ) -> StoreResult<()>;

    /// Read the delta history of a record, or an empty container.
    async fn read_delta(&self, source: &str, guid: &str) -> StoreResult<DeltaContainer>;

    /// GUIDs of all records with a body in `source`, sorted.
    async fn list_keys(&self, source: &str) -> StoreResult<Vec<String>>;

    /// GUIDs whose metadata was last touched within `window`, sorted.
    async fn list_keys_by_time_window(
        &self,
        source: &str,
        window: TimeWindow,
    ) -> StoreResult<Vec<String>>;

    /// Record that the GUID was touched at `at_ms`.
    ///
    /// Backends whose last-write time is implicit in the stored metadata may
    /// leave this as the default no-op.
    async fn stamp_timestamp(&self, _source: &str, _guid: &str, _at_ms: i64) -> StoreResult<()> {
        Ok(())
    }

    /// Remove a record body. Returns `true` if a body was removed.
    async fn persist_delete(&self, source: &str, guid: &str) -> StoreResult<bool>;
}
