use bib_diff::{generate_delta, shallow_merge};
use bib_fingerprint::{record_hash, MetadataGenerator};
use bib_store::StorageBackend;
use bib_types::{
    now_ms, record_from_value, serialize_record, validate_guid, validate_source, DeltaContainer,
    Metadata, Record, TimeWindow,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{SdkError, SdkResult};

/// Pipeline switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BibliographOptions {
    /// Compare fresh metadata with the stored entry and skip unchanged writes.
    pub check_metadata_before_write: bool,
    /// Keep a per-record history of changed fields.
    pub store_deltas: bool,
    /// Write a tombstone even for a GUID that was never written.
    pub tombstone_unwritten_on_delete: bool,
}

impl Default for BibliographOptions {
    fn default() -> Self {
        Self {
            check_metadata_before_write: true,
            store_deltas: true,
            tombstone_unwritten_on_delete: false,
        }
    }
}

/// What a write did.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteOutcome {
    /// Metadata and body were persisted.
    pub changed: bool,
    /// An entry was appended to the delta history.
    pub delta_appended: bool,
    /// The metadata now describing the record. For an unchanged write this is
    /// the stored entry, with its original ingest time.
    pub metadata: Metadata,
}

/// Record store orchestrator.
///
/// Holds one storage backend and applies the write pipeline on top of it:
/// merge the incoming fields into the stored body, fingerprint the result,
/// skip the write when nothing changed, and append changed fields to the
/// record's history. All steps of one call run in order; separate calls may
/// run concurrently through an `Arc<Bibliograph<_>>`.
pub struct Bibliograph<S: StorageBackend> {
    storage: S,
    generator: MetadataGenerator,
    options: BibliographOptions,
}

impl<S: StorageBackend> Bibliograph<S> {
    pub fn new(storage: S) -> Self {
        Self::with_options(storage, BibliographOptions::default())
    }

    pub fn with_options(storage: S, options: BibliographOptions) -> Self {
        Self {
            storage,
            generator: MetadataGenerator::new(),
            options,
        }
    }

    pub fn options(&self) -> BibliographOptions {
        self.options
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    // ---- Lifecycle ----

    pub async fn initialize(&self) -> SdkResult<()> {
        self.storage.initialize().await?;
        info!(options = ?self.options, "bibliograph initialized");
        Ok(())
    }

    pub async fn create_source(&self, source: &str) -> SdkResult<()> {
        validate_source(source)?;
        self.storage.source_create(source).await?;
        info!(source, "source created");
        Ok(())
    }

    pub async fn source_exists(&self, source: &str) -> SdkResult<bool> {
        validate_source(source)?;
        Ok(self.storage.source_exists(source).await?)
    }

    // ---- Writes ----

    /// Merge `partial` into the stored record and persist what changed.
    pub async fn write(&self, source: &str, guid: &str, partial: &Record) -> SdkResult<WriteOutcome> {
        validate_source(source)?;
        validate_guid(guid)?;

        let current = match self.storage.read_record(source, guid).await {
            Ok(current) => current,
            Err(e) => {
                warn!(source, guid, error = %e, "stored record unreadable; merging onto an empty record");
                None
            }
        };

        let merged = shallow_merge(current.clone().unwrap_or_default(), partial);
        let serialized = serialize_record(&merged);
        let metadata = self.generator.generate(guid, &serialized);

        let prior = if self.options.check_metadata_before_write {
            match self.storage.read_metadata(source, guid).await {
                Ok(prior) => prior,
                Err(e) => {
                    warn!(source, guid, error = %e, "stored metadata unreadable; treating as absent");
                    None
                }
            }
        } else {
            None
        };

        let changed = match (&prior, self.options.check_metadata_before_write) {
            (_, false) => true,
            (None, true) => {
                debug!(source, guid, "no stored metadata; record is new");
                true
            }
            (Some(prior), true) => {
                if prior.guid != guid {
                    error!(source, guid, stored = %prior.guid, "metadata GUID mismatch");
                    return Err(SdkError::Consistency {
                        guid: guid.to_string(),
                        stored: prior.guid.clone(),
                    });
                }
                match first_mismatch(prior, &metadata) {
                    Some(field) => {
                        debug!(source, guid, field, "record changed");
                        true
                    }
                    None => false,
                }
            }
        };

        let delta_appended = if self.options.store_deltas {
            self.append_delta(source, current.as_ref(), &merged, &metadata).await?
        } else {
            false
        };

        if !changed {
            debug!(source, guid, "record unchanged; skipping persist");
            let metadata = prior.unwrap_or(metadata);
            return Ok(WriteOutcome {
                changed,
                delta_appended,
                metadata,
            });
        }

        let expected_md5 = prior.as_ref().map(|p| p.md5.as_str());
        self.storage
            .persist_metadata(source, guid, &metadata, expected_md5)
            .await?;
        self.storage.persist_record(source, guid, &serialized).await?;
        self.storage
            .stamp_timestamp(source, guid, metadata.ingest)
            .await?;
        debug!(source, guid, md5 = %metadata.md5, "record persisted");

        Ok(WriteOutcome {
            changed,
            delta_appended,
            metadata,
        })
    }

    /// Write an arbitrary JSON value, which must be an object.
    pub async fn write_value(&self, source: &str, guid: &str, value: Value) -> SdkResult<WriteOutcome> {
        validate_source(source)?;
        validate_guid(guid)?;
        let record = record_from_value(value)?;
        self.write(source, guid, &record).await
    }

    async fn append_delta(
        &self,
        source: &str,
        current: Option<&Record>,
        merged: &Record,
        metadata: &Metadata,
    ) -> SdkResult<bool> {
        let Some(delta) = generate_delta(current, merged) else {
            return Ok(false);
        };
        let guid = metadata.guid.as_str();

        let mut container = match self.storage.read_delta(source, guid).await {
            Ok(container) => container,
            Err(e) => {
                warn!(source, guid, error = %e, "delta history unreadable; starting a new one");
                DeltaContainer::empty(guid)
            }
        };
        container.push(delta, metadata.ingest);
        self.storage.persist_delta(source, metadata, &container).await?;
        debug!(source, guid, entries = container.len(), "delta appended");
        Ok(true)
    }

    // ---- Delete ----

    /// Tombstone the metadata and remove the record body.
    ///
    /// Returns the tombstoned metadata, or `None` when there was nothing to
    /// tombstone. Deleting a missing record is not an error; an unreadable
    /// metadata entry is, and leaves the body in place.
    pub async fn delete(&self, source: &str, guid: &str) -> SdkResult<Option<Metadata>> {
        validate_source(source)?;
        validate_guid(guid)?;

        // An unreadable entry aborts before the body is touched.
        let prior = self.storage.read_metadata(source, guid).await.map_err(|e| {
            warn!(source, guid, error = %e, "stored metadata unreadable; delete aborted");
            e
        })?;
        let expected_md5 = prior.as_ref().map(|p| p.md5.clone());

        let target = match prior {
            Some(prior) => Some(prior),
            None if self.options.tombstone_unwritten_on_delete => {
                Some(self.generator.generate(guid, &serialize_record(&Record::new())))
            }
            None => {
                debug!(source, guid, "no metadata to tombstone");
                None
            }
        };

        let tombstone = match target {
            Some(mut metadata) => {
                let at = now_ms();
                metadata.tombstone(at);
                self.storage
                    .persist_metadata(source, guid, &metadata, expected_md5.as_deref())
                    .await?;
                self.storage.stamp_timestamp(source, guid, at).await?;
                Some(metadata)
            }
            None => None,
        };

        let removed = self.storage.persist_delete(source, guid).await?;
        debug!(source, guid, removed, "record deleted");
        Ok(tombstone)
    }

    // ---- Queries ----

    pub async fn read(&self, source: &str, guid: &str) -> SdkResult<Option<Record>> {
        validate_source(source)?;
        validate_guid(guid)?;
        Ok(self.storage.read_record(source, guid).await?)
    }

    pub async fn exists(&self, source: &str, guid: &str) -> SdkResult<bool> {
        validate_source(source)?;
        validate_guid(guid)?;
        Ok(self.storage.record_exists(source, guid).await?)
    }

    pub async fn read_metadata(&self, source: &str, guid: &str) -> SdkResult<Option<Metadata>> {
        validate_source(source)?;
        validate_guid(guid)?;
        Ok(self.storage.read_metadata(source, guid).await?)
    }

    pub async fn read_delta(&self, source: &str, guid: &str) -> SdkResult<DeltaContainer> {
        validate_source(source)?;
        validate_guid(guid)?;
        Ok(self.storage.read_delta(source, guid).await?)
    }

    pub async fn list_keys(&self, source: &str) -> SdkResult<Vec<String>> {
        validate_source(source)?;
        Ok(self.storage.list_keys(source).await?)
    }

    pub async fn list_keys_by_time_window(
        &self,
        source: &str,
        window: TimeWindow,
    ) -> SdkResult<Vec<String>> {
        validate_source(source)?;
        Ok(self.storage.list_keys_by_time_window(source, window).await?)
    }

    /// MD5 of the record's compact JSON; the CLI's default GUID.
    pub fn record_hash(&self, record: &Record) -> String {
        record_hash(&serialize_record(record))
    }
}

/// Why `fresh` replaces `prior`, if it does. A tombstoned entry always counts
/// as changed so a rewrite resurrects it.
fn first_mismatch(prior: &Metadata, fresh: &Metadata) -> Option<&'static str> {
    prior
        .changed_field(fresh)
        .or_else(|| prior.is_deleted().then_some("Deleted"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use bib_store::{FsStorage, InMemoryStorage, StoreError, StoreResult};
    use bib_types::TypeError;
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> Record {
        record_from_value(value).unwrap()
    }

    /// In-memory store where, once armed, the next metadata read is followed
    /// by a rival metadata write, as if another writer got in between.
    struct RacingStorage {
        inner: InMemoryStorage,
        raced: AtomicBool,
    }

    impl RacingStorage {
        fn new() -> Self {
            Self {
                inner: InMemoryStorage::new(),
                raced: AtomicBool::new(true),
            }
        }

        fn arm(&self) {
            self.raced.store(false, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StorageBackend for RacingStorage {
        async fn initialize(&self) -> StoreResult<()> {
            self.inner.initialize().await
        }

        async fn source_create(&self, source: &str) -> StoreResult<()> {
            self.inner.source_create(source).await
        }

        async fn source_exists(&self, source: &str) -> StoreResult<bool> {
            self.inner.source_exists(source).await
        }

        async fn persist_record(&self, source: &str, guid: &str, body: &str) -> StoreResult<()> {
            self.inner.persist_record(source, guid, body).await
        }

        async fn read_record(&self, source: &str, guid: &str) -> StoreResult<Option<Record>> {
            self.inner.read_record(source, guid).await
        }

        async fn record_exists(&self, source: &str, guid: &str) -> StoreResult<bool> {
            self.inner.record_exists(source, guid).await
        }

        async fn persist_metadata(
            &self,
            source: &str,
            guid: &str,
            metadata: &Metadata,
            expected_md5: Option<&str>,
        ) -> StoreResult<()> {
            self.inner
                .persist_metadata(source, guid, metadata, expected_md5)
                .await
        }

        async fn read_metadata(&self, source: &str, guid: &str) -> StoreResult<Option<Metadata>> {
            let seen = self.inner.read_metadata(source, guid).await?;
            if !self.raced.swap(true, Ordering::SeqCst) {
                let rival = MetadataGenerator::new().generate(guid, r#"{"rival":true}"#);
                self.inner.persist_metadata(source, guid, &rival, None).await?;
            }
            Ok(seen)
        }

        async fn persist_delta(
            &self,
            source: &str,
            metadata: &Metadata,
            container: &DeltaContainer,
        ) -> StoreResult<()> {
            self.inner.persist_delta(source, metadata, container).await
        }

        async fn read_delta(&self, source: &str, guid: &str) -> StoreResult<DeltaContainer> {
            self.inner.read_delta(source, guid).await
        }

        async fn list_keys(&self, source: &str) -> StoreResult<Vec<String>> {
            self.inner.list_keys(source).await
        }

        async fn list_keys_by_time_window(
            &self,
            source: &str,
            window: TimeWindow,
        ) -> StoreResult<Vec<String>> {
            self.inner.list_keys_by_time_window(source, window).await
        }

        async fn stamp_timestamp(&self, source: &str, guid: &str, at_ms: i64) -> StoreResult<()> {
            self.inner.stamp_timestamp(source, guid, at_ms).await
        }

        async fn persist_delete(&self, source: &str, guid: &str) -> StoreResult<bool> {
            self.inner.persist_delete(source, guid).await
        }
    }

    async fn racing_sdk() -> Bibliograph<RacingStorage> {
        let sdk = Bibliograph::new(RacingStorage::new());
        sdk.initialize().await.unwrap();
        sdk.create_source("S").await.unwrap();
        sdk
    }

    async fn fs_sdk(dir: &std::path::Path) -> Bibliograph<FsStorage> {
        let sdk = Bibliograph::new(FsStorage::new(dir));
        sdk.initialize().await.unwrap();
        sdk.create_source("S").await.unwrap();
        sdk
    }

    async fn memory_sdk() -> Bibliograph<InMemoryStorage> {
        let sdk = Bibliograph::new(InMemoryStorage::new());
        sdk.initialize().await.unwrap();
        sdk.create_source("S").await.unwrap();
        sdk
    }

    // -----------------------------------------------------------------------
    // Merge and dedup
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn partial_writes_merge_into_stored_record() {
        let sdk = memory_sdk().await;
        sdk.write("S", "A", &record(json!({"Name": "Alice", "Age": 41})))
            .await
            .unwrap();
        sdk.write("S", "A", &record(json!({"Age": 870, "City": "Oslo"})))
            .await
            .unwrap();

        let stored = sdk.read("S", "A").await.unwrap().unwrap();
        assert_eq!(
            serialize_record(&stored),
            r#"{"Name":"Alice","Age":870,"City":"Oslo"}"#
        );
    }

    #[tokio::test]
    async fn identical_rewrite_keeps_metadata() {
        let sdk = memory_sdk().await;
        let alice = record(json!({"Name": "Alice", "Age": 41}));

        let first = sdk.write("S", "A", &alice).await.unwrap();
        assert!(first.changed);
        assert_eq!(first.metadata.md5, "461d65fea865254459a3c57f2f554ccf");
        assert_eq!(first.metadata.length, 25);
        assert_eq!(first.metadata.qhash, "HSH-1024085287");

        let second = sdk.write("S", "A", &alice).await.unwrap();
        assert!(!second.changed);
        assert!(!second.delta_appended);
        assert_eq!(second.metadata, first.metadata);
        assert_eq!(sdk.read_metadata("S", "A").await.unwrap(), Some(first.metadata.clone()));

        // A partial write of an unchanged field also merges to the same body.
        let partial = sdk.write("S", "A", &record(json!({"Age": 41}))).await.unwrap();
        assert!(!partial.changed);
        assert_eq!(partial.metadata.ingest, first.metadata.ingest);
    }

    #[tokio::test]
    async fn changed_write_refingerprints() {
        let sdk = memory_sdk().await;
        sdk.write("S", "A", &record(json!({"Name": "Alice", "Age": 41})))
            .await
            .unwrap();
        let outcome = sdk.write("S", "A", &record(json!({"Age": 870}))).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.metadata.md5, "e67ddd09559f12dc1740bfb11212b3bf");
        assert_eq!(outcome.metadata.length, 26);
        assert_eq!(outcome.metadata.qhash, "HSH-1681750157");
    }

    // -----------------------------------------------------------------------
    // Delta history
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn delta_history_grows_with_changes() {
        let sdk = memory_sdk().await;
        for color in ["Pink", "Green", "Beautiful"] {
            let outcome = sdk.write("S", "X", &record(json!({"Color": color}))).await.unwrap();
            assert!(outcome.delta_appended);
        }
        let unchanged = sdk
            .write("S", "X", &record(json!({"Color": "Beautiful"})))
            .await
            .unwrap();
        assert!(!unchanged.delta_appended);

        let history = sdk.read_delta("S", "X").await.unwrap();
        assert_eq!(history.record_guid, "X");
        assert_eq!(history.len(), 3);
        assert_eq!(history.deltas[1].delta, record(json!({"Color": "Green"})));

        let stored = sdk.read("S", "X").await.unwrap().unwrap();
        assert_eq!(stored["Color"], json!("Beautiful"));
    }

    #[tokio::test]
    async fn delta_holds_only_changed_fields() {
        let sdk = memory_sdk().await;
        sdk.write("S", "A", &record(json!({"Name": "Alice", "Age": 41})))
            .await
            .unwrap();
        let outcome = sdk
            .write("S", "A", &record(json!({"Name": "Alice", "Age": 42})))
            .await
            .unwrap();

        let history = sdk.read_delta("S", "A").await.unwrap();
        let latest = history.latest().unwrap();
        assert_eq!(latest.delta, record(json!({"Age": 42})));
        assert_eq!(latest.ingest, outcome.metadata.ingest);
    }

    #[tokio::test]
    async fn deltas_can_be_disabled() {
        let options = BibliographOptions {
            store_deltas: false,
            ..Default::default()
        };
        let sdk = Bibliograph::with_options(InMemoryStorage::new(), options);
        sdk.initialize().await.unwrap();
        sdk.create_source("S").await.unwrap();

        let outcome = sdk.write("S", "A", &record(json!({"x": 1}))).await.unwrap();
        assert!(outcome.changed);
        assert!(!outcome.delta_appended);
        assert!(sdk.read_delta("S", "A").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn without_metadata_check_every_write_persists() {
        let options = BibliographOptions {
            check_metadata_before_write: false,
            ..Default::default()
        };
        let sdk = Bibliograph::with_options(InMemoryStorage::new(), options);
        sdk.initialize().await.unwrap();
        sdk.create_source("S").await.unwrap();

        let body = record(json!({"x": 1}));
        assert!(sdk.write("S", "A", &body).await.unwrap().changed);
        assert!(sdk.write("S", "A", &body).await.unwrap().changed);
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn delete_then_resurrect() {
        let sdk = memory_sdk().await;
        let body = record(json!({"Name": "Alice"}));
        sdk.write("S", "A", &body).await.unwrap();

        let tombstone = sdk.delete("S", "A").await.unwrap().expect("tombstone");
        assert!(tombstone.is_deleted());
        assert!(!sdk.exists("S", "A").await.unwrap());
        assert!(sdk.read("S", "A").await.unwrap().is_none());
        assert!(sdk.read_metadata("S", "A").await.unwrap().unwrap().is_deleted());

        // Same content again: the tombstone forces a real write.
        let outcome = sdk.write("S", "A", &body).await.unwrap();
        assert!(outcome.changed);
        assert!(!outcome.metadata.is_deleted());
        assert_eq!(sdk.read("S", "A").await.unwrap(), Some(body));
        assert!(!sdk.read_metadata("S", "A").await.unwrap().unwrap().is_deleted());
    }

    #[tokio::test]
    async fn delete_of_unknown_guid_is_noop_by_default() {
        let sdk = memory_sdk().await;
        assert_eq!(sdk.delete("S", "ghost").await.unwrap(), None);
        assert!(sdk.read_metadata("S", "ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_of_unknown_guid_can_tombstone() {
        let options = BibliographOptions {
            tombstone_unwritten_on_delete: true,
            ..Default::default()
        };
        let sdk = Bibliograph::with_options(InMemoryStorage::new(), options);
        sdk.initialize().await.unwrap();
        sdk.create_source("S").await.unwrap();

        let tombstone = sdk.delete("S", "ghost").await.unwrap().unwrap();
        assert_eq!(tombstone.md5, "99914b932bd37a50b983c5e7c90ae93b");
        assert!(sdk.read_metadata("S", "ghost").await.unwrap().unwrap().is_deleted());
    }

    // -----------------------------------------------------------------------
    // Time windows
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn time_window_sees_writes_and_deletes() {
        let sdk = memory_sdk().await;
        let before = now_ms();
        sdk.write("S", "A", &record(json!({"x": 1}))).await.unwrap();
        sdk.write("S", "B", &record(json!({"x": 2}))).await.unwrap();
        sdk.delete("S", "B").await.unwrap();
        let after = now_ms();

        let window = TimeWindow::new(before, after).unwrap();
        assert_eq!(
            sdk.list_keys_by_time_window("S", window).await.unwrap(),
            vec!["A", "B"]
        );
        let earlier = TimeWindow::new(0, before - 1).unwrap();
        assert!(sdk.list_keys_by_time_window("S", earlier).await.unwrap().is_empty());
        assert_eq!(sdk.list_keys("S").await.unwrap(), vec!["A"]);
    }

    // -----------------------------------------------------------------------
    // Validation and errors
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn validation_precedes_storage() {
        // Uninitialized: any storage call would fail with NotInitialized.
        let sdk = Bibliograph::new(InMemoryStorage::new());
        let body = record(json!({"x": 1}));

        let err = sdk.write("", "A", &body).await.unwrap_err();
        assert!(matches!(err, SdkError::Validation(TypeError::EmptySource)));
        let err = sdk.write("S", "", &body).await.unwrap_err();
        assert!(matches!(err, SdkError::Validation(TypeError::EmptyGuid)));
        let err = sdk.read("", "A").await.unwrap_err();
        assert!(matches!(err, SdkError::Validation(_)));
        let err = sdk.delete("S", "").await.unwrap_err();
        assert!(matches!(err, SdkError::Validation(_)));
        let err = sdk.exists("", "").await.unwrap_err();
        assert!(matches!(err, SdkError::Validation(_)));
        let err = sdk.write_value("S", "A", json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, SdkError::Validation(TypeError::NotAMap("array"))));
    }

    #[tokio::test]
    async fn uninitialized_storage_surfaces() {
        let sdk = Bibliograph::new(InMemoryStorage::new());
        let err = sdk.write("S", "A", &record(json!({"x": 1}))).await.unwrap_err();
        assert!(matches!(err, SdkError::Store(StoreError::NotInitialized { .. })));
    }

    #[tokio::test]
    async fn metadata_under_wrong_guid_is_fatal() {
        let sdk = memory_sdk().await;
        let foreign = MetadataGenerator::new().generate("B", "{}");
        sdk.storage()
            .persist_metadata("S", "A", &foreign, None)
            .await
            .unwrap();

        let err = sdk.write("S", "A", &record(json!({"x": 1}))).await.unwrap_err();
        match err {
            SdkError::Consistency { guid, stored } => {
                assert_eq!(guid, "A");
                assert_eq!(stored, "B");
            }
            other => panic!("expected Consistency, got {other:?}"),
        }
        assert!(sdk.read("S", "A").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_into_missing_source_fails() {
        let sdk = memory_sdk().await;
        let err = sdk.write("Nope", "A", &record(json!({"x": 1}))).await.unwrap_err();
        assert!(matches!(err, SdkError::Store(StoreError::SourceNotCreated(_))));
    }

    #[tokio::test]
    async fn write_value_accepts_objects() {
        let sdk = memory_sdk().await;
        let outcome = sdk.write_value("S", "A", json!({"k": "v"})).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(sdk.record_hash(&record(json!({}))), "99914b932bd37a50b983c5e7c90ae93b");
    }

    // -----------------------------------------------------------------------
    // Concurrency and backends
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn concurrent_writes_to_distinct_records() {
        let sdk = Arc::new(memory_sdk().await);
        let mut handles = Vec::new();
        for i in 0..16 {
            let sdk = Arc::clone(&sdk);
            handles.push(tokio::spawn(async move {
                let guid = format!("R{i:02}");
                sdk.write("S", &guid, &record(json!({"n": i}))).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().changed);
        }
        assert_eq!(sdk.list_keys("S").await.unwrap().len(), 16);
        assert_eq!(sdk.storage().record_count("S"), 16);
    }

    #[tokio::test]
    async fn filesystem_backend_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let sdk = Bibliograph::new(FsStorage::new(dir.path()));
        sdk.initialize().await.unwrap();
        sdk.create_source("Books").await.unwrap();
        sdk.create_source("Books").await.unwrap();
        assert!(sdk.source_exists("Books").await.unwrap());

        sdk.write("Books", "A", &record(json!({"Name": "Alice", "Age": 41})))
            .await
            .unwrap();
        let on_disk = std::fs::read_to_string(dir.path().join("Books/record/A.json")).unwrap();
        assert_eq!(on_disk, r#"{"Name":"Alice","Age":41}"#);

        let second = sdk
            .write("Books", "A", &record(json!({"Name": "Alice", "Age": 41})))
            .await
            .unwrap();
        assert!(!second.changed);

        sdk.delete("Books", "A").await.unwrap();
        assert!(!sdk.exists("Books", "A").await.unwrap());
        assert!(dir.path().join("Books/metadata/_A_metadata.json").is_file());
        assert_eq!(sdk.read_delta("Books", "A").await.unwrap().len(), 1);
    }

    // -----------------------------------------------------------------------
    // Unreadable prior state and lost updates
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn write_proceeds_over_unreadable_prior_state() {
        let dir = tempfile::tempdir().unwrap();
        let sdk = fs_sdk(dir.path()).await;
        sdk.write("S", "A", &record(json!({"x": 1}))).await.unwrap();

        for file in ["record/A.json", "metadata/_A_metadata.json", "history/_A_deltas.json"] {
            std::fs::write(dir.path().join("S").join(file), "{bad").unwrap();
        }

        let outcome = sdk.write_value("S", "A", json!({"y": 2})).await.unwrap();
        assert!(outcome.changed);
        assert!(outcome.delta_appended);

        assert_eq!(sdk.read("S", "A").await.unwrap(), Some(record(json!({"y": 2}))));
        assert_eq!(sdk.read_metadata("S", "A").await.unwrap(), Some(outcome.metadata));
        let history = sdk.read_delta("S", "A").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.deltas[0].delta, record(json!({"y": 2})));
    }

    #[tokio::test]
    async fn delete_keeps_body_when_metadata_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let sdk = fs_sdk(dir.path()).await;
        sdk.write("S", "A", &record(json!({"x": 1}))).await.unwrap();
        std::fs::write(dir.path().join("S/metadata/_A_metadata.json"), "{bad").unwrap();

        let err = sdk.delete("S", "A").await.unwrap_err();
        assert!(matches!(err, SdkError::Store(StoreError::Serialization { .. })));
        assert!(sdk.exists("S", "A").await.unwrap());
        assert_eq!(sdk.read("S", "A").await.unwrap(), Some(record(json!({"x": 1}))));
    }

    #[tokio::test]
    async fn lost_update_on_write_is_rejected() {
        let sdk = racing_sdk().await;
        sdk.write("S", "A", &record(json!({"x": 1}))).await.unwrap();

        sdk.storage().arm();
        let err = sdk.write("S", "A", &record(json!({"x": 2}))).await.unwrap_err();
        match err {
            SdkError::Store(StoreError::Conflict { guid, .. }) => assert_eq!(guid, "A"),
            other => panic!("expected Conflict, got {other:?}"),
        }
        // The body was not overwritten.
        assert_eq!(sdk.read("S", "A").await.unwrap(), Some(record(json!({"x": 1}))));
    }

    #[tokio::test]
    async fn lost_update_on_delete_is_rejected() {
        let sdk = racing_sdk().await;
        sdk.write("S", "A", &record(json!({"x": 1}))).await.unwrap();

        sdk.storage().arm();
        let err = sdk.delete("S", "A").await.unwrap_err();
        assert!(matches!(err, SdkError::Store(StoreError::Conflict { .. })));
        assert!(sdk.exists("S", "A").await.unwrap());
    }
}
