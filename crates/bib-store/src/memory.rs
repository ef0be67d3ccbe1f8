use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use bib_types::{DeltaContainer, Metadata, Record, TimeWindow};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::StorageBackend;

/// One source keyspace.
#[derive(Default)]
struct SourceSpace {
    /// Serialized record bodies, exactly as persisted.
    records: HashMap<String, String>,
    metadata: HashMap<String, Metadata>,
    deltas: HashMap<String, DeltaContainer>,
    /// Last-modified index fed by `stamp_timestamp`.
    stamps: HashMap<String, i64>,
}

/// In-memory, HashMap-based storage backend.
///
/// Intended for tests and embedding. All sources are held behind a `RwLock`;
/// the lock is taken and released inside each call, never across an
/// `.await`. Unlike [`FsStorage`](crate::FsStorage) this backend honors the
/// compare-and-swap hint on metadata writes.
pub struct InMemoryStorage {
    initialized: AtomicBool,
    sources: RwLock<HashMap<String, SourceSpace>>,
}

impl InMemoryStorage {
    /// Create a new, uninitialized store.
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            sources: RwLock::new(HashMap::new()),
        }
    }

    /// Number of sources created so far.
    pub fn source_count(&self) -> usize {
        self.sources.read().expect("lock poisoned").len()
    }

    /// Number of record bodies stored in `source`.
    pub fn record_count(&self, source: &str) -> usize {
        self.sources
            .read()
            .expect("lock poisoned")
            .get(source)
            .map(|space| space.records.len())
            .unwrap_or(0)
    }

    fn ensure_initialized(&self, operation: impl FnOnce() -> String) -> StoreResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::NotInitialized {
                operation: operation(),
            })
        }
    }

    /// Run `f` against a created source, or fail with `SourceNotCreated`.
    fn with_source_mut<T>(
        &self,
        source: &str,
        f: impl FnOnce(&mut SourceSpace) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut sources = self.sources.write().expect("lock poisoned");
        let space = sources
            .get_mut(source)
            .ok_or_else(|| StoreError::SourceNotCreated(source.to_string()))?;
        f(space)
    }

    fn with_source<T>(&self, source: &str, missing: T, f: impl FnOnce(&SourceSpace) -> T) -> T {
        let sources = self.sources.read().expect("lock poisoned");
        match sources.get(source) {
            Some(space) => f(space),
            None => missing,
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn initialize(&self) -> StoreResult<()> {
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn source_create(&self, source: &str) -> StoreResult<()> {
        self.ensure_initialized(|| format!("creation of source [{source}]"))?;
        let mut sources = self.sources.write().expect("lock poisoned");
        sources.entry(source.to_string()).or_default();
        Ok(())
    }

    async fn source_exists(&self, source: &str) -> StoreResult<bool> {
        self.ensure_initialized(|| format!("check of source [{source}]"))?;
        Ok(self.with_source(source, false, |_| true))
    }

    async fn persist_record(&self, source: &str, guid: &str, body: &str) -> StoreResult<()> {
        self.ensure_initialized(|| format!("write of record [{source}]:[{guid}]"))?;
        self.with_source_mut(source, |space| {
            space.records.insert(guid.to_string(), body.to_string());
            Ok(())
        })
    }

    async fn read_record(&self, source: &str, guid: &str) -> StoreResult<Option<Record>> {
        self.ensure_initialized(|| format!("read of record [{source}]:[{guid}]"))?;
        let body = self.with_source(source, None, |space| space.records.get(guid).cloned());
        match body {
            Some(body) => serde_json::from_str(&body).map(Some).map_err(|e| StoreError::Serialization {
                location: format!("memory:{source}/{guid}"),
                reason: e.to_string(),
            }),
            None => Ok(None),
        }
    }

    async fn record_exists(&self, source: &str, guid: &str) -> StoreResult<bool> {
        self.ensure_initialized(|| format!("check existence of record [{source}]:[{guid}]"))?;
        Ok(self.with_source(source, false, |space| space.records.contains_key(guid)))
    }

    async fn persist_metadata(
        &self,
        source: &str,
        guid: &str,
        metadata: &Metadata,
        expected_md5: Option<&str>,
    ) -> StoreResult<()> {
        self.ensure_initialized(|| format!("write of record [{source}]:[{guid}] metadata"))?;
        self.with_source_mut(source, |space| {
            if let Some(expected) = expected_md5 {
                let actual = space.metadata.get(guid).map(|stored| stored.md5.as_str());
                if actual != Some(expected) {
                    return Err(StoreError::Conflict {
                        guid: guid.to_string(),
                        expected: expected.to_string(),
                        actual: actual.unwrap_or("<none>").to_string(),
                    });
                }
            }
            space.metadata.insert(guid.to_string(), metadata.clone());
            Ok(())
        })
    }

    async fn read_metadata(&self, source: &str, guid: &str) -> StoreResult<Option<Metadata>> {
        self.ensure_initialized(|| format!("read of record [{source}]:[{guid}] metadata"))?;
        Ok(self.with_source(source, None, |space| space.metadata.get(guid).cloned()))
    }

    async fn persist_delta(
        &self,
        source: &str,
        metadata: &Metadata,
        container: &DeltaContainer,
    ) -> StoreResult<()> {
        self.ensure_initialized(|| format!("write of record [{source}]:[{}] delta", metadata.guid))?;
        self.with_source_mut(source, |space| {
            space.deltas.insert(metadata.guid.clone(), container.clone());
            Ok(())
        })
    }

    async fn read_delta(&self, source: &str, guid: &str) -> StoreResult<DeltaContainer> {
        self.ensure_initialized(|| format!("read of record [{source}]:[{guid}] delta"))?;
        let stored = self.with_source(source, None, |space| space.deltas.get(guid).cloned());
        Ok(stored.unwrap_or_else(|| DeltaContainer::empty(guid)))
    }

    async fn list_keys(&self, source: &str) -> StoreResult<Vec<String>> {
        self.ensure_initialized(|| format!("read of record keys [{source}]"))?;
        let sources = self.sources.read().expect("lock poisoned");
        let space = sources
            .get(source)
            .ok_or_else(|| StoreError::SourceNotCreated(source.to_string()))?;
        let mut keys: Vec<String> = space.records.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn list_keys_by_time_window(
        &self,
        source: &str,
        window: TimeWindow,
    ) -> StoreResult<Vec<String>> {
        self.ensure_initialized(|| format!("read of record keys by time [{source}]"))?;
        let sources = self.sources.read().expect("lock poisoned");
        let space = sources
            .get(source)
            .ok_or_else(|| StoreError::SourceNotCreated(source.to_string()))?;
        let mut keys: Vec<String> = space
            .stamps
            .iter()
            .filter(|(_, at)| window.contains(**at))
            .map(|(guid, _)| guid.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn stamp_timestamp(&self, source: &str, guid: &str, at_ms: i64) -> StoreResult<()> {
        self.ensure_initialized(|| format!("timestamp stamp of record [{source}]:[{guid}]"))?;
        self.with_source_mut(source, |space| {
            space.stamps.insert(guid.to_string(), at_ms);
            Ok(())
        })
    }

    async fn persist_delete(&self, source: &str, guid: &str) -> StoreResult<bool> {
        self.ensure_initialized(|| format!("delete of record [{source}]:[{guid}]"))?;
        let removed = self.with_source_mut(source, |space| Ok(space.records.remove(guid).is_some()))?;
        if !removed {
            debug!(source, guid, "delete found no record body");
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("initialized", &self.initialized.load(Ordering::Relaxed))
            .field("source_count", &self.source_count())
            .finish()
    }
}
