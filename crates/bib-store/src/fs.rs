use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bib_types::{DeltaContainer, Metadata, Record, TimeWindow};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::StorageBackend;

const RECORD_DIR: &str = "record";
const METADATA_DIR: &str = "metadata";
const HISTORY_DIR: &str = "history";
const WRITE_CHECK_FILE: &str = ".bibliograph-write-check";

/// Filesystem storage backend, one compact JSON document per file.
///
/// ```text
/// {root}/{source}/record/{guid}.json
/// {root}/{source}/metadata/_{guid}_metadata.json
/// {root}/{source}/history/_{guid}_deltas.json
/// ```
///
/// There is no per-key locking; concurrent writers to the same GUID are
/// last-write-wins and the metadata compare-and-swap hint is ignored.
#[derive(Debug)]
pub struct FsStorage {
    root: PathBuf,
    initialized: AtomicBool,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
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

    fn source_dir(&self, source: &str) -> StoreResult<PathBuf> {
        check_key(source)?;
        Ok(self.root.join(source))
    }

    fn record_path(&self, source: &str, guid: &str) -> StoreResult<PathBuf> {
        check_key(guid)?;
        Ok(self.source_dir(source)?.join(RECORD_DIR).join(format!("{guid}.json")))
    }

    fn metadata_path(&self, source: &str, guid: &str) -> StoreResult<PathBuf> {
        check_key(guid)?;
        Ok(self
            .source_dir(source)?
            .join(METADATA_DIR)
            .join(format!("_{guid}_metadata.json")))
    }

    fn delta_path(&self, source: &str, guid: &str) -> StoreResult<PathBuf> {
        check_key(guid)?;
        Ok(self
            .source_dir(source)?
            .join(HISTORY_DIR)
            .join(format!("_{guid}_deltas.json")))
    }

    /// Write `body` to `path`, mapping a missing parent directory to
    /// `SourceNotCreated`.
    async fn write_file(&self, source: &str, path: &Path, body: &[u8]) -> StoreResult<()> {
        match fs::write(path, body).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::SourceNotCreated(source.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// List the GUIDs of every metadata document in `source`.
    async fn metadata_guids(&self, source: &str) -> StoreResult<Vec<(String, PathBuf)>> {
        let dir = self.source_dir(source)?.join(METADATA_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::SourceNotCreated(source.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(guid) = name
                .strip_prefix('_')
                .and_then(|rest| rest.strip_suffix("_metadata.json"))
            {
                found.push((guid.to_string(), entry.path()));
            }
        }
        Ok(found)
    }

    /// Last-touched time for one metadata file: the payload's
    /// `max(Ingest, Deleted)`, or the file's mtime if the payload is unreadable.
    /// `None` when the file is gone.
    async fn last_touched(&self, path: &Path) -> StoreResult<Option<i64>> {
        match read_json::<Metadata>(path).await {
            Ok(Some(metadata)) => Ok(Some(metadata.last_touched())),
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable metadata; using file mtime");
                let modified = match fs::metadata(path).await {
                    Ok(stat) => stat.modified()?,
                    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                Ok(Some(DateTime::<Utc>::from(modified).timestamp_millis()))
            }
        }
    }
}

/// Reject keys that could escape their directory.
fn check_key(key: &str) -> StoreResult<()> {
    let reason = if key.is_empty() {
        Some("empty")
    } else if key == "." || key == ".." {
        Some("relative path component")
    } else if key.contains('/') || key.contains('\\') {
        Some("contains a path separator")
    } else if key.contains('\0') {
        Some("contains NUL")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Read and decode a JSON document. A missing file is `Ok(None)`.
async fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let body = match fs::read(path).await {
        Ok(body) => body,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| StoreError::Serialization {
            location: path.display().to_string(),
            reason: e.to_string(),
        })
}

fn to_json<T: serde::Serialize>(value: &T, path: &Path) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization {
        location: path.display().to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl StorageBackend for FsStorage {
    async fn initialize(&self) -> StoreResult<()> {
        let read_only = |e: std::io::Error| {
            if e.kind() == ErrorKind::PermissionDenied {
                StoreError::ReadOnly(self.root.display().to_string())
            } else {
                StoreError::Io(e)
            }
        };

        fs::create_dir_all(&self.root).await.map_err(read_only)?;
        let check = self.root.join(WRITE_CHECK_FILE);
        fs::write(&check, b"").await.map_err(read_only)?;
        fs::remove_file(&check).await?;

        self.initialized.store(true, Ordering::Release);
        info!(root = %self.root.display(), "filesystem storage initialized");
        Ok(())
    }

    async fn source_create(&self, source: &str) -> StoreResult<()> {
        self.ensure_initialized(|| format!("creation of source [{source}]"))?;
        let dir = self.source_dir(source)?;
        for sub in [RECORD_DIR, METADATA_DIR, HISTORY_DIR] {
            fs::create_dir_all(dir.join(sub)).await?;
        }
        debug!(source, path = %dir.display(), "source directories ready");
        Ok(())
    }

    async fn source_exists(&self, source: &str) -> StoreResult<bool> {
        self.ensure_initialized(|| format!("check of source [{source}]"))?;
        let dir = self.source_dir(source)?.join(RECORD_DIR);
        Ok(fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false))
    }

    async fn persist_record(&self, source: &str, guid: &str, body: &str) -> StoreResult<()> {
        self.ensure_initialized(|| format!("write of record [{source}]:[{guid}]"))?;
        let path = self.record_path(source, guid)?;
        self.write_file(source, &path, body.as_bytes()).await
    }

    async fn read_record(&self, source: &str, guid: &str) -> StoreResult<Option<Record>> {
        self.ensure_initialized(|| format!("read of record [{source}]:[{guid}]"))?;
        read_json(&self.record_path(source, guid)?).await
    }

    async fn record_exists(&self, source: &str, guid: &str) -> StoreResult<bool> {
        self.ensure_initialized(|| format!("check existence of record [{source}]:[{guid}]"))?;
        let path = self.record_path(source, guid)?;
        Ok(fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false))
    }

    async fn persist_metadata(
        &self,
        source: &str,
        guid: &str,
        metadata: &Metadata,
        _expected_md5: Option<&str>,
    ) -> StoreResult<()> {
        self.ensure_initialized(|| format!("write of record [{source}]:[{guid}] metadata"))?;
        let path = self.metadata_path(source, guid)?;
        let body = to_json(metadata, &path)?;
        self.write_file(source, &path, &body).await
    }

    async fn read_metadata(&self, source: &str, guid: &str) -> StoreResult<Option<Metadata>> {
        self.ensure_initialized(|| format!("read of record [{source}]:[{guid}] metadata"))?;
        read_json(&self.metadata_path(source, guid)?).await
    }

    async fn persist_delta(
        &self,
        source: &str,
        metadata: &Metadata,
        container: &DeltaContainer,
    ) -> StoreResult<()> {
        let guid = metadata.guid.as_str();
        self.ensure_initialized(|| format!("write of record [{source}]:[{guid}] delta"))?;
        let path = self.delta_path(source, guid)?;
        let body = to_json(container, &path)?;
        self.write_file(source, &path, &body).await
    }

    async fn read_delta(&self, source: &str, guid: &str) -> StoreResult<DeltaContainer> {
        self.ensure_initialized(|| format!("read of record [{source}]:[{guid}] delta"))?;
        let path = self.delta_path(source, guid)?;
        let Some(raw) = read_json::<serde_json::Value>(&path).await? else {
            return Ok(DeltaContainer::empty(guid));
        };
        match serde_json::from_value::<DeltaContainer>(raw) {
            Ok(container) => Ok(container),
            Err(e) => {
                warn!(source, guid, error = %e, "invalid delta container; starting a new one");
                Ok(DeltaContainer::empty(guid))
            }
        }
    }

    async fn list_keys(&self, source: &str) -> StoreResult<Vec<String>> {
        self.ensure_initialized(|| format!("read of record keys [{source}]"))?;
        let dir = self.source_dir(source)?.join(RECORD_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::SourceNotCreated(source.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(guid) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_suffix(".json"))
            {
                keys.push(guid.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn list_keys_by_time_window(
        &self,
        source: &str,
        window: TimeWindow,
    ) -> StoreResult<Vec<String>> {
        self.ensure_initialized(|| format!("read of record keys by time [{source}]"))?;
        let mut keys = Vec::new();
        for (guid, path) in self.metadata_guids(source).await? {
            match self.last_touched(&path).await? {
                Some(at) if window.contains(at) => keys.push(guid),
                Some(_) => {}
                None => debug!(source, guid = %guid, "metadata vanished during scan"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn persist_delete(&self, source: &str, guid: &str) -> StoreResult<bool> {
        self.ensure_initialized(|| format!("delete of record [{source}]:[{guid}]"))?;
        let path = self.record_path(source, guid)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(source, guid, "delete found no record body");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
