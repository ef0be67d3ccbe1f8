//! Program configuration, read from `.bibliograph.config.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bibliograph::BibliographOptions;
use crate::error::{SdkError, SdkResult};

/// File name looked up in the working directory when no path is given.
pub const CONFIG_FILE_NAME: &str = ".bibliograph.config.json";

/// Settings shared by the CLI and embedding applications.
///
/// Unknown keys in the file are ignored and missing keys take defaults, so a
/// config written for another tool that shares the file still loads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BibliographConfig {
    #[serde(rename = "Bibliograph-Storage-FS-Path")]
    pub storage_path: PathBuf,

    #[serde(rename = "Bibliograph-Source")]
    pub default_source: String,

    #[serde(rename = "Bibliograph-Check-Metadata-On-Write")]
    pub check_metadata_on_write: bool,

    #[serde(rename = "Bibliograph-Store-Deltas")]
    pub store_deltas: bool,

    #[serde(rename = "Bibliograph-Tombstone-Unwritten-On-Delete")]
    pub tombstone_unwritten_on_delete: bool,
}

impl Default for BibliographConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("./data/bibliograph"),
            default_source: "Default".into(),
            check_metadata_on_write: true,
            store_deltas: true,
            tombstone_unwritten_on_delete: false,
        }
    }
}

impl BibliographConfig {
    /// Load from `path`. A missing file yields the defaults; a file that is
    /// present but not valid JSON is an error.
    pub fn load(path: &Path) -> SdkResult<Self> {
        let body = match std::fs::read_to_string(path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file; using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(SdkError::Config {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };
        Self::from_json(&body).map_err(|e| match e {
            SdkError::Serialization(reason) => SdkError::Config {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Load `.bibliograph.config.json` from the current directory.
    pub fn load_default() -> SdkResult<Self> {
        Self::load(Path::new(CONFIG_FILE_NAME))
    }

    pub fn from_json(body: &str) -> SdkResult<Self> {
        serde_json::from_str(body).map_err(|e| SdkError::Serialization(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> SdkResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SdkError::Serialization(e.to_string()))
    }

    /// The orchestrator switches carried by this config.
    pub fn options(&self) -> BibliographOptions {
        BibliographOptions {
            check_metadata_before_write: self.check_metadata_on_write,
            store_deltas: self.store_deltas,
            tombstone_unwritten_on_delete: self.tombstone_unwritten_on_delete,
        }
    }
}
