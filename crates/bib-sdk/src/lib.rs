//! High-level SDK for Bibliograph.
//!
//! [`Bibliograph`] is the entry point for applications: it owns a storage
//! backend and runs the write pipeline (merge, fingerprint, dedup, delta
//! history) and the tombstoning delete on top of it.

pub mod bibliograph;
pub mod config;
pub mod error;
pub mod template;

pub use bibliograph::{Bibliograph, BibliographOptions, WriteOutcome};
pub use config::{BibliographConfig, CONFIG_FILE_NAME};
pub use error::{SdkError, SdkResult};
pub use template::render_guid;

// Re-export key types
pub use bib_store::{FsStorage, InMemoryStorage, StorageBackend, StoreError};
pub use bib_types::{DeltaContainer, Metadata, Record, TimeWindow};
