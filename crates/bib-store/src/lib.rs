//! Storage contract and backends for Bibliograph.
//!
//! A backend persists three things per (source, GUID): the record body, its
//! metadata, and its delta history. Backends expose primitive operations
//! only; merging, dedup and delta accumulation belong to the orchestrator in
//! `bib-sdk`, never to a backend.
//!
//! # Storage Backends
//!
//! All backends implement the [`StorageBackend`] trait:
//!
//! - [`FsStorage`] -- directory-per-source, file-per-record reference backend
//! - [`InMemoryStorage`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Every operation is keyed by (source, GUID) and touches one primitive.
//! 2. A missing record, metadata entry or history is `None`/empty, not an error.
//! 3. Deleting something that is not there is not an error.
//! 4. Corrupt persisted JSON surfaces as [`StoreError::Serialization`].
//! 5. No lock is held across an `.await`.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsStorage;
pub use memory::InMemoryStorage;
pub use traits::StorageBackend;
