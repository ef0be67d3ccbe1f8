//! Foundation types for Bibliograph.
//!
//! This crate provides the data model shared by every other Bibliograph
//! crate: the record body, its derived metadata, and the append-only delta
//! history kept per record.
//!
//! # Key Types
//!
//! - [`Record`] -- JSON object body, key order preserved
//! - [`Metadata`] -- fingerprint and bookkeeping fields for one record
//! - [`Delta`] / [`DeltaContainer`] -- field-level change history
//! - [`TimeWindow`] -- inclusive epoch-ms range for key queries

pub mod delta;
pub mod error;
pub mod metadata;
pub mod record;
pub mod temporal;

pub use delta::{Delta, DeltaContainer};
pub use error::TypeError;
pub use metadata::Metadata;
pub use record::{record_from_value, serialize_record, validate_guid, validate_source, Record};
pub use temporal::{now_ms, TimeWindow};
