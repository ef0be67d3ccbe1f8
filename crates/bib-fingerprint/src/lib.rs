//! Content fingerprints for Bibliograph records.
//!
//! Every write derives a [`Metadata`](bib_types::Metadata) entry from the
//! serialized record: its length, a cheap non-cryptographic quick hash used
//! as a pre-check, and an MD5 digest. Two serializations that are equal
//! always produce equal fingerprints; only the ingest time varies.
//!
//! The MD5 digest comes from the `md-5` crate.

pub mod generator;
pub mod hasher;

pub use generator::MetadataGenerator;
pub use hasher::{char_length, quick_hash, record_hash, QHASH_PREFIX};
