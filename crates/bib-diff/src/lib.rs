//! Diff engine for Bibliograph.
//!
//! Records change gradually: a write usually carries a handful of fields
//! that replace or extend the stored body. The diff here therefore treats
//! the old record as the base and only asks which of the *incoming* fields
//! differ from it. Fields that exist only in the old record are never
//! reported, so partial writes of unchanged fields match.
//!
//! # Key Types
//!
//! - [`RecordDiff`] -- match flag plus the changed keys, in the new record's order
//! - [`diff_records`] / [`delta_from_diff`] / [`generate_delta`] -- diff and delta extraction
//! - [`shallow_merge`] -- overlay a partial record onto the stored one

pub mod merge;
pub mod record_diff;

pub use merge::shallow_merge;
pub use record_diff::{delta_from_diff, diff_records, generate_delta, RecordDiff};
