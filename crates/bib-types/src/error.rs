use thiserror::Error;

/// Validation errors raised before any storage I/O takes place.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("the source hash must be a string with data in it")]
    EmptySource,

    #[error("the record GUID must be a string with data in it")]
    EmptyGuid,

    #[error("the record to write must be an object, got {0}")]
    NotAMap(&'static str),

    #[error("invalid time window: from {from} is after to {to}")]
    InvertedWindow { from: i64, to: i64 },
}
