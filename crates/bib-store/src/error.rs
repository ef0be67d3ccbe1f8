/// Errors from storage backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An operation was attempted before `initialize`.
    #[error("storage not initialized; {operation} failed")]
    NotInitialized { operation: String },

    /// The source was never created with `source_create`.
    #[error("source [{0}] has not been created")]
    SourceNotCreated(String),

    /// A source hash or GUID cannot be used as a storage key.
    #[error("invalid storage key [{key}]: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// A persisted document failed to parse (data corruption).
    #[error("corrupt document at {location}: {reason}")]
    Serialization { location: String, reason: String },

    /// A compare-and-swap metadata write found different content than expected.
    #[error("write conflict on [{guid}]: expected MD5 {expected}, found {actual}")]
    Conflict {
        guid: String,
        expected: String,
        actual: String,
    },

    /// The storage root is not writable.
    #[error("storage root is read-only: {0}")]
    ReadOnly(String),

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
