use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("validation failed: {0}")]
    Validation(#[from] bib_types::TypeError),

    #[error("metadata for [{guid}] is stored under GUID [{stored}]")]
    Consistency { guid: String, stored: String },

    #[error("store error: {0}")]
    Store(#[from] bib_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid GUID template {template}: {reason}")]
    Template { template: String, reason: String },

    #[error("config error in {path}: {reason}")]
    Config { path: String, reason: String },
}

pub type SdkResult<T> = Result<T, SdkError>;
