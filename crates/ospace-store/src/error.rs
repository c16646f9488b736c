use std::io;

/// Errors from checkpoint store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend refused or failed to apply a checkpoint.
    #[error("checkpoint {seq} failed: {reason}")]
    CheckpointFailed { seq: u64, reason: String },

    /// An edit violates the edit shape (e.g. a put without a value).
    #[error("malformed edit for {category}/{key}: {reason}")]
    MalformedEdit {
        category: String,
        key: String,
        reason: String,
    },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
