use ospace_store::StoreError;
use ospace_track::TrackError;
use ospace_types::{Category, TypeError};

/// Errors surfaced by the object space and its artifacts.
#[derive(Debug, thiserror::Error)]
pub enum SpaceError {
    /// Empty identifier, malformed alphabet, unparseable key.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Element access outside an artifact's bounds.
    #[error("index {index} out of range for length {length}")]
    OutOfRange { index: usize, length: usize },

    /// Identifier or dictionary key is already present.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Unknown identifier, identifier of another kind, unknown key.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation not valid in the artifact's current state (e.g. pop on
    /// an empty stack).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// An element could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Durable state does not match the artifact layout.
    #[error("corrupt store entry {category}:{key}: {reason}")]
    Corrupt {
        category: String,
        key: String,
        reason: String,
    },

    /// The store writer or reader failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SpaceError {
    pub(crate) fn corrupt(category: &Category, key: &str, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            category: category.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<TypeError> for SpaceError {
    fn from(e: TypeError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

impl From<TrackError> for SpaceError {
    fn from(e: TrackError) -> Self {
        match e {
            TrackError::KeyExists(key) => Self::AlreadyExists(format!("key {key}")),
            TrackError::KeyNotFound(key) => Self::NotFound(format!("key {key}")),
        }
    }
}

/// Result alias for object space operations.
pub type SpaceResult<T> = Result<T, SpaceError>;
