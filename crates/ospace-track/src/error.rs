/// Errors produced by tracked collections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackError {
    #[error("key already exists: {0}")]
    KeyExists(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),
}

/// Convenience alias for tracking results.
pub type TrackResult<T> = Result<T, TrackError>;
