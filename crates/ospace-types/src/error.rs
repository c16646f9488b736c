use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("artifact identifier must not be empty")]
    EmptyIdentifier,

    #[error("unknown artifact kind: {0}")]
    UnknownKind(String),

    #[error("invalid key alphabet: {0}")]
    InvalidAlphabet(String),

    #[error("invalid ordered key {key:?}: {reason}")]
    InvalidOrderedKey { key: String, reason: String },
}
