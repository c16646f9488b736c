use serde::{Deserialize, Serialize};

use crate::category::Category;

/// Whether an edit writes or removes a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditKind {
    AddOrUpdate,
    Delete,
}

/// One entry of a checkpoint's ordered edit log.
///
/// `value` is `Some` exactly when `kind` is [`EditKind::AddOrUpdate`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub kind: EditKind,
    pub category: Category,
    pub key: String,
    pub value: Option<Vec<u8>>,
}

impl Edit {
    /// Add or overwrite `key` in `category`.
    pub fn put(category: Category, key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            kind: EditKind::AddOrUpdate,
            category,
            key: key.into(),
            value: Some(value),
        }
    }

    /// Remove `key` from `category`.
    pub fn delete(category: Category, key: impl Into<String>) -> Self {
        Self {
            kind: EditKind::Delete,
            category,
            key: key.into(),
            value: None,
        }
    }

    pub fn is_delete(&self) -> bool {
        self.kind == EditKind::Delete
    }
}

/// The two flavours of checkpoint.
///
/// A full checkpoint emits every live key and replaces what the store
/// holds; a differential checkpoint emits only the net changes since the
/// last commit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    Full,
    #[default]
    Differential,
}

impl CheckpointKind {
    pub fn is_differential(&self) -> bool {
        matches!(self, Self::Differential)
    }
}
