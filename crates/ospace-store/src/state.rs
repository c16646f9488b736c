//! Materialized view of a checkpoint log.

use std::collections::BTreeMap;

use ospace_types::{Category, CheckpointKind, Edit, EditKind};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// One committed checkpoint, as it is recorded in a log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub seq: u64,
    pub kind: CheckpointKind,
    pub edits: Vec<Edit>,
}

/// Category → key → value map obtained by replaying checkpoint records.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MaterializedState {
    categories: BTreeMap<Category, BTreeMap<String, Vec<u8>>>,
}

impl MaterializedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check every edit of a record before anything is applied.
    pub fn validate(edits: &[Edit]) -> StoreResult<()> {
        for edit in edits {
            let consistent = match edit.kind {
                EditKind::AddOrUpdate => edit.value.is_some(),
                EditKind::Delete => edit.value.is_none(),
            };
            if !consistent {
                return Err(StoreError::MalformedEdit {
                    category: edit.category.to_string(),
                    key: edit.key.clone(),
                    reason: format!("{:?} edit with value present = {}", edit.kind, edit.value.is_some()),
                });
            }
        }
        Ok(())
    }

    /// Replay one record. A full record starts from an empty state.
    ///
    /// Callers validate the record first; a put without a value is ignored.
    pub fn apply(&mut self, kind: CheckpointKind, edits: &[Edit]) {
        if kind == CheckpointKind::Full {
            self.categories.clear();
        }
        for edit in edits {
            match (&edit.kind, &edit.value) {
                (EditKind::AddOrUpdate, Some(value)) => {
                    self.categories
                        .entry(edit.category.clone())
                        .or_default()
                        .insert(edit.key.clone(), value.clone());
                }
                (EditKind::AddOrUpdate, None) => {}
                (EditKind::Delete, _) => {
                    if let Some(entries) = self.categories.get_mut(&edit.category) {
                        entries.remove(&edit.key);
                        if entries.is_empty() {
                            self.categories.remove(&edit.category);
                        }
                    }
                }
            }
        }
    }

    pub fn read_category(&self, category: &Category) -> Vec<(String, Vec<u8>)> {
        self.categories
            .get(category)
            .map(|entries| entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, category: &Category, key: &str) -> Option<&[u8]> {
        self.categories
            .get(category)
            .and_then(|entries| entries.get(key))
            .map(Vec::as_slice)
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.keys()
    }

    /// Total number of keys across all categories.
    pub fn key_count(&self) -> usize {
        self.categories.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn clear(&mut self) {
        self.categories.clear();
    }
}
