use ospace_types::{Category, CheckpointKind};

use crate::error::{StoreError, StoreResult};
use crate::state::{CheckpointRecord, MaterializedState};
use crate::traits::{CheckpointBatch, CheckpointStore, StoreReader};

/// In-memory checkpoint store.
///
/// Intended for tests and embedding. Keeps the materialized state plus the
/// history of every committed checkpoint so tests can inspect exactly which
/// edits each checkpoint carried.
#[derive(Default)]
pub struct InMemoryStore {
    state: MaterializedState,
    history: Vec<CheckpointRecord>,
    next_seq: u64,
    fail_next: Option<String>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next [`commit`](CheckpointStore::commit) fail without
    /// applying anything.
    pub fn fail_next_commit(&mut self, reason: impl Into<String>) {
        self.fail_next = Some(reason.into());
    }

    /// Every committed checkpoint, oldest first.
    pub fn history(&self) -> &[CheckpointRecord] {
        &self.history
    }

    pub fn last_checkpoint(&self) -> Option<&CheckpointRecord> {
        self.history.last()
    }

    pub fn state(&self) -> &MaterializedState {
        &self.state
    }

    /// Number of keys currently held across all categories.
    pub fn len(&self) -> usize {
        self.state.key_count()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Drop all state and history.
    pub fn clear(&mut self) {
        self.state.clear();
        self.history.clear();
    }
}

impl StoreReader for InMemoryStore {
    fn read_category(&self, category: &Category) -> StoreResult<Vec<(String, Vec<u8>)>> {
        Ok(self.state.read_category(category))
    }
}

impl CheckpointStore for InMemoryStore {
    fn commit(&mut self, batch: CheckpointBatch) -> StoreResult<u64> {
        let seq = self.next_seq;
        if let Some(reason) = self.fail_next.take() {
            return Err(StoreError::CheckpointFailed { seq, reason });
        }
        MaterializedState::validate(batch.edits())?;

        let kind: CheckpointKind = batch.kind();
        let edits = batch.into_edits();
        self.state.apply(kind, &edits);
        self.history.push(CheckpointRecord { seq, kind, edits });
        self.next_seq += 1;
        Ok(seq)
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("key_count", &self.len())
            .field("checkpoints", &self.history.len())
            .finish()
    }
}
