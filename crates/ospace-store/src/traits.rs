use ospace_types::{Category, CheckpointKind, Edit};

use crate::error::StoreResult;

/// Write boundary: receives a checkpoint's edits in order.
pub trait StoreWriter {
    fn append(&mut self, edit: Edit) -> StoreResult<()>;
}

/// Read boundary: enumerates what a category durably holds.
pub trait StoreReader {
    /// All `(key, value)` pairs of `category`, in key order.
    ///
    /// An unknown category is empty, not an error.
    fn read_category(&self, category: &Category) -> StoreResult<Vec<(String, Vec<u8>)>>;
}

/// A store that accepts whole checkpoints.
pub trait CheckpointStore: StoreReader {
    /// Durably apply `batch`. Returns the sequence number assigned to it.
    ///
    /// On error nothing of the batch is visible to readers.
    fn commit(&mut self, batch: CheckpointBatch) -> StoreResult<u64>;
}

impl StoreWriter for Vec<Edit> {
    fn append(&mut self, edit: Edit) -> StoreResult<()> {
        self.push(edit);
        Ok(())
    }
}

/// Edits collected for one checkpoint, waiting to be committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointBatch {
    kind: CheckpointKind,
    edits: Vec<Edit>,
}

impl CheckpointBatch {
    pub fn new(kind: CheckpointKind) -> Self {
        Self {
            kind,
            edits: Vec::new(),
        }
    }

    pub fn kind(&self) -> CheckpointKind {
        self.kind
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn into_edits(self) -> Vec<Edit> {
        self.edits
    }
}

impl StoreWriter for CheckpointBatch {
    fn append(&mut self, edit: Edit) -> StoreResult<()> {
        self.edits.push(edit);
        Ok(())
    }
}
