/// Where a tracked value stands relative to durable state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TrackerState {
    /// Never loaded or saved.
    #[default]
    New,
    /// Matches what is durably committed.
    Clean,
    /// Has changes that are not part of any checkpoint yet.
    Dirty,
    /// Captured by a checkpoint that has not been acknowledged.
    Saving,
    /// Captured by an outstanding checkpoint and changed again since.
    SavingDirty,
}

/// Dirty-tracking state machine for a scalar cell.
///
/// | from          | `load`      | `mark_dirty` | `save` | `on_saved` | `on_save_failed` |
/// |---------------|-------------|--------------|--------|------------|------------------|
/// | `New`         | Clean       | Dirty        | Saving | New        | New              |
/// | `Clean`       | Clean       | Dirty        | Clean  | Clean      | Clean            |
/// | `Dirty`       | Dirty       | Dirty        | Saving | Dirty      | Dirty            |
/// | `Saving`      | Saving      | SavingDirty  | Saving | Clean      | Dirty            |
/// | `SavingDirty` | SavingDirty | SavingDirty  | Saving | Dirty      | Dirty            |
///
/// A checkpoint that fails is never acknowledged, so the tracker stays in
/// `Saving`/`SavingDirty`, both of which report dirty. The next `save`
/// captures the value again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeTracker {
    state: TrackerState,
}

impl ChangeTracker {
    /// A tracker for a value that has never been persisted.
    pub fn new() -> Self {
        Self::default()
    }

    /// A tracker for a value just read back from durable state.
    pub fn loaded() -> Self {
        Self {
            state: TrackerState::Clean,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.state != TrackerState::Clean
    }

    pub fn is_saving(&self) -> bool {
        matches!(self.state, TrackerState::Saving | TrackerState::SavingDirty)
    }

    /// Mark the value as reconciled with durable state.
    pub fn load(&mut self) {
        if self.state == TrackerState::New {
            self.state = TrackerState::Clean;
        }
    }

    /// Record a mutation.
    pub fn mark_dirty(&mut self) {
        self.state = match self.state {
            TrackerState::Saving | TrackerState::SavingDirty => TrackerState::SavingDirty,
            _ => TrackerState::Dirty,
        };
    }

    /// A checkpoint is capturing the current value.
    pub fn save(&mut self) {
        if self.state != TrackerState::Clean {
            self.state = TrackerState::Saving;
        }
    }

    /// The checkpoint that captured the value was acknowledged.
    pub fn on_saved(&mut self) {
        self.state = match self.state {
            TrackerState::Saving => TrackerState::Clean,
            TrackerState::SavingDirty => TrackerState::Dirty,
            other => other,
        };
    }

    /// The checkpoint that captured the value was abandoned.
    pub fn on_save_failed(&mut self) {
        if self.is_saving() {
            self.state = TrackerState::Dirty;
        }
    }
}
