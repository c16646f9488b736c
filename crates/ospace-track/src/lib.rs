//! Change tracking for the persisted object space.
//!
//! Artifacts never diff their whole contents at checkpoint time. Instead
//! every mutation is recorded as it happens, and a checkpoint only asks the
//! tracker what changed:
//!
//! - [`ChangeTracker`] -- dirty-state machine for scalar cells
//! - [`PagedState`] -- stack of edit pages with snapshot/commit split
//! - [`DiffDict`] -- map that collapses pending edits into net operations
//!   and emits full or differential [`DictSnapshot`]s
//!
//! All three share one protocol: take a snapshot when a checkpoint starts,
//! keep accepting mutations while it is written, and only forget the
//! captured edits once the checkpoint is acknowledged (`on_saved`). A
//! checkpoint that never gets acknowledged is simply captured again by the
//! next snapshot.

pub mod dict;
pub mod error;
pub mod paged;
pub mod tracker;

pub use dict::{Change, DictSnapshot, DiffDict, SnapshotEntry};
pub use error::{TrackError, TrackResult};
pub use paged::{Page, PageSnapshot, PagedState};
pub use tracker::{ChangeTracker, TrackerState};
