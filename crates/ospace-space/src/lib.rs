//! Persisted object space.
//!
//! An [`ObjectSpace`] is an in-process registry of named, typed artifacts
//! (value cell, array, stack, queue, list, set, dictionary). Operators keep
//! working state in them; the space turns their mutations into checkpoint
//! edits for an external store and rebuilds them from that store on reload.
//!
//! # Checkpoint cycle
//!
//! 1. Mutate artifacts through their handles.
//! 2. [`ObjectSpace::save`] emits a full or differential edit set.
//! 3. Once the store confirms the edits are durable, call
//!    [`ObjectSpace::on_saved`]. If it never does, the next save emits the
//!    same edits again, merged with anything changed since.
//!
//! [`ObjectSpace::checkpoint`] runs the whole cycle against a
//! [`CheckpointStore`](ospace_store::CheckpointStore).

pub mod artifact;
pub mod codec;
pub mod config;
pub mod error;
pub mod space;

pub use artifact::{Array, Dictionary, List, Queue, Set, Stack, Value};
pub use codec::Element;
pub use config::SpaceConfig;
pub use error::{SpaceError, SpaceResult};
pub use space::{CheckpointSummary, ObjectSpace};

// Re-export the vocabulary callers need alongside the space.
pub use ospace_types::{ArtifactId, ArtifactKind, Category, CheckpointKind, Edit, EditKind};
