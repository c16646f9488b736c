//! Foundation types for the persisted object space.
//!
//! Every other `ospace` crate depends on `ospace-types`. It defines the
//! vocabulary shared by the tracking engine, the registry and the store
//! collaborators.
//!
//! # Key Types
//!
//! - [`ArtifactId`]: Validated identifier of an artifact in an object space
//! - [`ArtifactKind`]: Value, array, stack, queue, list, set or dictionary
//! - [`Category`]: Store category an edit belongs to (`state/index`, ...)
//! - [`Edit`] / [`EditKind`]: A single add-or-update or delete against the store
//! - [`CheckpointKind`]: Full or differential checkpoint
//! - [`OrderedKeyCodec`]: Order-preserving integer ⇄ string key encoding

pub mod category;
pub mod edit;
pub mod error;
pub mod id;
pub mod ordered_key;

pub use category::Category;
pub use edit::{CheckpointKind, Edit, EditKind};
pub use error::TypeError;
pub use id::{ArtifactId, ArtifactKind};
pub use ordered_key::{OrderedKeyCodec, DECIMAL_ALPHABET, SEPARATOR};
