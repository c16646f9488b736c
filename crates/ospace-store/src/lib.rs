//! Checkpoint stores for the persisted object space.
//!
//! The object space never writes bytes itself: it emits an ordered list of
//! [`Edit`](ospace_types::Edit)s through a [`StoreWriter`] and rebuilds its
//! state from a [`StoreReader`]. This crate defines those boundaries and two
//! backends that implement them.
//!
//! # Storage Backends
//!
//! - [`InMemoryStore`] -- map-backed store for tests and embedding
//! - [`LogFileStore`] -- append-only checkpoint log on disk
//!
//! # Design Rules
//!
//! 1. A checkpoint is applied atomically on commit, or not at all.
//! 2. A full checkpoint replaces everything the store held before it.
//! 3. A differential checkpoint applies its edits in order on top.
//! 4. The store never interprets keys or values.

pub mod error;
pub mod log;
pub mod memory;
pub mod state;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use log::{LogConfig, LogFileStore, LogRetention, SyncMode};
pub use memory::InMemoryStore;
pub use state::{CheckpointRecord, MaterializedState};
pub use traits::{CheckpointBatch, CheckpointStore, StoreReader, StoreWriter};
