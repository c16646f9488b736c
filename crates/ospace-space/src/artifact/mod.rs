//! Artifact kinds and the shared persistence plumbing.
//!
//! Each artifact is split in two: a `*State` holding encoded elements and
//! change trackers, owned by the registry behind `Arc<RwLock<_>>`, and a
//! typed handle (`Stack<T>`, `Dictionary<K, V>`, ...) that callers hold.
//! Handles are cheap to clone; two handles obtained for the same id refer
//! to the same state (see `ptr_eq`). A handle to a deleted artifact keeps
//! working on its detached state, which is never persisted again.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ospace_store::StoreReader;
use ospace_track::{Change, DiffDict};
use ospace_types::{ArtifactId, ArtifactKind, Category, CheckpointKind, Edit, OrderedKeyCodec};

use crate::error::{SpaceError, SpaceResult};

pub(crate) type Shared<T> = Arc<RwLock<T>>;

pub(crate) fn shared<T>(state: T) -> Shared<T> {
    Arc::new(RwLock::new(state))
}

pub(crate) fn read_lock<T>(state: &Shared<T>) -> RwLockReadGuard<'_, T> {
    state.read().expect("lock poisoned")
}

pub(crate) fn write_lock<T>(state: &Shared<T>) -> RwLockWriteGuard<'_, T> {
    state.write().expect("lock poisoned")
}

/// Accessors every typed handle shares.
macro_rules! impl_handle {
    ($handle:ident < $($param:ident),+ >, $state:ty) => {
        impl<$($param),+> $handle<$($param),+> {
            pub(crate) fn attach(
                id: ospace_types::ArtifactId,
                state: $crate::artifact::Shared<$state>,
            ) -> Self {
                Self {
                    id,
                    state,
                    _element: std::marker::PhantomData,
                }
            }

            /// Identifier this handle was created or looked up with.
            pub fn id(&self) -> &ospace_types::ArtifactId {
                &self.id
            }

            /// True when both handles refer to the same artifact instance.
            pub fn ptr_eq(&self, other: &Self) -> bool {
                std::sync::Arc::ptr_eq(&self.state, &other.state)
            }

            /// True when the artifact holds changes not yet confirmed durable.
            pub fn is_dirty(&self) -> bool {
                $crate::artifact::PersistedState::is_dirty(
                    &*$crate::artifact::read_lock(&self.state),
                )
            }
        }

        impl<$($param),+> Clone for $handle<$($param),+> {
            fn clone(&self) -> Self {
                Self {
                    id: self.id.clone(),
                    state: std::sync::Arc::clone(&self.state),
                    _element: std::marker::PhantomData,
                }
            }
        }

        impl<$($param),+> std::fmt::Debug for $handle<$($param),+> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($handle))
                    .field("id", &self.id)
                    .finish_non_exhaustive()
            }
        }
    };
}

mod array;
mod dictionary;
mod list;
mod meta;
mod queue;
mod set;
mod stack;
mod value;

pub use array::Array;
pub use dictionary::Dictionary;
pub use list::List;
pub use queue::Queue;
pub use set::Set;
pub use stack::Stack;
pub use value::Value;

pub(crate) use array::ArrayState;
pub(crate) use dictionary::DictionaryState;
pub(crate) use list::ListState;
pub(crate) use queue::QueueState;
pub(crate) use set::SetState;
pub(crate) use stack::StackState;
pub(crate) use value::ValueState;

/// Where and how an artifact writes during one save.
pub(crate) struct SaveContext<'a> {
    pub id: &'a ArtifactId,
    pub kind: CheckpointKind,
    pub keys: &'a OrderedKeyCodec,
}

/// The checkpoint protocol each artifact state implements.
pub(crate) trait PersistedState {
    /// Append this artifact's edits: metadata first, then data or items.
    fn save(&mut self, ctx: &SaveContext<'_>, out: &mut Vec<Edit>) -> SpaceResult<()>;

    /// The edits captured by the last `save` are durable.
    fn on_saved(&mut self);

    fn is_dirty(&self) -> bool;

    /// Every `(category, key)` this artifact may have written to the store.
    fn owned_keys(&self, id: &ArtifactId, keys: &OrderedKeyCodec) -> Vec<(Category, String)>;
}

/// A registry entry: one artifact state of any kind.
pub(crate) enum ArtifactSlot {
    Value(Shared<ValueState>),
    Array(Shared<ArrayState>),
    Stack(Shared<StackState>),
    Queue(Shared<QueueState>),
    List(Shared<ListState>),
    Set(Shared<SetState>),
    Dictionary(Shared<DictionaryState>),
}

impl ArtifactSlot {
    pub(crate) fn kind(&self) -> ArtifactKind {
        match self {
            Self::Value(_) => ArtifactKind::Value,
            Self::Array(_) => ArtifactKind::Array,
            Self::Stack(_) => ArtifactKind::Stack,
            Self::Queue(_) => ArtifactKind::Queue,
            Self::List(_) => ArtifactKind::List,
            Self::Set(_) => ArtifactKind::Set,
            Self::Dictionary(_) => ArtifactKind::Dictionary,
        }
    }

    /// Run `f` against the locked state, whatever its kind.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut dyn PersistedState) -> R) -> R {
        match self {
            Self::Value(s) => f(&mut *write_lock(s)),
            Self::Array(s) => f(&mut *write_lock(s)),
            Self::Stack(s) => f(&mut *write_lock(s)),
            Self::Queue(s) => f(&mut *write_lock(s)),
            Self::List(s) => f(&mut *write_lock(s)),
            Self::Set(s) => f(&mut *write_lock(s)),
            Self::Dictionary(s) => f(&mut *write_lock(s)),
        }
    }

    /// Rebuild an artifact of `kind` from what `reader` holds for `id`.
    pub(crate) fn load<R: StoreReader + ?Sized>(
        kind: ArtifactKind,
        id: &ArtifactId,
        reader: &R,
        keys: &OrderedKeyCodec,
    ) -> SpaceResult<Self> {
        Ok(match kind {
            ArtifactKind::Value => Self::Value(shared(ValueState::load(id, reader)?)),
            ArtifactKind::Array => Self::Array(shared(ArrayState::load(id, reader, keys)?)),
            ArtifactKind::Stack => Self::Stack(shared(StackState::load(id, reader, keys)?)),
            ArtifactKind::Queue => Self::Queue(shared(QueueState::load(id, reader, keys)?)),
            ArtifactKind::List => Self::List(shared(ListState::load(id, reader, keys)?)),
            ArtifactKind::Set => Self::Set(shared(SetState::load(id, reader, keys)?)),
            ArtifactKind::Dictionary => {
                Self::Dictionary(shared(DictionaryState::load(id, reader)?))
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Position-keyed items
// ---------------------------------------------------------------------------

/// Element payloads keyed by integer position.
pub(crate) type Positions = DiffDict<i64, Vec<u8>>;

pub(crate) fn edit_for(category: &Category, key: String, change: &Change<Vec<u8>>) -> Edit {
    match change.value() {
        Some(bytes) => Edit::put(category.clone(), key, bytes.clone()),
        None => Edit::delete(category.clone(), key),
    }
}

/// Emit the item edits of a position-keyed artifact, ascending by position.
pub(crate) fn emit_positions(items: &mut Positions, ctx: &SaveContext<'_>, out: &mut Vec<Edit>) {
    let category = Category::items(ctx.id);
    let snapshot = items.create_snapshot(ctx.kind.is_differential());
    for entry in snapshot.iter() {
        out.push(edit_for(&category, ctx.keys.encode(entry.key), &entry.change));
    }
}

/// Read a position-keyed items category back into a position map.
pub(crate) fn load_positions<R: StoreReader + ?Sized>(
    id: &ArtifactId,
    reader: &R,
    keys: &OrderedKeyCodec,
) -> SpaceResult<BTreeMap<i64, Vec<u8>>> {
    let category = Category::items(id);
    reader
        .read_category(&category)?
        .into_iter()
        .map(|(key, bytes)| {
            let position = keys
                .decode(&key)
                .map_err(|e| SpaceError::corrupt(&category, &key, e.to_string()))?;
            Ok((position, bytes))
        })
        .collect()
}

pub(crate) fn position_keys(
    items: &Positions,
    id: &ArtifactId,
    keys: &OrderedKeyCodec,
) -> Vec<(Category, String)> {
    let category = Category::items(id);
    items
        .durable_keys()
        .into_iter()
        .map(|position| (category.clone(), keys.encode(position)))
        .collect()
}

/// Positions must be exactly `start..start + count`.
pub(crate) fn check_contiguous(
    id: &ArtifactId,
    positions: &BTreeMap<i64, Vec<u8>>,
    start: i64,
    count: i64,
) -> SpaceResult<()> {
    let expected = start..start.saturating_add(count);
    if positions.len() as i64 == count && positions.keys().copied().eq(expected) {
        return Ok(());
    }
    let category = Category::items(id);
    let key = positions
        .keys()
        .find(|p| !(start..start.saturating_add(count)).contains(*p))
        .map(|p| p.to_string())
        .unwrap_or_default();
    Err(SpaceError::corrupt(
        &category,
        &key,
        format!("expected {count} elements starting at position {start}, found {}", positions.len()),
    ))
}

#[cfg(test)]
pub(crate) mod test_util {
    use ospace_store::InMemoryStore;
    use ospace_store::{CheckpointBatch, CheckpointStore};
    use ospace_types::{ArtifactId, CheckpointKind, Edit, OrderedKeyCodec};

    use super::{PersistedState, SaveContext};

    pub fn id(s: &str) -> ArtifactId {
        ArtifactId::new(s).unwrap()
    }

    /// Save `state` and return the edits, without acknowledging.
    pub fn save(state: &mut dyn PersistedState, name: &str, kind: CheckpointKind) -> Vec<Edit> {
        let id = id(name);
        let keys = OrderedKeyCodec::decimal();
        let ctx = SaveContext { id: &id, kind, keys: &keys };
        let mut out = Vec::new();
        state.save(&ctx, &mut out).unwrap();
        out
    }

    /// Save, commit to `store`, acknowledge.
    pub fn checkpoint(
        state: &mut dyn PersistedState,
        name: &str,
        kind: CheckpointKind,
        store: &mut InMemoryStore,
    ) -> Vec<Edit> {
        let edits = save(state, name, kind);
        let mut batch = CheckpointBatch::new(kind);
        for edit in &edits {
            ospace_store::StoreWriter::append(&mut batch, edit.clone()).unwrap();
        }
        store.commit(batch).unwrap();
        state.on_saved();
        edits
    }

    /// `"put category:key"` / `"del category:key"` per edit.
    pub fn keys_of(edits: &[Edit]) -> Vec<String> {
        edits
            .iter()
            .map(|e| {
                let op = if e.is_delete() { "del" } else { "put" };
                format!("{op} {}:{}", e.category, e.key)
            })
            .collect()
    }
}
