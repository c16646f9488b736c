use std::marker::PhantomData;

use ospace_store::StoreReader;
use ospace_types::{ArtifactId, Category, Edit, OrderedKeyCodec};

use super::meta::{read_metadata, MetaCell};
use super::{
    check_contiguous, emit_positions, load_positions, position_keys, read_lock, write_lock,
    PersistedState, Positions, SaveContext, Shared,
};
use crate::codec::{self, Element};
use crate::error::{SpaceError, SpaceResult};

/// Ordered sequence stored densely at positions `0..count`. Inserting or
/// removing in the middle rewrites every position after it.
pub(crate) struct ListState {
    count: MetaCell,
    items: Positions,
}

impl ListState {
    pub(crate) fn new() -> Self {
        Self {
            count: MetaCell::new("count", 0),
            items: Positions::new(),
        }
    }

    pub(crate) fn load<R: StoreReader + ?Sized>(
        id: &ArtifactId,
        reader: &R,
        keys: &OrderedKeyCodec,
    ) -> SpaceResult<Self> {
        let count = MetaCell::load("count", id, &read_metadata(id, reader)?)?;
        let positions = load_positions(id, reader, keys)?;
        check_contiguous(id, &positions, 0, count.get())?;
        Ok(Self {
            count,
            items: Positions::from_committed(positions),
        })
    }

    fn len(&self) -> usize {
        self.count.get() as usize
    }

    fn check(&self, index: usize, inclusive: bool) -> SpaceResult<i64> {
        let length = self.len();
        if index < length || (inclusive && index == length) {
            Ok(index as i64)
        } else {
            Err(SpaceError::OutOfRange { index, length })
        }
    }

    fn insert(&mut self, index: usize, bytes: Vec<u8>) -> SpaceResult<()> {
        let at = self.check(index, true)?;
        let end = self.count.get();
        for p in (at..end).rev() {
            if let Some(moved) = self.items.get(&p).cloned() {
                self.items.insert(p + 1, moved);
            }
        }
        self.items.insert(at, bytes);
        self.count.set(end + 1);
        Ok(())
    }

    fn remove_at(&mut self, index: usize) -> SpaceResult<Vec<u8>> {
        let at = self.check(index, false)?;
        let end = self.count.get();
        let removed = self
            .items
            .get(&at)
            .cloned()
            .ok_or_else(|| SpaceError::OutOfRange {
                index,
                length: self.len(),
            })?;
        for p in at + 1..end {
            if let Some(moved) = self.items.get(&p).cloned() {
                self.items.insert(p - 1, moved);
            }
        }
        self.items.try_remove(&(end - 1));
        self.count.set(end - 1);
        Ok(removed)
    }

    fn position_of(&self, bytes: &[u8]) -> Option<usize> {
        self.items
            .iter()
            .position(|(_, stored)| stored.as_slice() == bytes)
    }
}

impl PersistedState for ListState {
    fn save(&mut self, ctx: &SaveContext<'_>, out: &mut Vec<Edit>) -> SpaceResult<()> {
        self.count.save(ctx, out)?;
        emit_positions(&mut self.items, ctx, out);
        Ok(())
    }

    fn on_saved(&mut self) {
        self.count.on_saved();
        self.items.on_saved();
    }

    fn is_dirty(&self) -> bool {
        self.count.is_dirty() || self.items.is_dirty()
    }

    fn owned_keys(&self, id: &ArtifactId, keys: &OrderedKeyCodec) -> Vec<(Category, String)> {
        let mut owned = vec![self.count.key(id)];
        owned.extend(position_keys(&self.items, id, keys));
        owned
    }
}

/// Persisted growable list of `T`.
pub struct List<T> {
    id: ArtifactId,
    state: Shared<ListState>,
    _element: PhantomData<fn() -> T>,
}

impl_handle!(List<T>, ListState);

impl<T: Element> List<T> {
    pub fn len(&self) -> usize {
        read_lock(&self.state).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> SpaceResult<T> {
        let state = read_lock(&self.state);
        let at = state.check(index, false)?;
        match state.items.get(&at) {
            Some(bytes) => codec::decode(bytes),
            None => Err(SpaceError::OutOfRange {
                index,
                length: state.len(),
            }),
        }
    }

    pub fn set(&self, index: usize, value: T) -> SpaceResult<()> {
        let bytes = codec::encode(&value)?;
        let mut state = write_lock(&self.state);
        let at = state.check(index, false)?;
        state.items.insert(at, bytes);
        Ok(())
    }

    /// Append at the end.
    pub fn push(&self, value: T) -> SpaceResult<()> {
        let bytes = codec::encode(&value)?;
        let mut state = write_lock(&self.state);
        let end = state.len();
        state.insert(end, bytes)
    }

    /// Insert before `index`; `index == len()` appends.
    pub fn insert(&self, index: usize, value: T) -> SpaceResult<()> {
        let bytes = codec::encode(&value)?;
        write_lock(&self.state).insert(index, bytes)
    }

    pub fn remove_at(&self, index: usize) -> SpaceResult<T> {
        let bytes = write_lock(&self.state).remove_at(index)?;
        codec::decode(&bytes)
    }

    /// Remove the first element equal to `value`. Returns whether one was
    /// found.
    pub fn remove(&self, value: &T) -> SpaceResult<bool> {
        let bytes = codec::encode(value)?;
        let mut state = write_lock(&self.state);
        match state.position_of(&bytes) {
            Some(index) => {
                state.remove_at(index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn index_of(&self, value: &T) -> SpaceResult<Option<usize>> {
        let bytes = codec::encode(value)?;
        Ok(read_lock(&self.state).position_of(&bytes))
    }

    pub fn contains(&self, value: &T) -> SpaceResult<bool> {
        Ok(self.index_of(value)?.is_some())
    }

    pub fn clear(&self) {
        let mut state = write_lock(&self.state);
        while state.len() > 0 {
            let last = state.len() - 1;
            if state.remove_at(last).is_err() {
                break;
            }
        }
    }

    pub fn to_vec(&self) -> SpaceResult<Vec<T>> {
        read_lock(&self.state)
            .items
            .iter()
            .map(|(_, bytes)| codec::decode(bytes))
            .collect()
    }
}
