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

/// Fixed-length sequence. Every position `0..length` always holds a payload.
pub(crate) struct ArrayState {
    length: MetaCell,
    items: Positions,
}

impl ArrayState {
    pub(crate) fn new(length: usize, fill: &[u8]) -> Self {
        let mut items = Positions::new();
        for i in 0..length as i64 {
            items.insert(i, fill.to_vec());
        }
        Self {
            length: MetaCell::new("length", length as i64),
            items,
        }
    }

    pub(crate) fn load<R: StoreReader + ?Sized>(
        id: &ArtifactId,
        reader: &R,
        keys: &OrderedKeyCodec,
    ) -> SpaceResult<Self> {
        let length = MetaCell::load("length", id, &read_metadata(id, reader)?)?;
        let positions = load_positions(id, reader, keys)?;
        check_contiguous(id, &positions, 0, length.get())?;
        Ok(Self {
            length,
            items: Positions::from_committed(positions),
        })
    }

    fn len(&self) -> usize {
        self.length.get() as usize
    }

    fn slot(&self, index: usize) -> SpaceResult<i64> {
        if index < self.len() {
            Ok(index as i64)
        } else {
            Err(SpaceError::OutOfRange {
                index,
                length: self.len(),
            })
        }
    }
}

impl PersistedState for ArrayState {
    fn save(&mut self, ctx: &SaveContext<'_>, out: &mut Vec<Edit>) -> SpaceResult<()> {
        self.length.save(ctx, out)?;
        emit_positions(&mut self.items, ctx, out);
        Ok(())
    }

    fn on_saved(&mut self) {
        self.length.on_saved();
        self.items.on_saved();
    }

    fn is_dirty(&self) -> bool {
        self.length.is_dirty() || self.items.is_dirty()
    }

    fn owned_keys(&self, id: &ArtifactId, keys: &OrderedKeyCodec) -> Vec<(Category, String)> {
        let mut owned = vec![self.length.key(id)];
        owned.extend(position_keys(&self.items, id, keys));
        owned
    }
}

/// Fixed-length array of `T`, created with every element set to
/// `T::default()`. The length never changes.
pub struct Array<T> {
    id: ArtifactId,
    state: Shared<ArrayState>,
    _element: PhantomData<fn() -> T>,
}

impl_handle!(Array<T>, ArrayState);

impl<T: Element> Array<T> {
    pub fn len(&self) -> usize {
        read_lock(&self.state).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> SpaceResult<T> {
        let state = read_lock(&self.state);
        let slot = state.slot(index)?;
        match state.items.get(&slot) {
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
        let slot = state.slot(index)?;
        state.items.insert(slot, bytes);
        Ok(())
    }

    /// All elements in index order.
    pub fn to_vec(&self) -> SpaceResult<Vec<T>> {
        read_lock(&self.state)
            .items
            .iter()
            .map(|(_, bytes)| codec::decode(bytes))
            .collect()
    }
}
