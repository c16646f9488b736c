use std::collections::HashMap;
use std::marker::PhantomData;

use ospace_store::StoreReader;
use ospace_types::{ArtifactId, Category, Edit, OrderedKeyCodec};

use super::meta::{read_metadata, MetaCell};
use super::{
    emit_positions, load_positions, position_keys, read_lock, write_lock, PersistedState,
    Positions, SaveContext, Shared,
};
use crate::codec::{self, Element};
use crate::error::{SpaceError, SpaceResult};

/// Unordered unique members, each stored at its own slot. Slots come from
/// the monotonic `next` counter and are never reused, so removing a member
/// deletes exactly one item key.
pub(crate) struct SetState {
    count: MetaCell,
    next: MetaCell,
    items: Positions,
    members: HashMap<Vec<u8>, i64>,
}

impl SetState {
    pub(crate) fn new() -> Self {
        Self {
            count: MetaCell::new("count", 0),
            next: MetaCell::new("next", 0),
            items: Positions::new(),
            members: HashMap::new(),
        }
    }

    pub(crate) fn load<R: StoreReader + ?Sized>(
        id: &ArtifactId,
        reader: &R,
        keys: &OrderedKeyCodec,
    ) -> SpaceResult<Self> {
        let metadata = read_metadata(id, reader)?;
        let count = MetaCell::load("count", id, &metadata)?;
        let next = MetaCell::load("next", id, &metadata)?;
        let positions = load_positions(id, reader, keys)?;

        let category = Category::items(id);
        if positions.len() as i64 != count.get() {
            return Err(SpaceError::corrupt(
                &Category::metadata(id),
                "count",
                format!("count is {} but {} members are stored", count.get(), positions.len()),
            ));
        }
        let mut members = HashMap::with_capacity(positions.len());
        for (&slot, bytes) in &positions {
            if !(0..next.get()).contains(&slot) {
                return Err(SpaceError::corrupt(
                    &category,
                    &keys.encode(slot),
                    "slot beyond the allocation counter",
                ));
            }
            if members.insert(bytes.clone(), slot).is_some() {
                return Err(SpaceError::corrupt(
                    &category,
                    &keys.encode(slot),
                    "duplicate set member",
                ));
            }
        }
        Ok(Self {
            count,
            next,
            items: Positions::from_committed(positions),
            members,
        })
    }

    fn add(&mut self, bytes: Vec<u8>) -> bool {
        if self.members.contains_key(&bytes) {
            return false;
        }
        let slot = self.next.get();
        self.items.insert(slot, bytes.clone());
        self.members.insert(bytes, slot);
        self.next.set(slot + 1);
        self.count.set(self.count.get() + 1);
        true
    }

    fn remove(&mut self, bytes: &[u8]) -> SpaceResult<bool> {
        let Some(slot) = self.members.remove(bytes) else {
            return Ok(false);
        };
        self.items.remove(&slot)?;
        self.count.set(self.count.get() - 1);
        Ok(true)
    }
}

impl PersistedState for SetState {
    fn save(&mut self, ctx: &SaveContext<'_>, out: &mut Vec<Edit>) -> SpaceResult<()> {
        self.count.save(ctx, out)?;
        self.next.save(ctx, out)?;
        emit_positions(&mut self.items, ctx, out);
        Ok(())
    }

    fn on_saved(&mut self) {
        self.count.on_saved();
        self.next.on_saved();
        self.items.on_saved();
    }

    fn is_dirty(&self) -> bool {
        self.count.is_dirty() || self.next.is_dirty() || self.items.is_dirty()
    }

    fn owned_keys(&self, id: &ArtifactId, keys: &OrderedKeyCodec) -> Vec<(Category, String)> {
        let mut owned = vec![self.count.key(id), self.next.key(id)];
        owned.extend(position_keys(&self.items, id, keys));
        owned
    }
}

/// Persisted set of `T`. Membership compares encoded bytes.
pub struct Set<T> {
    id: ArtifactId,
    state: Shared<SetState>,
    _element: PhantomData<fn() -> T>,
}

impl_handle!(Set<T>, SetState);

impl<T: Element> Set<T> {
    pub fn len(&self) -> usize {
        read_lock(&self.state).members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `value`; returns false when it was already a member.
    pub fn add(&self, value: T) -> SpaceResult<bool> {
        let bytes = codec::encode(&value)?;
        Ok(write_lock(&self.state).add(bytes))
    }

    /// Remove `value`; returns false when it was not a member.
    pub fn remove(&self, value: &T) -> SpaceResult<bool> {
        let bytes = codec::encode(value)?;
        write_lock(&self.state).remove(&bytes)
    }

    pub fn contains(&self, value: &T) -> SpaceResult<bool> {
        let bytes = codec::encode(value)?;
        Ok(read_lock(&self.state).members.contains_key(&bytes))
    }

    /// Members in insertion order.
    pub fn to_vec(&self) -> SpaceResult<Vec<T>> {
        read_lock(&self.state)
            .items
            .iter()
            .map(|(_, bytes)| codec::decode(bytes))
            .collect()
    }

    pub fn clear(&self) -> SpaceResult<()> {
        let mut state = write_lock(&self.state);
        let members: Vec<Vec<u8>> = state.members.keys().cloned().collect();
        for bytes in members {
            state.remove(&bytes)?;
        }
        Ok(())
    }
}
