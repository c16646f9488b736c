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

/// LIFO. Element `i` (0 = bottom) lives at position `i`; `count` is the
/// next free position.
pub(crate) struct StackState {
    count: MetaCell,
    items: Positions,
}

impl StackState {
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

    fn push(&mut self, bytes: Vec<u8>) {
        let top = self.count.get();
        self.items.insert(top, bytes);
        self.count.set(top + 1);
    }

    fn pop(&mut self) -> SpaceResult<Vec<u8>> {
        let top = self.top()?;
        let bytes = self.items.remove(&top)?;
        self.count.set(top);
        Ok(bytes)
    }

    fn top(&self) -> SpaceResult<i64> {
        match self.count.get() {
            0 => Err(SpaceError::InvalidOperation("stack is empty".into())),
            n => Ok(n - 1),
        }
    }
}

impl PersistedState for StackState {
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

/// Persisted LIFO stack of `T`.
pub struct Stack<T> {
    id: ArtifactId,
    state: Shared<StackState>,
    _element: PhantomData<fn() -> T>,
}

impl_handle!(Stack<T>, StackState);

impl<T: Element> Stack<T> {
    pub fn len(&self) -> usize {
        read_lock(&self.state).count.get() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, value: T) -> SpaceResult<()> {
        let bytes = codec::encode(&value)?;
        write_lock(&self.state).push(bytes);
        Ok(())
    }

    /// Remove and return the top element. Fails with
    /// [`SpaceError::InvalidOperation`] on an empty stack.
    pub fn pop(&self) -> SpaceResult<T> {
        let bytes = write_lock(&self.state).pop()?;
        codec::decode(&bytes)
    }

    pub fn peek(&self) -> SpaceResult<T> {
        let state = read_lock(&self.state);
        let top = state.top()?;
        match state.items.get(&top) {
            Some(bytes) => codec::decode(bytes),
            None => Err(SpaceError::InvalidOperation("stack is empty".into())),
        }
    }

    /// Elements from top to bottom.
    pub fn to_vec(&self) -> SpaceResult<Vec<T>> {
        let state = read_lock(&self.state);
        let mut out = state
            .items
            .iter()
            .map(|(_, bytes)| codec::decode(bytes))
            .collect::<SpaceResult<Vec<T>>>()?;
        out.reverse();
        Ok(out)
    }

    pub fn clear(&self) {
        let mut state = write_lock(&self.state);
        while state.pop().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use ospace_store::InMemoryStore;
    use ospace_types::CheckpointKind;

    use super::super::{shared, test_util};
    use super::*;

    fn stack() -> (Stack<i32>, Shared<StackState>) {
        let state = shared(StackState::new());
        (Stack::attach(test_util::id("s"), state.clone()), state)
    }

    #[test]
    fn lifo_order() {
        let (s, _) = stack();
        for v in [2, 3, 5] {
            s.push(v).unwrap();
        }
        assert_eq!(s.len(), 3);
        assert_eq!(s.peek().unwrap(), 5);
        assert_eq!(s.to_vec().unwrap(), vec![5, 3, 2]);
        assert_eq!(s.pop().unwrap(), 5);
        assert_eq!(s.pop().unwrap(), 3);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn empty_stack_errors() {
        let (s, _) = stack();
        assert!(matches!(s.pop(), Err(SpaceError::InvalidOperation(_))));
        assert!(matches!(s.peek(), Err(SpaceError::InvalidOperation(_))));
    }

    #[test]
    fn pop_after_checkpoint_emits_count_and_one_delete() {
        let (s, state) = stack();
        for v in [2, 3, 5] {
            s.push(v).unwrap();
        }
        let mut store = InMemoryStore::new();
        test_util::checkpoint(&mut *write_lock(&state), "s", CheckpointKind::Differential, &mut store);

        s.pop().unwrap();
        let edits = test_util::save(&mut *write_lock(&state), "s", CheckpointKind::Differential);
        assert_eq!(
            test_util::keys_of(&edits),
            vec!["put state/item/s/metadata:count", "del state/item/s/items:2"]
        );
    }

    #[test]
    fn push_then_pop_between_checkpoints_is_silent() {
        let (s, state) = stack();
        s.push(1).unwrap();
        let mut store = InMemoryStore::new();
        test_util::checkpoint(&mut *write_lock(&state), "s", CheckpointKind::Differential, &mut store);

        s.push(2).unwrap();
        s.pop().unwrap();
        let edits = test_util::save(&mut *write_lock(&state), "s", CheckpointKind::Differential);
        assert!(edits.is_empty());
    }

    #[test]
    fn clear_and_reload() {
        let (s, state) = stack();
        for v in [1, 2, 3] {
            s.push(v).unwrap();
        }
        let mut store = InMemoryStore::new();
        test_util::checkpoint(&mut *write_lock(&state), "s", CheckpointKind::Full, &mut store);
        s.clear();
        assert!(s.is_empty());
        test_util::checkpoint(&mut *write_lock(&state), "s", CheckpointKind::Differential, &mut store);

        let keys = OrderedKeyCodec::decimal();
        let loaded = StackState::load(&test_util::id("s"), &store, &keys).unwrap();
        let t: Stack<i32> = Stack::attach(test_util::id("s"), shared(loaded));
        assert!(t.is_empty());
    }
}
