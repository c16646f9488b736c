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

/// FIFO over monotonically increasing positions `head..head + count`.
/// Dequeue advances `head`; positions are never renumbered.
pub(crate) struct QueueState {
    head: MetaCell,
    count: MetaCell,
    items: Positions,
}

impl QueueState {
    pub(crate) fn new() -> Self {
        Self {
            head: MetaCell::new("head", 0),
            count: MetaCell::new("count", 0),
            items: Positions::new(),
        }
    }

    pub(crate) fn load<R: StoreReader + ?Sized>(
        id: &ArtifactId,
        reader: &R,
        keys: &OrderedKeyCodec,
    ) -> SpaceResult<Self> {
        let metadata = read_metadata(id, reader)?;
        let head = MetaCell::load("head", id, &metadata)?;
        let count = MetaCell::load("count", id, &metadata)?;
        let positions = load_positions(id, reader, keys)?;
        check_contiguous(id, &positions, head.get(), count.get())?;
        Ok(Self {
            head,
            count,
            items: Positions::from_committed(positions),
        })
    }

    fn enqueue(&mut self, bytes: Vec<u8>) {
        let tail = self.head.get() + self.count.get();
        self.items.insert(tail, bytes);
        self.count.set(self.count.get() + 1);
    }

    fn dequeue(&mut self) -> SpaceResult<Vec<u8>> {
        let head = self.front()?;
        let bytes = self.items.remove(&head)?;
        self.head.set(head + 1);
        self.count.set(self.count.get() - 1);
        Ok(bytes)
    }

    fn front(&self) -> SpaceResult<i64> {
        if self.count.get() == 0 {
            return Err(SpaceError::InvalidOperation("queue is empty".into()));
        }
        Ok(self.head.get())
    }
}

impl PersistedState for QueueState {
    fn save(&mut self, ctx: &SaveContext<'_>, out: &mut Vec<Edit>) -> SpaceResult<()> {
        self.head.save(ctx, out)?;
        self.count.save(ctx, out)?;
        emit_positions(&mut self.items, ctx, out);
        Ok(())
    }

    fn on_saved(&mut self) {
        self.head.on_saved();
        self.count.on_saved();
        self.items.on_saved();
    }

    fn is_dirty(&self) -> bool {
        self.head.is_dirty() || self.count.is_dirty() || self.items.is_dirty()
    }

    fn owned_keys(&self, id: &ArtifactId, keys: &OrderedKeyCodec) -> Vec<(Category, String)> {
        let mut owned = vec![self.head.key(id), self.count.key(id)];
        owned.extend(position_keys(&self.items, id, keys));
        owned
    }
}

/// Persisted FIFO queue of `T`.
pub struct Queue<T> {
    id: ArtifactId,
    state: Shared<QueueState>,
    _element: PhantomData<fn() -> T>,
}

impl_handle!(Queue<T>, QueueState);

impl<T: Element> Queue<T> {
    pub fn len(&self) -> usize {
        read_lock(&self.state).count.get() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn enqueue(&self, value: T) -> SpaceResult<()> {
        let bytes = codec::encode(&value)?;
        write_lock(&self.state).enqueue(bytes);
        Ok(())
    }

    /// Remove and return the oldest element. Fails with
    /// [`SpaceError::InvalidOperation`] on an empty queue.
    pub fn dequeue(&self) -> SpaceResult<T> {
        let bytes = write_lock(&self.state).dequeue()?;
        codec::decode(&bytes)
    }

    pub fn peek(&self) -> SpaceResult<T> {
        let state = read_lock(&self.state);
        let head = state.front()?;
        match state.items.get(&head) {
            Some(bytes) => codec::decode(bytes),
            None => Err(SpaceError::InvalidOperation("queue is empty".into())),
        }
    }

    /// Elements from oldest to newest.
    pub fn to_vec(&self) -> SpaceResult<Vec<T>> {
        read_lock(&self.state)
            .items
            .iter()
            .map(|(_, bytes)| codec::decode(bytes))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use ospace_store::InMemoryStore;
    use ospace_types::CheckpointKind;

    use super::super::{shared, test_util};
    use super::*;

    fn queue() -> (Queue<String>, Shared<QueueState>) {
        let state = shared(QueueState::new());
        (Queue::attach(test_util::id("q"), state.clone()), state)
    }

    #[test]
    fn fifo_order() {
        let (q, _) = queue();
        for s in ["a", "b", "c"] {
            q.enqueue(s.to_string()).unwrap();
        }
        assert_eq!(q.peek().unwrap(), "a");
        assert_eq!(q.dequeue().unwrap(), "a");
        assert_eq!(q.to_vec().unwrap(), vec!["b", "c"]);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn empty_queue_errors() {
        let (q, _) = queue();
        assert!(matches!(q.dequeue(), Err(SpaceError::InvalidOperation(_))));
        assert!(matches!(q.peek(), Err(SpaceError::InvalidOperation(_))));
    }

    #[test]
    fn dequeue_emits_head_count_and_delete() {
        let (q, state) = queue();
        q.enqueue("a".into()).unwrap();
        q.enqueue("b".into()).unwrap();
        let mut store = InMemoryStore::new();
        test_util::checkpoint(&mut *write_lock(&state), "q", CheckpointKind::Differential, &mut store);

        q.dequeue().unwrap();
        q.enqueue("c".into()).unwrap();
        let edits = test_util::save(&mut *write_lock(&state), "q", CheckpointKind::Differential);
        assert_eq!(
            test_util::keys_of(&edits),
            vec![
                "put state/item/q/metadata:head",
                "del state/item/q/items:0",
                "put state/item/q/items:2",
            ]
        );
    }

    #[test]
    fn reload_keeps_positions() {
        let (q, state) = queue();
        for s in ["a", "b", "c"] {
            q.enqueue(s.to_string()).unwrap();
        }
        q.dequeue().unwrap();
        let mut store = InMemoryStore::new();
        test_util::checkpoint(&mut *write_lock(&state), "q", CheckpointKind::Full, &mut store);

        let keys = OrderedKeyCodec::decimal();
        let loaded = QueueState::load(&test_util::id("q"), &store, &keys).unwrap();
        let r: Queue<String> = Queue::attach(test_util::id("q"), shared(loaded));
        assert_eq!(r.to_vec().unwrap(), vec!["b", "c"]);
        r.enqueue("d".into()).unwrap();
        assert_eq!(r.dequeue().unwrap(), "b");
    }
}
