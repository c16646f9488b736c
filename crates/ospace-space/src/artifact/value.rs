use std::marker::PhantomData;

use ospace_store::StoreReader;
use ospace_track::ChangeTracker;
use ospace_types::{ArtifactId, Category, Edit, OrderedKeyCodec};

use super::{read_lock, write_lock, PersistedState, SaveContext, Shared};
use crate::codec::{self, Element};
use crate::error::{SpaceError, SpaceResult};

const DATA_KEY: &str = "value";

/// Single encoded payload stored under `data/value`.
pub(crate) struct ValueState {
    payload: Vec<u8>,
    tracker: ChangeTracker,
}

impl ValueState {
    pub(crate) fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            tracker: ChangeTracker::new(),
        }
    }

    pub(crate) fn load<R: StoreReader + ?Sized>(id: &ArtifactId, reader: &R) -> SpaceResult<Self> {
        let category = Category::data(id);
        let payload = reader
            .read_category(&category)?
            .into_iter()
            .find_map(|(key, bytes)| (key == DATA_KEY).then_some(bytes))
            .ok_or_else(|| SpaceError::corrupt(&category, DATA_KEY, "missing value payload"))?;
        Ok(Self {
            payload,
            tracker: ChangeTracker::loaded(),
        })
    }
}

impl PersistedState for ValueState {
    fn save(&mut self, ctx: &SaveContext<'_>, out: &mut Vec<Edit>) -> SpaceResult<()> {
        if !ctx.kind.is_differential() || self.tracker.is_dirty() {
            out.push(Edit::put(Category::data(ctx.id), DATA_KEY, self.payload.clone()));
        }
        self.tracker.save();
        Ok(())
    }

    fn on_saved(&mut self) {
        self.tracker.on_saved();
    }

    fn is_dirty(&self) -> bool {
        self.tracker.is_dirty()
    }

    fn owned_keys(&self, id: &ArtifactId, _keys: &OrderedKeyCodec) -> Vec<(Category, String)> {
        vec![(Category::data(id), DATA_KEY.to_string())]
    }
}

/// A single persisted cell holding one `T`.
pub struct Value<T> {
    id: ArtifactId,
    state: Shared<ValueState>,
    _element: PhantomData<fn() -> T>,
}

impl_handle!(Value<T>, ValueState);

impl<T: Element> Value<T> {
    pub fn get(&self) -> SpaceResult<T> {
        codec::decode(&read_lock(&self.state).payload)
    }

    pub fn set(&self, value: T) -> SpaceResult<()> {
        let payload = codec::encode(&value)?;
        let mut state = write_lock(&self.state);
        state.payload = payload;
        state.tracker.mark_dirty();
        Ok(())
    }

    /// Read-modify-write under one lock.
    pub fn update(&self, f: impl FnOnce(T) -> T) -> SpaceResult<()> {
        let mut state = write_lock(&self.state);
        let next = f(codec::decode(&state.payload)?);
        state.payload = codec::encode(&next)?;
        state.tracker.mark_dirty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ospace_store::InMemoryStore;
    use ospace_types::CheckpointKind;

    use super::super::{shared, test_util};
    use super::*;

    fn value(initial: u64) -> (Value<u64>, Shared<ValueState>) {
        let state = shared(ValueState::new(codec::encode(&initial).unwrap()));
        (Value::attach(test_util::id("v"), state.clone()), state)
    }

    #[test]
    fn get_set_update() {
        let (v, _) = value(1);
        assert_eq!(v.get().unwrap(), 1);
        v.set(5).unwrap();
        v.update(|n| n * 2).unwrap();
        assert_eq!(v.get().unwrap(), 10);
    }

    #[test]
    fn differential_writes_only_after_change() {
        let (v, state) = value(1);
        let mut store = InMemoryStore::new();
        let edits = test_util::checkpoint(
            &mut *write_lock(&state),
            "v",
            CheckpointKind::Differential,
            &mut store,
        );
        assert_eq!(
            test_util::keys_of(&edits),
            vec!["put state/item/v/data:value"]
        );
        assert!(!v.is_dirty());

        let edits = test_util::save(&mut *write_lock(&state), "v", CheckpointKind::Differential);
        assert!(edits.is_empty());

        v.set(2).unwrap();
        let edits = test_util::save(&mut *write_lock(&state), "v", CheckpointKind::Differential);
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].value.as_deref(), Some(&codec::encode(&2u64).unwrap()[..]));
    }

    #[test]
    fn reload_from_store() {
        let (v, state) = value(42);
        let mut store = InMemoryStore::new();
        test_util::checkpoint(&mut *write_lock(&state), "v", CheckpointKind::Full, &mut store);
        drop(v);

        let loaded = ValueState::load(&test_util::id("v"), &store).unwrap();
        assert!(!loaded.is_dirty());
        let v: Value<u64> = Value::attach(test_util::id("v"), shared(loaded));
        assert_eq!(v.get().unwrap(), 42);
    }

    #[test]
    fn missing_payload_is_corrupt() {
        let store = InMemoryStore::new();
        assert!(matches!(
            ValueState::load(&test_util::id("v"), &store),
            Err(SpaceError::Corrupt { .. })
        ));
    }
}
