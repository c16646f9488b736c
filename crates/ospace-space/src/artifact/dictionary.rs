use std::marker::PhantomData;

use ospace_store::StoreReader;
use ospace_track::DiffDict;
use ospace_types::{ArtifactId, Category, Edit, OrderedKeyCodec};

use super::meta::{read_metadata, MetaCell};
use super::{edit_for, read_lock, write_lock, PersistedState, SaveContext, Shared};
use crate::codec::{self, Element};
use crate::error::{SpaceError, SpaceResult};

/// Entries keyed by the JSON text of the user key. The store key of an
/// entry is that text, so no positions are involved.
pub(crate) struct DictionaryState {
    count: MetaCell,
    entries: DiffDict<String, Vec<u8>>,
}

impl DictionaryState {
    pub(crate) fn new() -> Self {
        Self {
            count: MetaCell::new("count", 0),
            entries: DiffDict::new(),
        }
    }

    pub(crate) fn load<R: StoreReader + ?Sized>(id: &ArtifactId, reader: &R) -> SpaceResult<Self> {
        let count = MetaCell::load("count", id, &read_metadata(id, reader)?)?;
        let entries = reader.read_category(&Category::items(id))?;
        if entries.len() as i64 != count.get() {
            return Err(SpaceError::corrupt(
                &Category::metadata(id),
                "count",
                format!("count is {} but {} entries are stored", count.get(), entries.len()),
            ));
        }
        Ok(Self {
            count,
            entries: DiffDict::from_committed(entries),
        })
    }

    fn sync_count(&mut self) {
        self.count.set(self.entries.len() as i64);
    }
}

impl PersistedState for DictionaryState {
    fn save(&mut self, ctx: &SaveContext<'_>, out: &mut Vec<Edit>) -> SpaceResult<()> {
        self.count.save(ctx, out)?;
        let category = Category::items(ctx.id);
        let snapshot = self.entries.create_snapshot(ctx.kind.is_differential());
        for entry in snapshot.iter() {
            out.push(edit_for(&category, entry.key.clone(), &entry.change));
        }
        Ok(())
    }

    fn on_saved(&mut self) {
        self.count.on_saved();
        self.entries.on_saved();
    }

    fn is_dirty(&self) -> bool {
        self.count.is_dirty() || self.entries.is_dirty()
    }

    fn owned_keys(&self, id: &ArtifactId, _keys: &OrderedKeyCodec) -> Vec<(Category, String)> {
        let category = Category::items(id);
        let mut owned = vec![self.count.key(id)];
        owned.extend(
            self.entries
                .durable_keys()
                .into_iter()
                .map(|key| (category.clone(), key)),
        );
        owned
    }
}

/// Persisted map from `K` to `V`.
///
/// Iteration follows the order of the keys' JSON text, which matches `K`'s
/// own order for strings but not, say, for negative integers.
pub struct Dictionary<K, V> {
    id: ArtifactId,
    state: Shared<DictionaryState>,
    _element: PhantomData<fn() -> (K, V)>,
}

impl_handle!(Dictionary<K, V>, DictionaryState);

impl<K: Element, V: Element> Dictionary<K, V> {
    pub fn len(&self) -> usize {
        read_lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &K) -> SpaceResult<Option<V>> {
        let key = codec::encode_key(key)?;
        read_lock(&self.state)
            .entries
            .get(&key)
            .map(|bytes| codec::decode(bytes))
            .transpose()
    }

    /// Value for a key that must be present. Fails with
    /// [`SpaceError::NotFound`] when it is not.
    pub fn get_required(&self, key: &K) -> SpaceResult<V> {
        let key = codec::encode_key(key)?;
        let state = read_lock(&self.state);
        codec::decode(state.entries.get_existing(&key)?)
    }

    pub fn contains_key(&self, key: &K) -> SpaceResult<bool> {
        let key = codec::encode_key(key)?;
        Ok(read_lock(&self.state).entries.contains_key(&key))
    }

    /// Insert a new entry. Fails with [`SpaceError::AlreadyExists`] when the
    /// key is present.
    pub fn add(&self, key: K, value: V) -> SpaceResult<()> {
        let key = codec::encode_key(&key)?;
        let bytes = codec::encode(&value)?;
        let mut state = write_lock(&self.state);
        state.entries.add(key, bytes)?;
        state.sync_count();
        Ok(())
    }

    /// Insert or overwrite; returns the previous value.
    pub fn insert(&self, key: K, value: V) -> SpaceResult<Option<V>> {
        let key = codec::encode_key(&key)?;
        let bytes = codec::encode(&value)?;
        let mut state = write_lock(&self.state);
        let previous = state.entries.insert(key, bytes);
        state.sync_count();
        previous.map(|bytes| codec::decode(&bytes)).transpose()
    }

    /// Remove and return the value for `key`. Fails with
    /// [`SpaceError::NotFound`] when the key is absent.
    pub fn remove(&self, key: &K) -> SpaceResult<V> {
        let key = codec::encode_key(key)?;
        let mut state = write_lock(&self.state);
        let bytes = state.entries.remove(&key)?;
        state.sync_count();
        codec::decode(&bytes)
    }

    pub fn keys(&self) -> SpaceResult<Vec<K>> {
        read_lock(&self.state)
            .entries
            .keys()
            .map(|key| codec::decode_key(key))
            .collect()
    }

    pub fn entries(&self) -> SpaceResult<Vec<(K, V)>> {
        read_lock(&self.state)
            .entries
            .iter()
            .map(|(key, bytes)| Ok((codec::decode_key(key)?, codec::decode(bytes)?)))
            .collect()
    }

    pub fn clear(&self) {
        let mut state = write_lock(&self.state);
        let keys: Vec<String> = state.entries.keys().cloned().collect();
        for key in keys {
            state.entries.try_remove(&key);
        }
        state.sync_count();
    }
}

#[cfg(test)]
mod tests {
    use ospace_store::InMemoryStore;
    use ospace_types::CheckpointKind;

    use super::super::{shared, test_util};
    use super::*;

    fn dict() -> (Dictionary<String, u32>, Shared<DictionaryState>) {
        let state = shared(DictionaryState::new());
        (Dictionary::attach(test_util::id("d"), state.clone()), state)
    }

    #[test]
    fn add_insert_remove() {
        let (d, _) = dict();
        d.add("a".into(), 1).unwrap();
        assert!(matches!(
            d.add("a".into(), 2),
            Err(SpaceError::AlreadyExists(_))
        ));
        assert_eq!(d.insert("a".into(), 3).unwrap(), Some(1));
        assert_eq!(d.insert("b".into(), 4).unwrap(), None);
        assert_eq!(d.get(&"a".into()).unwrap(), Some(3));
        assert_eq!(d.remove(&"b".into()).unwrap(), 4);
        assert!(matches!(d.remove(&"b".into()), Err(SpaceError::NotFound(_))));
        assert_eq!(d.entries().unwrap(), vec![("a".to_string(), 3)]);
    }

    #[test]
    fn required_lookup_of_missing_key_is_not_found() {
        let (d, _) = dict();
        assert_eq!(d.get(&"nope".into()).unwrap(), None);
        assert!(matches!(
            d.get_required(&"nope".into()),
            Err(SpaceError::NotFound(_))
        ));
        d.add("k".into(), 7).unwrap();
        assert_eq!(d.get_required(&"k".into()).unwrap(), 7);
    }

    #[test]
    fn store_keys_are_json_text() {
        let (d, state) = dict();
        d.add("alice".into(), 1).unwrap();
        let edits = test_util::save(&mut *write_lock(&state), "d", CheckpointKind::Full);
        assert_eq!(
            test_util::keys_of(&edits),
            vec!["put state/item/d/metadata:count", "put state/item/d/items:\"alice\""]
        );
    }

    #[test]
    fn overwrite_then_remove_within_one_interval() {
        let (d, state) = dict();
        d.add("k".into(), 1).unwrap();
        let mut store = InMemoryStore::new();
        test_util::checkpoint(&mut *write_lock(&state), "d", CheckpointKind::Differential, &mut store);

        d.insert("k".into(), 2).unwrap();
        d.remove(&"k".into()).unwrap();
        d.add("n".into(), 5).unwrap();
        let edits = test_util::save(&mut *write_lock(&state), "d", CheckpointKind::Differential);
        assert_eq!(
            test_util::keys_of(&edits),
            vec!["del state/item/d/items:\"k\"", "put state/item/d/items:\"n\""]
        );
    }

    #[test]
    fn reload_entries() {
        let (d, state) = dict();
        d.add("x".into(), 10).unwrap();
        d.add("y".into(), 20).unwrap();
        let mut store = InMemoryStore::new();
        test_util::checkpoint(&mut *write_lock(&state), "d", CheckpointKind::Full, &mut store);

        let loaded = DictionaryState::load(&test_util::id("d"), &store).unwrap();
        let r: Dictionary<String, u32> = Dictionary::attach(test_util::id("d"), shared(loaded));
        assert_eq!(r.len(), 2);
        assert_eq!(r.get(&"y".into()).unwrap(), Some(20));
        assert_eq!(r.keys().unwrap(), vec!["x", "y"]);
    }
}
