use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ospace_store::{CheckpointBatch, CheckpointStore, StoreReader, StoreWriter};
use ospace_track::DiffDict;
use ospace_types::{ArtifactId, ArtifactKind, Category, CheckpointKind, Edit, OrderedKeyCodec};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::artifact::{
    shared, Array, ArrayState, ArtifactSlot, Dictionary, DictionaryState, List, ListState,
    Queue, QueueState, SaveContext, Set, SetState, Stack, StackState, Value, ValueState,
};
use crate::codec::{self, Element};
use crate::config::SpaceConfig;
use crate::error::{SpaceError, SpaceResult};

/// Keys a deleted artifact may still hold in the store.
struct Tombstone {
    id: ArtifactId,
    keys: Vec<(Category, String)>,
}

/// Outcome of one [`ObjectSpace::checkpoint`] cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckpointSummary {
    /// Sequence number the store assigned.
    pub seq: u64,
    pub kind: CheckpointKind,
    /// Number of edits committed.
    pub edits: usize,
}

/// Registry of named artifacts sharing one identifier namespace.
///
/// The identifier index is itself a differential dictionary persisted under
/// `state/index`, so creating and deleting artifacts is checkpointed the
/// same way element changes are.
pub struct ObjectSpace {
    config: SpaceConfig,
    keys: OrderedKeyCodec,
    index: DiffDict<ArtifactId, ArtifactKind>,
    artifacts: BTreeMap<ArtifactId, ArtifactSlot>,
    tombstones: Vec<Tombstone>,
    /// Tombstones included in the outstanding save.
    captured_tombstones: usize,
    checkpoints: u64,
}

impl ObjectSpace {
    /// An empty space with the default configuration.
    pub fn new() -> Self {
        Self::from_parts(SpaceConfig::default(), OrderedKeyCodec::decimal())
    }

    /// An empty space. Fails when `config.key_alphabet` is not a valid
    /// ordered-key alphabet.
    pub fn with_config(config: SpaceConfig) -> SpaceResult<Self> {
        let keys = OrderedKeyCodec::new(&config.key_alphabet)?;
        Ok(Self::from_parts(config, keys))
    }

    /// Build a space and load it from `reader`.
    pub fn open<R: StoreReader + ?Sized>(reader: &R, config: SpaceConfig) -> SpaceResult<Self> {
        let mut space = Self::with_config(config)?;
        space.load(reader)?;
        Ok(space)
    }

    fn from_parts(config: SpaceConfig, keys: OrderedKeyCodec) -> Self {
        Self {
            config,
            keys,
            index: DiffDict::new(),
            artifacts: BTreeMap::new(),
            tombstones: Vec::new(),
            captured_tombstones: 0,
            checkpoints: 0,
        }
    }

    pub fn config(&self) -> &SpaceConfig {
        &self.config
    }

    pub fn key_codec(&self) -> &OrderedKeyCodec {
        &self.keys
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Number of live artifacts.
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.artifacts.contains_key(id)
    }

    pub fn kind_of(&self, id: &str) -> Option<ArtifactKind> {
        self.artifacts.get(id).map(ArtifactSlot::kind)
    }

    /// Live identifiers in order.
    pub fn ids(&self) -> Vec<ArtifactId> {
        self.artifacts.keys().cloned().collect()
    }

    /// True when anything (index, tombstones, any artifact) would be
    /// emitted by a differential save or is awaiting acknowledgement.
    pub fn is_dirty(&self) -> bool {
        self.index.is_dirty()
            || !self.tombstones.is_empty()
            || self
                .artifacts
                .values()
                .any(|slot| slot.with_state(|state| state.is_dirty()))
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    pub fn create_value<T: Element>(&mut self, id: &str, initial: T) -> SpaceResult<Value<T>> {
        let id = self.claim(id)?;
        let state = shared(ValueState::new(codec::encode(&initial)?));
        self.install(id.clone(), ArtifactSlot::Value(Arc::clone(&state)))?;
        Ok(Value::attach(id, state))
    }

    /// Create an array of `length` elements, each `T::default()`.
    pub fn create_array<T: Element + Default>(
        &mut self,
        id: &str,
        length: usize,
    ) -> SpaceResult<Array<T>> {
        let id = self.claim(id)?;
        let fill = codec::encode(&T::default())?;
        let state = shared(ArrayState::new(length, &fill));
        self.install(id.clone(), ArtifactSlot::Array(Arc::clone(&state)))?;
        Ok(Array::attach(id, state))
    }

    pub fn create_stack<T: Element>(&mut self, id: &str) -> SpaceResult<Stack<T>> {
        let id = self.claim(id)?;
        let state = shared(StackState::new());
        self.install(id.clone(), ArtifactSlot::Stack(Arc::clone(&state)))?;
        Ok(Stack::attach(id, state))
    }

    pub fn create_queue<T: Element>(&mut self, id: &str) -> SpaceResult<Queue<T>> {
        let id = self.claim(id)?;
        let state = shared(QueueState::new());
        self.install(id.clone(), ArtifactSlot::Queue(Arc::clone(&state)))?;
        Ok(Queue::attach(id, state))
    }

    pub fn create_list<T: Element>(&mut self, id: &str) -> SpaceResult<List<T>> {
        let id = self.claim(id)?;
        let state = shared(ListState::new());
        self.install(id.clone(), ArtifactSlot::List(Arc::clone(&state)))?;
        Ok(List::attach(id, state))
    }

    pub fn create_set<T: Element>(&mut self, id: &str) -> SpaceResult<Set<T>> {
        let id = self.claim(id)?;
        let state = shared(SetState::new());
        self.install(id.clone(), ArtifactSlot::Set(Arc::clone(&state)))?;
        Ok(Set::attach(id, state))
    }

    pub fn create_dictionary<K: Element, V: Element>(
        &mut self,
        id: &str,
    ) -> SpaceResult<Dictionary<K, V>> {
        let id = self.claim(id)?;
        let state = shared(DictionaryState::new());
        self.install(id.clone(), ArtifactSlot::Dictionary(Arc::clone(&state)))?;
        Ok(Dictionary::attach(id, state))
    }

    /// Validate `id` and make sure no artifact of any kind owns it.
    fn claim(&self, id: &str) -> SpaceResult<ArtifactId> {
        let id = ArtifactId::new(id)?;
        if let Some(slot) = self.artifacts.get(&id) {
            return Err(SpaceError::AlreadyExists(format!(
                "artifact `{id}` already exists as a {}",
                slot.kind()
            )));
        }
        Ok(id)
    }

    fn install(&mut self, id: ArtifactId, slot: ArtifactSlot) -> SpaceResult<()> {
        let kind = slot.kind();
        self.index.add(id.clone(), kind)?;
        debug!(id = %id, kind = %kind, "artifact created");
        self.artifacts.insert(id, slot);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Get
    // -----------------------------------------------------------------------

    pub fn get_value<T: Element>(&self, id: &str) -> SpaceResult<Value<T>> {
        match self.lookup(id)? {
            (id, ArtifactSlot::Value(state)) => Ok(Value::attach(id, Arc::clone(state))),
            (id, slot) => Err(wrong_kind(&id, slot, ArtifactKind::Value)),
        }
    }

    pub fn get_array<T: Element>(&self, id: &str) -> SpaceResult<Array<T>> {
        match self.lookup(id)? {
            (id, ArtifactSlot::Array(state)) => Ok(Array::attach(id, Arc::clone(state))),
            (id, slot) => Err(wrong_kind(&id, slot, ArtifactKind::Array)),
        }
    }

    pub fn get_stack<T: Element>(&self, id: &str) -> SpaceResult<Stack<T>> {
        match self.lookup(id)? {
            (id, ArtifactSlot::Stack(state)) => Ok(Stack::attach(id, Arc::clone(state))),
            (id, slot) => Err(wrong_kind(&id, slot, ArtifactKind::Stack)),
        }
    }

    pub fn get_queue<T: Element>(&self, id: &str) -> SpaceResult<Queue<T>> {
        match self.lookup(id)? {
            (id, ArtifactSlot::Queue(state)) => Ok(Queue::attach(id, Arc::clone(state))),
            (id, slot) => Err(wrong_kind(&id, slot, ArtifactKind::Queue)),
        }
    }

    pub fn get_list<T: Element>(&self, id: &str) -> SpaceResult<List<T>> {
        match self.lookup(id)? {
            (id, ArtifactSlot::List(state)) => Ok(List::attach(id, Arc::clone(state))),
            (id, slot) => Err(wrong_kind(&id, slot, ArtifactKind::List)),
        }
    }

    pub fn get_set<T: Element>(&self, id: &str) -> SpaceResult<Set<T>> {
        match self.lookup(id)? {
            (id, ArtifactSlot::Set(state)) => Ok(Set::attach(id, Arc::clone(state))),
            (id, slot) => Err(wrong_kind(&id, slot, ArtifactKind::Set)),
        }
    }

    pub fn get_dictionary<K: Element, V: Element>(
        &self,
        id: &str,
    ) -> SpaceResult<Dictionary<K, V>> {
        match self.lookup(id)? {
            (id, ArtifactSlot::Dictionary(state)) => {
                Ok(Dictionary::attach(id, Arc::clone(state)))
            }
            (id, slot) => Err(wrong_kind(&id, slot, ArtifactKind::Dictionary)),
        }
    }

    fn lookup(&self, id: &str) -> SpaceResult<(ArtifactId, &ArtifactSlot)> {
        let id = ArtifactId::new(id)?;
        match self.artifacts.get(&id) {
            Some(slot) => Ok((id, slot)),
            None => Err(SpaceError::NotFound(format!("no artifact named `{id}`"))),
        }
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Remove an artifact. If it may already be durable, the next save
    /// deletes every key it owns.
    pub fn delete(&mut self, id: &str) -> SpaceResult<()> {
        let id = ArtifactId::new(id)?;
        let slot = self
            .artifacts
            .remove(&id)
            .ok_or_else(|| SpaceError::NotFound(format!("no artifact named `{id}`")))?;
        let durable = self.index.may_be_durable(&id);
        self.index.remove(&id)?;

        if durable {
            let keys = slot.with_state(|state| state.owned_keys(&id, &self.keys));
            debug!(id = %id, keys = keys.len(), "artifact deleted; store keys queued for removal");
            self.tombstones.push(Tombstone { id, keys });
        } else {
            debug!(id = %id, "artifact deleted before reaching the store");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Checkpoint protocol
    // -----------------------------------------------------------------------

    /// Write a checkpoint's edits through `writer` and return how many were
    /// written.
    ///
    /// Order: index deletes, keys of deleted artifacts, index adds and
    /// updates, then each live artifact by identifier (metadata before data
    /// or items). Nothing is considered durable until [`on_saved`] is
    /// called; saving again without it re-emits the same changes.
    ///
    /// [`on_saved`]: ObjectSpace::on_saved
    pub fn save<W: StoreWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        kind: CheckpointKind,
    ) -> SpaceResult<usize> {
        let mut edits = Vec::new();

        let index = self.index.create_snapshot(kind.is_differential());
        let index_category = Category::index();
        let (removed, written): (Vec<_>, Vec<_>) =
            index.iter().partition(|entry| entry.change.is_delete());

        for entry in removed {
            edits.push(Edit::delete(index_category.clone(), entry.key.as_str()));
        }

        self.captured_tombstones = self.tombstones.len();
        for tombstone in &self.tombstones {
            for (category, key) in &tombstone.keys {
                edits.push(Edit::delete(category.clone(), key.clone()));
            }
        }

        for entry in written {
            if let Some(artifact_kind) = entry.change.value() {
                edits.push(Edit::put(
                    index_category.clone(),
                    entry.key.as_str(),
                    artifact_kind.as_str().as_bytes().to_vec(),
                ));
            }
        }

        for (id, slot) in &self.artifacts {
            let ctx = SaveContext {
                id,
                kind,
                keys: &self.keys,
            };
            slot.with_state(|state| state.save(&ctx, &mut edits))?;
        }

        let count = edits.len();
        for edit in edits {
            writer.append(edit)?;
        }
        debug!(
            ?kind,
            edits = count,
            artifacts = self.artifacts.len(),
            tombstones = self.captured_tombstones,
            "object space saved"
        );
        Ok(count)
    }

    /// The edits of the last [`save`](ObjectSpace::save) are durable.
    pub fn on_saved(&mut self) {
        self.index.on_saved();
        let flushed = self.captured_tombstones.min(self.tombstones.len());
        if flushed > 0 {
            let flushed: Vec<ArtifactId> = self.tombstones.drain(..flushed).map(|t| t.id).collect();
            debug!(ids = ?flushed, "deleted artifacts flushed from the store");
        }
        self.captured_tombstones = 0;
        for slot in self.artifacts.values() {
            slot.with_state(|state| state.on_saved());
        }
    }

    /// Replace the whole space with what `reader` holds.
    ///
    /// Handles obtained before the call are detached. On error the space is
    /// left unchanged.
    pub fn load<R: StoreReader + ?Sized>(&mut self, reader: &R) -> SpaceResult<()> {
        let index_category = Category::index();
        let mut index = Vec::new();
        let mut artifacts = BTreeMap::new();

        for (key, value) in reader.read_category(&index_category)? {
            let id = ArtifactId::new(key.as_str())
                .map_err(|e| SpaceError::corrupt(&index_category, &key, e.to_string()))?;
            let kind = std::str::from_utf8(&value)
                .ok()
                .and_then(|name| name.parse::<ArtifactKind>().ok())
                .ok_or_else(|| {
                    SpaceError::corrupt(&index_category, &key, "unknown artifact kind")
                })?;
            let slot = ArtifactSlot::load(kind, &id, reader, &self.keys)?;
            index.push((id.clone(), kind));
            artifacts.insert(id, slot);
        }

        self.index = DiffDict::from_committed(index);
        self.artifacts = artifacts;
        self.tombstones.clear();
        self.captured_tombstones = 0;
        info!(artifacts = self.artifacts.len(), "object space loaded");
        Ok(())
    }

    /// Run one save/commit/acknowledge cycle with the configured kind.
    pub fn checkpoint<S: CheckpointStore + ?Sized>(
        &mut self,
        store: &mut S,
    ) -> SpaceResult<CheckpointSummary> {
        let kind = self.next_checkpoint_kind();
        self.checkpoint_with(store, kind)
    }

    /// Run one save/commit/acknowledge cycle of the given kind. On a commit
    /// failure nothing is acknowledged, so the next checkpoint re-emits.
    pub fn checkpoint_with<S: CheckpointStore + ?Sized>(
        &mut self,
        store: &mut S,
        kind: CheckpointKind,
    ) -> SpaceResult<CheckpointSummary> {
        let mut batch = CheckpointBatch::new(kind);
        let edits = self.save(&mut batch, kind)?;
        let seq = store.commit(batch).map_err(|e| {
            warn!(error = %e, ?kind, "checkpoint commit failed; changes stay pending");
            SpaceError::from(e)
        })?;
        self.on_saved();
        self.checkpoints += 1;
        info!(seq, ?kind, edits, "checkpoint committed");
        Ok(CheckpointSummary { seq, kind, edits })
    }

    fn next_checkpoint_kind(&self) -> CheckpointKind {
        match self.config.full_checkpoint_every {
            Some(every) if every > 0 && self.checkpoints % u64::from(every) == 0 => {
                CheckpointKind::Full
            }
            _ => self.config.default_checkpoint,
        }
    }
}

impl Default for ObjectSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectSpace")
            .field("artifacts", &self.artifacts.len())
            .field("pending_index", &self.index.pending_len())
            .field("tombstones", &self.tombstones.len())
            .field("checkpoints", &self.checkpoints)
            .finish()
    }
}

fn wrong_kind(id: &ArtifactId, slot: &ArtifactSlot, wanted: ArtifactKind) -> SpaceError {
    SpaceError::NotFound(format!(
        "artifact `{id}` is a {}, not a {wanted}",
        slot.kind()
    ))
}
