//! The differential dictionary.
//!
//! [`DiffDict`] is a key/value map split in two layers: a committed base
//! that mirrors what the store durably holds, and a [`PagedState`] of
//! pending edits on top. Each pending page keeps only the last operation
//! per key (`Put` or `Remove`), so the net effect of any sequence of edits
//! is read off directly by comparing the newest pending operation with the
//! base:
//!
//! | newest pending op | key in base | net change |
//! |-------------------|-------------|------------|
//! | `Put(v)`          | no          | `Added(v)` |
//! | `Put(v)`          | yes         | `Updated(v)` |
//! | `Remove`          | yes         | `Deleted`  |
//! | `Remove`          | no          | nothing    |

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{TrackError, TrackResult};
use crate::paged::PagedState;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Pending<V> {
    Put(V),
    Remove,
}

type EditPage<K, V> = BTreeMap<K, Pending<V>>;

/// Net change of one key within a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change<V> {
    Added(V),
    Updated(V),
    Deleted,
}

impl<V> Change<V> {
    /// The written value, `None` for deletions.
    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Added(v) | Self::Updated(v) => Some(v),
            Self::Deleted => None,
        }
    }

    pub fn into_value(self) -> Option<V> {
        match self {
            Self::Added(v) | Self::Updated(v) => Some(v),
            Self::Deleted => None,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

/// One visited key of a [`DictSnapshot`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotEntry<K, V> {
    pub key: K,
    pub change: Change<V>,
}

/// Edits captured when a checkpoint starts, in key order.
///
/// A snapshot is a value: later mutations of the dictionary never change
/// it. Hand it back through [`DiffDict::on_committed`] (or call
/// [`DiffDict::on_saved`]) once the checkpoint is durable.
pub struct DictSnapshot<K, V> {
    entries: Vec<SnapshotEntry<K, V>>,
    pages: crate::paged::PageSnapshot<EditPage<K, V>>,
    differential: bool,
}

impl<K, V> DictSnapshot<K, V> {
    pub fn entries(&self) -> &[SnapshotEntry<K, V>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_differential(&self) -> bool {
        self.differential
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnapshotEntry<K, V>> + '_ {
        self.entries.iter()
    }
}

impl<K: Debug, V: Debug> Debug for DictSnapshot<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DictSnapshot")
            .field("entries", &self.entries)
            .field("differential", &self.differential)
            .finish()
    }
}

/// Key/value map that records net pending edits since the last commit.
pub struct DiffDict<K, V> {
    base: BTreeMap<K, V>,
    pending: PagedState<EditPage<K, V>>,
    len: usize,
}

impl<K, V> DiffDict<K, V>
where
    K: Ord + Clone + Debug,
    V: Clone,
{
    /// An empty dictionary with nothing committed.
    pub fn new() -> Self {
        Self {
            base: BTreeMap::new(),
            pending: PagedState::new(),
            len: 0,
        }
    }

    /// A dictionary whose entries are already durable, e.g. after a reload.
    pub fn from_committed(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        let base: BTreeMap<K, V> = entries.into_iter().collect();
        let len = base.len();
        Self {
            base,
            pending: PagedState::new(),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Effective value of `key`, pending edits included.
    pub fn get(&self, key: &K) -> Option<&V> {
        for page in self.pending.pages() {
            if let Some(op) = page.get(key) {
                return match op {
                    Pending::Put(value) => Some(value),
                    Pending::Remove => None,
                };
            }
        }
        self.base.get(key)
    }

    /// Value of a present key; fails with [`TrackError::KeyNotFound`].
    pub fn get_existing(&self, key: &K) -> TrackResult<&V> {
        self.get(key)
            .ok_or_else(|| TrackError::KeyNotFound(format!("{key:?}")))
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Add or overwrite `key`. Returns the previous value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let previous = self.get(&key).cloned();
        if previous.is_none() {
            self.len += 1;
        }
        self.pending.state_mut().insert(key, Pending::Put(value));
        previous
    }

    /// Add a key that is not currently present.
    pub fn add(&mut self, key: K, value: V) -> TrackResult<()> {
        if self.contains_key(&key) {
            return Err(TrackError::KeyExists(format!("{key:?}")));
        }
        self.insert(key, value);
        Ok(())
    }

    /// Remove a present key, returning its value.
    pub fn remove(&mut self, key: &K) -> TrackResult<V> {
        self.try_remove(key)
            .ok_or_else(|| TrackError::KeyNotFound(format!("{key:?}")))
    }

    /// Remove `key` if present.
    pub fn try_remove(&mut self, key: &K) -> Option<V> {
        let previous = self.get(key).cloned()?;
        self.len -= 1;
        self.pending.state_mut().insert(key.clone(), Pending::Remove);
        Some(previous)
    }

    /// Effective entries (committed and pending) in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        let mut view: BTreeMap<&K, &V> = self.base.iter().collect();
        let pages: Vec<_> = self.pending.pages().collect();
        for page in pages.into_iter().rev() {
            for (key, op) in page {
                match op {
                    Pending::Put(value) => {
                        view.insert(key, value);
                    }
                    Pending::Remove => {
                        view.remove(key);
                    }
                }
            }
        }
        view.into_iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    /// True while any edit has not been acknowledged by a commit.
    pub fn is_dirty(&self) -> bool {
        self.pending.is_dirty()
    }

    /// Number of distinct keys touched by unacknowledged edits.
    pub fn pending_len(&self) -> usize {
        self.touched_keys().len()
    }

    /// Whether `key` might exist in durable state: it is committed, or an
    /// outstanding snapshot captured it.
    pub fn may_be_durable(&self, key: &K) -> bool {
        self.base.contains_key(key) || self.pending.frozen_pages().any(|p| p.contains_key(key))
    }

    /// Every key the store may hold: committed keys plus keys captured by
    /// an outstanding snapshot. Keys touched only since the last snapshot
    /// are left out.
    pub fn durable_keys(&self) -> BTreeSet<K> {
        let mut keys: BTreeSet<K> = self.base.keys().cloned().collect();
        for page in self.pending.frozen_pages() {
            keys.extend(page.keys().cloned());
        }
        keys
    }

    /// Capture pending edits for a checkpoint.
    ///
    /// A differential snapshot visits only keys whose net change is
    /// non-trivial. A full snapshot visits every present key.
    pub fn create_snapshot(&mut self, differential: bool) -> DictSnapshot<K, V> {
        let pages = self.pending.save_state();

        let entries = if differential {
            let mut net: BTreeMap<&K, &Pending<V>> = BTreeMap::new();
            // Newest first: the first operation seen per key wins.
            for page in pages.pages() {
                for (key, op) in page {
                    net.entry(key).or_insert(op);
                }
            }
            net.into_iter()
                .filter_map(|(key, op)| {
                    let committed = self.base.contains_key(key);
                    let change = match (op, committed) {
                        (Pending::Put(value), false) => Change::Added(value.clone()),
                        (Pending::Put(value), true) => Change::Updated(value.clone()),
                        (Pending::Remove, true) => Change::Deleted,
                        (Pending::Remove, false) => return None,
                    };
                    Some(SnapshotEntry {
                        key: key.clone(),
                        change,
                    })
                })
                .collect()
        } else {
            // The top page is empty right after save_state, so the live view
            // is exactly the captured view.
            self.iter()
                .map(|(key, value)| {
                    let change = if self.base.contains_key(key) {
                        Change::Updated(value.clone())
                    } else {
                        Change::Added(value.clone())
                    };
                    SnapshotEntry {
                        key: key.clone(),
                        change,
                    }
                })
                .collect()
        };

        DictSnapshot {
            entries,
            pages,
            differential,
        }
    }

    /// Commit a specific snapshot: fold the pages it captured into the base.
    pub fn on_committed(&mut self, snapshot: &DictSnapshot<K, V>) {
        let pages = self.pending.on_committed(&snapshot.pages);
        self.fold(pages);
    }

    /// Commit the most recent snapshot.
    pub fn on_saved(&mut self) {
        let pages = self.pending.on_saved();
        self.fold(pages);
    }

    fn fold(&mut self, pages: Vec<Arc<EditPage<K, V>>>) {
        for page in pages {
            for (key, op) in page.iter() {
                match op {
                    Pending::Put(value) => {
                        self.base.insert(key.clone(), value.clone());
                    }
                    Pending::Remove => {
                        self.base.remove(key);
                    }
                }
            }
        }
    }

    fn touched_keys(&self) -> BTreeSet<&K> {
        self.pending.pages().flat_map(|page| page.keys()).collect()
    }
}

impl<K, V> Default for DiffDict<K, V>
where
    K: Ord + Clone + Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Debug for DiffDict<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffDict")
            .field("len", &self.len)
            .field("committed", &self.base.len())
            .field("pending", &self.pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn committed(entries: &[(&'static str, i32)]) -> DiffDict<&'static str, i32> {
        DiffDict::from_committed(entries.iter().copied())
    }

    fn diff(dict: &mut DiffDict<&'static str, i32>) -> Vec<SnapshotEntry<&'static str, i32>> {
        dict.create_snapshot(true).entries().to_vec()
    }

    fn entry(key: &'static str, change: Change<i32>) -> SnapshotEntry<&'static str, i32> {
        SnapshotEntry { key, change }
    }

    // -----------------------------------------------------------------------
    // Map operations
    // -----------------------------------------------------------------------

    #[test]
    fn lookups_see_pending_edits() {
        let mut dict = committed(&[("a", 1)]);
        dict.insert("b", 2);
        dict.remove(&"a").unwrap();
        assert_eq!(dict.get(&"a"), None);
        assert_eq!(dict.get(&"b"), Some(&2));
        assert!(!dict.contains_key(&"a"));
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn add_existing_key_fails() {
        let mut dict = committed(&[("a", 1)]);
        assert_eq!(dict.add("a", 2), Err(TrackError::KeyExists("\"a\"".into())));
        dict.add("b", 2).unwrap();
        assert!(dict.add("b", 3).is_err());
    }

    #[test]
    fn add_after_remove_is_allowed() {
        let mut dict = committed(&[("a", 1)]);
        dict.remove(&"a").unwrap();
        dict.add("a", 5).unwrap();
        assert_eq!(dict.get(&"a"), Some(&5));
    }

    #[test]
    fn remove_absent_key_fails() {
        let mut dict: DiffDict<&str, i32> = DiffDict::new();
        assert_eq!(
            dict.remove(&"nope"),
            Err(TrackError::KeyNotFound("\"nope\"".into()))
        );
        assert_eq!(dict.try_remove(&"nope"), None);
        assert_eq!(dict.len(), 0);
    }

    #[test]
    fn get_existing_fails_for_absent_keys() {
        let mut dict = committed(&[("a", 1)]);
        assert_eq!(dict.get_existing(&"a"), Ok(&1));
        dict.remove(&"a").unwrap();
        assert_eq!(
            dict.get_existing(&"a"),
            Err(TrackError::KeyNotFound("\"a\"".into()))
        );
    }

    #[test]
    fn insert_returns_previous_value() {
        let mut dict = committed(&[("a", 1)]);
        assert_eq!(dict.insert("a", 2), Some(1));
        assert_eq!(dict.insert("b", 3), None);
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn iteration_merges_layers_in_key_order() {
        let mut dict = committed(&[("a", 1), ("c", 3)]);
        dict.insert("b", 2);
        dict.create_snapshot(true);
        dict.insert("a", 10);
        dict.remove(&"c").unwrap();
        let entries: Vec<_> = dict.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(entries, vec![("a", 10), ("b", 2)]);
    }

    // -----------------------------------------------------------------------
    // Collapsing rules
    // -----------------------------------------------------------------------

    #[test]
    fn add_is_net_add() {
        let mut dict = committed(&[]);
        dict.add("a", 1).unwrap();
        assert_eq!(diff(&mut dict), vec![entry("a", Change::Added(1))]);
    }

    #[test]
    fn add_then_remove_is_invisible() {
        let mut dict = committed(&[("z", 0)]);
        dict.add("a", 1).unwrap();
        dict.remove(&"a").unwrap();
        assert!(diff(&mut dict).is_empty());

        let mut dict = committed(&[("z", 0)]);
        dict.add("a", 1).unwrap();
        dict.remove(&"a").unwrap();
        let full = dict.create_snapshot(false);
        assert_eq!(full.entries(), &[entry("z", Change::Updated(0))]);
    }

    #[test]
    fn updates_collapse_to_latest() {
        let mut dict = committed(&[("a", 1)]);
        dict.insert("a", 2);
        dict.insert("a", 3);
        assert_eq!(diff(&mut dict), vec![entry("a", Change::Updated(3))]);
    }

    #[test]
    fn remove_then_add_is_update() {
        let mut dict = committed(&[("a", 1)]);
        dict.remove(&"a").unwrap();
        dict.add("a", 2).unwrap();
        assert_eq!(diff(&mut dict), vec![entry("a", Change::Updated(2))]);
    }

    #[test]
    fn remove_is_net_delete() {
        let mut dict = committed(&[("a", 1)]);
        dict.remove(&"a").unwrap();
        assert_eq!(diff(&mut dict), vec![entry("a", Change::Deleted)]);
    }

    // -----------------------------------------------------------------------
    // Snapshot / commit protocol
    // -----------------------------------------------------------------------

    #[test]
    fn committed_snapshot_leaves_nothing_pending() {
        let mut dict = committed(&[]);
        dict.insert("a", 1);
        dict.create_snapshot(true);
        dict.on_saved();
        assert!(!dict.is_dirty());
        assert!(diff(&mut dict).is_empty());
    }

    #[test]
    fn full_snapshot_twice_is_identical() {
        let mut dict = committed(&[("a", 1)]);
        dict.insert("b", 2);
        let first = dict.create_snapshot(false).entries().to_vec();
        let second = dict.create_snapshot(false).entries().to_vec();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn edits_after_snapshot_stay_pending() {
        let mut dict = committed(&[("a", 1)]);
        dict.insert("a", 2);
        let snapshot = dict.create_snapshot(true);
        dict.insert("b", 3);
        dict.on_committed(&snapshot);

        assert!(dict.is_dirty());
        assert_eq!(diff(&mut dict), vec![entry("b", Change::Added(3))]);
    }

    #[test]
    fn failed_snapshot_is_merged_into_retry() {
        let mut dict = committed(&[("a", 1), ("b", 2)]);
        dict.remove(&"a").unwrap();
        let _failed = dict.create_snapshot(true);
        // No commit. More edits arrive.
        dict.insert("b", 20);
        dict.insert("c", 3);
        assert_eq!(
            diff(&mut dict),
            vec![
                entry("a", Change::Deleted),
                entry("b", Change::Updated(20)),
                entry("c", Change::Added(3)),
            ]
        );
        dict.on_saved();
        assert!(!dict.is_dirty());
        assert_eq!(dict.pending_len(), 0);
    }

    #[test]
    fn remove_across_failed_snapshot_then_readd() {
        let mut dict = committed(&[("a", 1)]);
        dict.remove(&"a").unwrap();
        dict.create_snapshot(true); // fails
        dict.add("a", 9).unwrap();
        assert_eq!(diff(&mut dict), vec![entry("a", Change::Updated(9))]);
    }

    #[test]
    fn readd_after_committed_delete_is_add() {
        let mut dict = committed(&[("a", 1)]);
        dict.remove(&"a").unwrap();
        dict.create_snapshot(true);
        dict.add("a", 9).unwrap();
        dict.on_saved();
        assert_eq!(diff(&mut dict), vec![entry("a", Change::Added(9))]);
    }

    #[test]
    fn may_be_durable_tracks_outstanding_snapshots() {
        let mut dict: DiffDict<&str, i32> = DiffDict::new();
        dict.insert("a", 1);
        assert!(!dict.may_be_durable(&"a"));
        dict.create_snapshot(true);
        assert!(dict.may_be_durable(&"a"));
        dict.on_saved();
        assert!(dict.may_be_durable(&"a"));
    }

    #[test]
    fn durable_keys_skip_unsnapshotted_edits() {
        let mut dict = committed(&[("a", 1)]);
        dict.insert("b", 2);
        dict.remove(&"a").unwrap();
        let keys: Vec<_> = dict.durable_keys().into_iter().collect();
        assert_eq!(keys, vec!["a"]);

        dict.create_snapshot(true);
        dict.insert("c", 3);
        let keys: Vec<_> = dict.durable_keys().into_iter().collect();
        assert_eq!(keys, vec!["a", "b"]);

        dict.on_saved();
        let keys: Vec<_> = dict.durable_keys().into_iter().collect();
        assert_eq!(keys, vec!["b"]);
    }

    // -----------------------------------------------------------------------
    // Model check: replaying acknowledged diffs reproduces the live map
    // -----------------------------------------------------------------------

    #[derive(Clone, Debug)]
    enum Op {
        Insert(u8, i32),
        Remove(u8),
        Snapshot,
        Commit,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0u8..8, any::<i32>()).prop_map(|(k, v)| Op::Insert(k, v)),
            3 => (0u8..8).prop_map(Op::Remove),
            1 => Just(Op::Snapshot),
            1 => Just(Op::Commit),
        ]
    }

    fn apply(store: &mut BTreeMap<u8, i32>, entries: &[SnapshotEntry<u8, i32>]) {
        for e in entries {
            match &e.change {
                Change::Added(v) | Change::Updated(v) => {
                    store.insert(e.key, *v);
                }
                Change::Deleted => {
                    store.remove(&e.key);
                }
            }
        }
    }

    proptest! {
        #[test]
        fn acknowledged_diffs_track_the_model(ops in proptest::collection::vec(op(), 1..80)) {
            let mut dict: DiffDict<u8, i32> = DiffDict::new();
            let mut model: BTreeMap<u8, i32> = BTreeMap::new();
            let mut store: BTreeMap<u8, i32> = BTreeMap::new();
            let mut outstanding: Option<Vec<SnapshotEntry<u8, i32>>> = None;

            for op in ops {
                match op {
                    Op::Insert(k, v) => {
                        dict.insert(k, v);
                        model.insert(k, v);
                    }
                    Op::Remove(k) => {
                        prop_assert_eq!(dict.try_remove(&k), model.remove(&k));
                    }
                    Op::Snapshot => {
                        // Any earlier outstanding snapshot is treated as failed.
                        outstanding = Some(dict.create_snapshot(true).entries().to_vec());
                    }
                    Op::Commit => {
                        if let Some(entries) = outstanding.take() {
                            apply(&mut store, &entries);
                            dict.on_saved();
                        }
                    }
                }
                prop_assert_eq!(dict.len(), model.len());
                let live: BTreeMap<u8, i32> = dict.iter().map(|(k, v)| (*k, *v)).collect();
                prop_assert_eq!(&live, &model);
            }

            // Final checkpoint: the store must converge on the model.
            let entries = dict.create_snapshot(true).entries().to_vec();
            apply(&mut store, &entries);
            dict.on_saved();
            prop_assert_eq!(&store, &model);
            prop_assert!(dict.create_snapshot(true).is_empty());
        }

        #[test]
        fn deletes_only_target_stored_keys(ops in proptest::collection::vec(op(), 1..60)) {
            let mut dict: DiffDict<u8, i32> = DiffDict::new();
            let mut store: BTreeMap<u8, i32> = BTreeMap::new();
            for op in ops {
                match op {
                    Op::Insert(k, v) => { dict.insert(k, v); }
                    Op::Remove(k) => { dict.try_remove(&k); }
                    Op::Snapshot | Op::Commit => {
                        let entries = dict.create_snapshot(true).entries().to_vec();
                        for e in &entries {
                            match e.change {
                                Change::Deleted => prop_assert!(store.contains_key(&e.key)),
                                Change::Updated(_) => prop_assert!(store.contains_key(&e.key)),
                                Change::Added(_) => prop_assert!(!store.contains_key(&e.key)),
                            }
                        }
                        apply(&mut store, &entries);
                        dict.on_saved();
                    }
                }
            }
        }
    }
}
