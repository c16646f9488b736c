//! Append-only stack of edit pages.

use std::collections::BTreeMap;
use std::sync::Arc;

/// A unit of pending edits held by a [`PagedState`].
pub trait Page: Default {
    fn is_empty(&self) -> bool;
}

impl<K, V> Page for BTreeMap<K, V> {
    fn is_empty(&self) -> bool {
        BTreeMap::is_empty(self)
    }
}

struct FrozenPage<P> {
    seq: u64,
    page: Arc<P>,
}

/// Stack of edit pages, most recent on top.
///
/// Only the top page is mutable. [`save_state`](Self::save_state) freezes
/// the top page and hands out a [`PageSnapshot`] that shares the frozen
/// pages; later edits go to a fresh top page and never show up in that
/// snapshot. [`on_saved`](Self::on_saved) pops exactly the pages the most
/// recent snapshot captured.
pub struct PagedState<P> {
    /// Frozen pages, oldest first.
    frozen: Vec<FrozenPage<P>>,
    top: P,
    next_seq: u64,
    captured_through: Option<u64>,
}

impl<P: Page> PagedState<P> {
    pub fn new() -> Self {
        Self {
            frozen: Vec::new(),
            top: P::default(),
            next_seq: 0,
            captured_through: None,
        }
    }

    /// The mutable top page.
    pub fn state(&self) -> &P {
        &self.top
    }

    pub fn state_mut(&mut self) -> &mut P {
        &mut self.top
    }

    /// Every page, most recent first.
    pub fn pages(&self) -> impl Iterator<Item = &P> + '_ {
        std::iter::once(&self.top).chain(self.frozen.iter().rev().map(|f| f.page.as_ref()))
    }

    /// Pages captured by some snapshot and not yet committed, most recent
    /// first.
    pub fn frozen_pages(&self) -> impl Iterator<Item = &P> + '_ {
        self.frozen.iter().rev().map(|f| f.page.as_ref())
    }

    /// Number of pages including the top page.
    pub fn depth(&self) -> usize {
        self.frozen.len() + 1
    }

    /// True while any page holds edits.
    pub fn is_dirty(&self) -> bool {
        !self.top.is_empty() || !self.frozen.is_empty()
    }

    /// Freeze the current pages and start a new top page.
    ///
    /// An empty top page is reused instead of frozen.
    pub fn save_state(&mut self) -> PageSnapshot<P> {
        if !self.top.is_empty() {
            let page = std::mem::take(&mut self.top);
            self.frozen.push(FrozenPage {
                seq: self.next_seq,
                page: Arc::new(page),
            });
            self.next_seq += 1;
        }
        self.captured_through = self.frozen.last().map(|f| f.seq);
        PageSnapshot {
            pages: self.frozen.iter().map(|f| Arc::clone(&f.page)).collect(),
            through: self.captured_through,
        }
    }

    /// Acknowledge the most recent snapshot. Returns the popped pages,
    /// oldest first.
    pub fn on_saved(&mut self) -> Vec<Arc<P>> {
        match self.captured_through.take() {
            Some(through) => self.pop_through(through),
            None => Vec::new(),
        }
    }

    /// Acknowledge a specific snapshot, which need not be the latest.
    pub fn on_committed(&mut self, snapshot: &PageSnapshot<P>) -> Vec<Arc<P>> {
        match snapshot.through {
            Some(through) => {
                if self.captured_through.is_some_and(|c| c <= through) {
                    self.captured_through = None;
                }
                self.pop_through(through)
            }
            None => Vec::new(),
        }
    }

    /// Drop every page, committed or not.
    pub fn clear(&mut self) {
        self.frozen.clear();
        self.top = P::default();
        self.captured_through = None;
    }

    fn pop_through(&mut self, through: u64) -> Vec<Arc<P>> {
        let split = self
            .frozen
            .iter()
            .position(|f| f.seq > through)
            .unwrap_or(self.frozen.len());
        self.frozen.drain(..split).map(|f| f.page).collect()
    }
}

impl<P: Page> Default for PagedState<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> std::fmt::Debug for PagedState<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedState")
            .field("frozen", &self.frozen.len())
            .field("captured_through", &self.captured_through)
            .finish()
    }
}

/// Immutable view of the pages frozen by one `save_state` call.
pub struct PageSnapshot<P> {
    /// Oldest first.
    pages: Vec<Arc<P>>,
    through: Option<u64>,
}

impl<P> PageSnapshot<P> {
    /// Captured pages, most recent first.
    pub fn pages(&self) -> impl Iterator<Item = &P> + '_ {
        self.pages.iter().rev().map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl<P> Clone for PageSnapshot<P> {
    fn clone(&self) -> Self {
        Self {
            pages: self.pages.clone(),
            through: self.through,
        }
    }
}

impl<P> std::fmt::Debug for PageSnapshot<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSnapshot")
            .field("pages", &self.pages.len())
            .field("through", &self.through)
            .finish()
    }
}
