//! Per-segment entry tables

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use ahash::RandomState;
use segindex::{DocSet, ListenerId, Segment};

use crate::ram;

/// Cached sets of one segment, keyed by query singleton
pub(crate) struct SegmentTable<Q> {
    segment: Weak<Segment>,
    listener: ListenerId,
    entries: HashMap<Arc<Q>, Arc<DocSet>, RandomState>,
    ram_bytes: usize,
}

impl<Q: Hash + Eq> SegmentTable<Q> {
    /// Table for `segment`, whose close listener is `listener`
    pub(crate) fn new(segment: &Arc<Segment>, listener: ListenerId) -> Self {
        Self {
            segment: Arc::downgrade(segment),
            listener,
            entries: HashMap::with_hasher(RandomState::new()),
            ram_bytes: 0,
        }
    }

    pub(crate) fn get(&self, key: &Q) -> Option<&Arc<DocSet>> {
        self.entries.get(key)
    }

    pub(crate) fn contains(&self, key: &Q) -> bool {
        self.entries.contains_key(key)
    }

    /// Store `set` unless an entry exists; returns the entry cost if stored
    pub(crate) fn put_if_absent(&mut self, key: Arc<Q>, set: Arc<DocSet>) -> Option<usize> {
        if self.entries.contains_key(&*key) {
            return None;
        }
        let cost = ram::doc_set_cost(&set);
        self.entries.insert(key, set);
        self.ram_bytes += cost;
        Some(cost)
    }

    /// Drop the entry for `key`; returns its cost
    pub(crate) fn remove(&mut self, key: &Q) -> Option<usize> {
        let set = self.entries.remove(key)?;
        let cost = ram::doc_set_cost(&set);
        self.ram_bytes -= cost;
        Some(cost)
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &Arc<Q>> {
        self.entries.keys()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of entry costs
    pub(crate) fn ram_bytes(&self) -> usize {
        self.ram_bytes
    }

    /// Sum of entry costs, recomputed from the stored sets
    pub(crate) fn recompute_ram_bytes(&self) -> usize {
        self.entries.values().map(|set| ram::doc_set_cost(set)).sum()
    }
}

impl<Q> SegmentTable<Q> {
    /// Stop listening for the segment's close, if it is still alive
    pub(crate) fn deregister(&self) {
        if let Some(segment) = self.segment.upgrade() {
            segment.remove_close_listener(self.listener);
        }
    }
}
