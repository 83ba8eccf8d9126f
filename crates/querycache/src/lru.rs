//! Recency index over distinct cached queries
//!
//! Intrusive doubly-linked list over a slab of nodes for O(1) touch and
//! eviction. Each node records the key's hash at insertion so that a key
//! whose identity changed while cached is detected instead of silently
//! leaking.

use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use ahash::RandomState;

/// Node in the LRU doubly-linked list
struct Node<Q> {
    key: Arc<Q>,
    hash: u64,
    /// Number of segment tables holding an entry for `key`
    holders: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

/// The least-recently-used key no longer hashes or compares as it did when
/// it was inserted
#[derive(Debug)]
pub(crate) struct IdentityViolation<Q>(pub Arc<Q>);

/// Distinct cached keys, most recently used first
pub(crate) struct LruIndex<Q> {
    map: HashMap<Arc<Q>, usize, RandomState>,
    nodes: Vec<Option<Node<Q>>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
}

impl<Q: Hash + Eq> LruIndex<Q> {
    pub(crate) fn new() -> Self {
        Self {
            map: HashMap::with_hasher(RandomState::new()),
            nodes: Vec::new(),
            head: None,
            tail: None,
            free_list: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Shared singleton for `key`, refreshing its recency
    pub(crate) fn get(&mut self, key: &Q) -> Option<Arc<Q>> {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.nodes[idx].as_ref().map(|node| Arc::clone(&node.key))
    }

    /// Shared singleton for `key` without touching recency
    pub(crate) fn peek(&self, key: &Q) -> Option<&Arc<Q>> {
        let idx = *self.map.get(key)?;
        self.nodes[idx].as_ref().map(|node| &node.key)
    }

    /// Insert a new key as most recently used, with no holders
    ///
    /// Returns false, and only refreshes recency, if the key is present.
    pub(crate) fn insert(&mut self, key: Arc<Q>) -> bool {
        if let Some(&idx) = self.map.get(&*key) {
            self.move_to_front(idx);
            return false;
        }

        let hash = self.map.hasher().hash_one(&*key);
        let idx = self.alloc_node();
        self.nodes[idx] = Some(Node {
            key: Arc::clone(&key),
            hash,
            holders: 0,
            prev: None,
            next: self.head,
        });

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }

        self.map.insert(key, idx);
        true
    }

    /// A segment table started holding `key`
    pub(crate) fn acquire(&mut self, key: &Q) {
        if let Some(node) = self.node_mut(key) {
            node.holders += 1;
        }
    }

    /// A segment table stopped holding `key`
    ///
    /// Returns the key once it has been removed because no table holds it
    /// anymore. `None` also covers keys that cannot be found.
    pub(crate) fn release(&mut self, key: &Q) -> Option<Arc<Q>> {
        let node = self.node_mut(key)?;
        node.holders = node.holders.saturating_sub(1);
        if node.holders == 0 {
            self.remove(key)
        } else {
            None
        }
    }

    /// Number of segment tables holding `key`
    pub(crate) fn holders(&self, key: &Q) -> Option<usize> {
        let idx = *self.map.get(key)?;
        self.nodes[idx].as_ref().map(|node| node.holders)
    }

    /// Remove a key regardless of its holders
    pub(crate) fn remove(&mut self, key: &Q) -> Option<Arc<Q>> {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        self.free_node(idx);
        self.nodes[idx].take().map(|node| node.key)
    }

    /// Remove and return the least recently used key
    ///
    /// Nothing is modified if that key's identity changed since insertion.
    pub(crate) fn pop_lru(&mut self) -> Result<Option<Arc<Q>>, IdentityViolation<Q>> {
        let Some(tail_idx) = self.tail else {
            return Ok(None);
        };
        let Some(node) = &self.nodes[tail_idx] else {
            return Ok(None);
        };
        let unchanged = self.map.hasher().hash_one(&*node.key) == node.hash
            && self.map.get(&*node.key) == Some(&tail_idx);
        if !unchanged {
            return Err(IdentityViolation(Arc::clone(&node.key)));
        }

        let key = Arc::clone(&node.key);
        self.map.remove(&*key);
        self.unlink(tail_idx);
        self.free_node(tail_idx);
        self.nodes[tail_idx] = None;
        Ok(Some(key))
    }

    /// Keys with their holder counts, least recently used first
    pub(crate) fn iter(&self) -> LruIter<'_, Q> {
        LruIter {
            index: self,
            next: self.tail,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
    }

    fn node_mut(&mut self, key: &Q) -> Option<&mut Node<Q>> {
        let idx = *self.map.get(key)?;
        self.nodes[idx].as_mut()
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }

        self.unlink(idx);

        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = if let Some(node) = &self.nodes[idx] {
            (node.prev, node.next)
        } else {
            return;
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => {
                self.head = next;
            }
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => {
                self.tail = prev;
            }
        }
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.free_list.push(idx);
    }
}

/// Iterator from least to most recently used
pub(crate) struct LruIter<'a, Q> {
    index: &'a LruIndex<Q>,
    next: Option<usize>,
}

impl<'a, Q> Iterator for LruIter<'a, Q> {
    type Item = (&'a Arc<Q>, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.index.nodes[self.next?].as_ref()?;
        self.next = node.prev;
        Some((&node.key, node.holders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hash::Hasher;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn keys(index: &LruIndex<u32>) -> Vec<u32> {
        index.iter().map(|(key, _)| **key).collect()
    }

    #[test]
    fn test_lru_order() {
        let mut index = LruIndex::new();

        assert!(index.insert(Arc::new(1)));
        assert!(index.insert(Arc::new(2)));
        assert!(index.insert(Arc::new(3)));
        assert!(!index.insert(Arc::new(1)));

        assert_eq!(keys(&index), vec![2, 3, 1]);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_get_refreshes_and_peek_does_not() {
        let mut index = LruIndex::new();
        index.insert(Arc::new(1));
        index.insert(Arc::new(2));

        assert_eq!(index.peek(&1).map(|k| **k), Some(1));
        assert_eq!(keys(&index), vec![1, 2]);

        assert_eq!(index.get(&1).map(|k| *k), Some(1));
        assert_eq!(keys(&index), vec![2, 1]);
        assert!(index.get(&7).is_none());
    }

    #[test]
    fn test_pop_lru() {
        let mut index = LruIndex::new();
        index.insert(Arc::new(1));
        index.insert(Arc::new(2));
        index.get(&1);

        assert_eq!(index.pop_lru().unwrap().map(|k| *k), Some(2));
        assert_eq!(index.pop_lru().unwrap().map(|k| *k), Some(1));
        assert!(index.pop_lru().unwrap().is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_release_removes_orphans() {
        let mut index = LruIndex::new();
        index.insert(Arc::new(1));
        index.acquire(&1);
        index.acquire(&1);

        assert!(index.release(&1).is_none());
        assert_eq!(index.holders(&1), Some(1));
        assert_eq!(index.release(&1).map(|k| *k), Some(1));
        assert!(index.holders(&1).is_none());
    }

    #[test]
    fn test_slots_are_reused() {
        let mut index = LruIndex::new();
        index.insert(Arc::new(1));
        index.insert(Arc::new(2));
        index.remove(&1);
        index.insert(Arc::new(3));

        assert_eq!(index.nodes.len(), 2);
        assert_eq!(keys(&index), vec![2, 3]);
    }

    #[derive(Debug)]
    struct Shifty(Arc<AtomicU64>);

    impl PartialEq for Shifty {
        fn eq(&self, other: &Self) -> bool {
            self.0.load(Ordering::Relaxed) == other.0.load(Ordering::Relaxed)
        }
    }

    impl Eq for Shifty {}

    impl Hash for Shifty {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.0.load(Ordering::Relaxed).hash(state);
        }
    }

    #[test]
    fn test_pop_lru_detects_identity_change() {
        let value = Arc::new(AtomicU64::new(1));
        let mut index = LruIndex::new();
        index.insert(Arc::new(Shifty(Arc::clone(&value))));

        value.store(2, Ordering::Relaxed);

        assert!(index.pop_lru().is_err());
        assert_eq!(index.len(), 1);
    }
}
