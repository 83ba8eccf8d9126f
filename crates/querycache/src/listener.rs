//! Fine-grained cache event hooks
//!
//! Listeners run while the cache lock is held, so they must be cheap and must
//! never call back into the cache.

use segindex::SegmentId;

/// Receives cache events; every method defaults to a no-op
pub trait CacheListener<Q>: Send + Sync {
    /// A lookup found an entry
    fn on_hit(&self, _segment: SegmentId, _query: &Q) {}

    /// A lookup found no entry
    fn on_miss(&self, _segment: SegmentId, _query: &Q) {}

    /// `query` entered the recency index, costing `ram_bytes`
    fn on_query_cache(&self, _query: &Q, _ram_bytes: usize) {}

    /// `query` left the recency index, releasing `ram_bytes`
    fn on_query_eviction(&self, _query: &Q, _ram_bytes: usize) {}

    /// One entry was stored for `segment`
    fn on_doc_set_cache(&self, _segment: SegmentId, _ram_bytes: usize) {}

    /// `num_entries` (never zero) entries of `segment` were removed
    fn on_doc_set_eviction(&self, _segment: SegmentId, _num_entries: usize, _sum_ram_bytes: usize) {}

    /// Every entry was dropped by [`clear_all`](crate::LruQueryCache::clear_all)
    fn on_clear(&self) {}
}
