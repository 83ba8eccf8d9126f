//! Caching policies
//!
//! A policy decides, on a miss, whether a query's per-segment result is
//! worth materializing and storing.

use segindex::SegmentContext;

/// Admission policy consulted on every cache miss
pub trait CachingPolicy<Q>: Send + Sync {
    /// Called once per logical use of `query`, hit or miss
    fn on_use(&self, _query: &Q) {}

    /// Whether the result of `query` on `ctx` should be stored
    fn should_cache(&self, query: &Q, ctx: &SegmentContext) -> bool;
}

/// Cache every result
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysCache;

impl<Q> CachingPolicy<Q> for AlwaysCache {
    fn should_cache(&self, _query: &Q, _ctx: &SegmentContext) -> bool {
        true
    }
}

/// Never store anything; lookups still count misses
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCache;

impl<Q> CachingPolicy<Q> for NeverCache {
    fn should_cache(&self, _query: &Q, _ctx: &SegmentContext) -> bool {
        false
    }
}

/// Cache only on segments that are large in absolute terms and relative to
/// the whole index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinSegmentSizePolicy {
    min_size: u32,
    min_size_ratio: f32,
}

impl MinSegmentSizePolicy {
    /// Segments need at least `min_size` docs and `min_size_ratio` of the index
    pub fn new(min_size: u32, min_size_ratio: f32) -> Self {
        Self {
            min_size,
            min_size_ratio,
        }
    }

    /// Absolute threshold
    pub fn min_size(&self) -> u32 {
        self.min_size
    }

    /// Relative threshold
    pub fn min_size_ratio(&self) -> f32 {
        self.min_size_ratio
    }
}

impl Default for MinSegmentSizePolicy {
    fn default() -> Self {
        Self::new(10_000, 0.03)
    }
}

impl<Q> CachingPolicy<Q> for MinSegmentSizePolicy {
    fn should_cache(&self, _query: &Q, ctx: &SegmentContext) -> bool {
        let max_doc = ctx.max_doc();
        if max_doc < self.min_size || ctx.index_max_doc() == 0 {
            return false;
        }
        let ratio = max_doc as f32 / ctx.index_max_doc() as f32;
        ratio >= self.min_size_ratio
    }
}

/// Policy backed by a closure
pub struct FnPolicy<F>(
    /// Returns whether to cache `query` on the segment
    pub F,
);

impl<Q, F> CachingPolicy<Q> for FnPolicy<F>
where
    F: Fn(&Q, &SegmentContext) -> bool + Send + Sync,
{
    fn should_cache(&self, query: &Q, ctx: &SegmentContext) -> bool {
        (self.0)(query, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segindex::{IndexReader, Query, SegmentBuilder};
    use std::sync::Arc;

    fn segment_of(docs: u32) -> Arc<segindex::Segment> {
        let mut builder = SegmentBuilder::new();
        for _ in 0..docs {
            builder.add_document([("f", "v")]);
        }
        builder.build()
    }

    #[test]
    fn test_stock_policies() {
        let ctx = SegmentContext::standalone(segment_of(3));
        let query = Query::match_all();

        assert!(AlwaysCache.should_cache(&query, &ctx));
        assert!(!NeverCache.should_cache(&query, &ctx));
    }

    #[test]
    fn test_min_segment_size_requires_both_thresholds() {
        let reader = IndexReader::open(vec![segment_of(1), segment_of(100)]).unwrap();
        let leaves = reader.leaves();
        let query = Query::match_all();

        // a one-doc segment is below the absolute threshold whatever its ratio
        let policy = MinSegmentSizePolicy::new(2, 0.0);
        assert!(!policy.should_cache(&query, &leaves[0]));
        assert!(policy.should_cache(&query, &leaves[1]));

        // large enough, but too small a share of the index
        let policy = MinSegmentSizePolicy::new(1, 0.5);
        assert!(!policy.should_cache(&query, &leaves[0]));
        assert!(policy.should_cache(&query, &leaves[1]));
    }

    #[test]
    fn test_single_doc_segment_is_not_cached() {
        let ctx = SegmentContext::standalone(segment_of(1));
        let policy = MinSegmentSizePolicy::new(2, 0.0);
        assert!(!policy.should_cache(&Query::match_all(), &ctx));
    }

    #[test]
    fn test_default_thresholds() {
        let policy = MinSegmentSizePolicy::default();
        assert_eq!(policy.min_size(), 10_000);
        assert_eq!(policy.min_size_ratio(), 0.03);
    }

    #[test]
    fn test_fn_policy() {
        let ctx = SegmentContext::standalone(segment_of(1));
        let policy = FnPolicy(|query: &Query, _: &SegmentContext| *query == Query::match_all());

        assert!(policy.should_cache(&Query::match_all(), &ctx));
        assert!(!policy.should_cache(&Query::term("f", "v"), &ctx));
    }
}
