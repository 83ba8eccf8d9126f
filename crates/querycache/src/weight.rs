//! Searcher integration
//!
//! [`CachingWeight`] serves a weight's per-segment matches from an
//! [`LruQueryCache`]. On an admitted miss it materializes the complete match
//! set with the wrapped weight's bulk scorer; on a declined miss it forwards
//! unchanged so partial consumption stays cheap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use segindex::{
    BulkScorer, DefaultBulkScorer, DocIdIterator, DocSet, DocSetBuilder, DocSetIterator, Query,
    QueryCache, SegmentContext, Weight,
};

use crate::cache::LruQueryCache;
use crate::key::normalize;

/// Weight decorator reading and populating the query cache
pub struct CachingWeight {
    inner: Box<dyn Weight>,
    cache: LruQueryCache<Query>,
    used: AtomicBool,
}

impl CachingWeight {
    /// Decorate `inner` with `cache`
    pub fn new(inner: Box<dyn Weight>, cache: LruQueryCache<Query>) -> Self {
        Self {
            inner,
            cache,
            used: AtomicBool::new(false),
        }
    }

    /// Cached set for `ctx`, computing it on an admitted miss
    ///
    /// `None` means the policy declined and the caller should evaluate
    /// through the wrapped weight.
    fn cached_set(&self, ctx: &SegmentContext) -> segindex::Result<Option<Arc<DocSet>>> {
        let query = normalize(self.inner.query());
        let cached = self.cache.get(query, ctx);
        if !self.used.swap(true, Ordering::Relaxed) {
            self.cache.policy().on_use(query);
        }
        if cached.is_some() {
            return Ok(cached);
        }
        if !self.cache.policy().should_cache(query, ctx) {
            return Ok(None);
        }

        let set = Arc::new(self.materialize(ctx)?);
        self.cache.put_if_absent(query, ctx, Arc::clone(&set))?;
        Ok(Some(set))
    }

    fn materialize(&self, ctx: &SegmentContext) -> segindex::Result<DocSet> {
        let Some(mut scorer) = self.inner.bulk_scorer(ctx)? else {
            return Ok(DocSet::Empty);
        };
        let mut builder = DocSetBuilder::new(ctx.max_doc(), scorer.cost());
        scorer.score_all(&mut |doc| builder.add(doc));
        Ok(builder.build())
    }
}

impl Weight for CachingWeight {
    fn query(&self) -> &Query {
        self.inner.query()
    }

    fn scorer(&self, ctx: &SegmentContext) -> segindex::Result<Option<Box<dyn DocIdIterator>>> {
        match self.cached_set(ctx)? {
            Some(set) if set.is_empty() => Ok(None),
            Some(set) => Ok(Some(Box::new(DocSetIterator::new(set)))),
            None => self.inner.scorer(ctx),
        }
    }

    fn bulk_scorer(&self, ctx: &SegmentContext) -> segindex::Result<Option<Box<dyn BulkScorer>>> {
        match self.cached_set(ctx)? {
            Some(set) if set.is_empty() => Ok(None),
            Some(set) => Ok(Some(Box::new(DefaultBulkScorer::new(Box::new(
                DocSetIterator::new(set),
            ))))),
            None => self.inner.bulk_scorer(ctx),
        }
    }
}

impl QueryCache for LruQueryCache<Query> {
    fn do_cache(&self, weight: Box<dyn Weight>) -> Box<dyn Weight> {
        Box::new(CachingWeight::new(weight, self.clone()))
    }
}
