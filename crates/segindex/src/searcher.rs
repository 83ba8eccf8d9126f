//! Query execution over a reader view

use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::query::Query;
use crate::weight::{BooleanWeight, MatchAllWeight, TermWeight, Weight};
use crate::segment::IndexReader;

/// Hook letting a cache decorate the weights a searcher creates
pub trait QueryCache: Send + Sync {
    /// Wrap `weight` so that its per-segment matches may be served from,
    /// or stored into, the cache
    fn do_cache(&self, weight: Box<dyn Weight>) -> Box<dyn Weight>;
}

/// Executes queries against an [`IndexReader`]
pub struct IndexSearcher {
    reader: Arc<IndexReader>,
    cache: Option<Arc<dyn QueryCache>>,
}

impl IndexSearcher {
    /// Searcher without a query cache
    pub fn new(reader: Arc<IndexReader>) -> Self {
        Self {
            reader,
            cache: None,
        }
    }

    /// Use `cache` for every weight this searcher creates
    pub fn with_query_cache(mut self, cache: Arc<dyn QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace or remove the query cache
    pub fn set_query_cache(&mut self, cache: Option<Arc<dyn QueryCache>>) {
        self.cache = cache;
    }

    /// The reader view
    pub fn reader(&self) -> &Arc<IndexReader> {
        &self.reader
    }

    /// Prepare `query` for execution
    ///
    /// Score-only wrappers are skipped; every other node, including boolean
    /// clauses, goes through the query cache hook if one is set.
    pub fn create_weight(&self, query: &Query) -> Box<dyn Weight> {
        let weight: Box<dyn Weight> = match query {
            Query::MatchAll => Box::new(MatchAllWeight::new()),
            Query::Term(term) => Box::new(TermWeight::new(term.clone())),
            Query::Bool(bool_query) => {
                Box::new(BooleanWeight::new(bool_query, |clause| self.create_weight(clause)))
            }
            Query::Boost(boost) => return self.create_weight(boost.query()),
            Query::ConstantScore(inner) => return self.create_weight(inner),
        };
        match &self.cache {
            Some(cache) => cache.do_cache(weight),
            None => weight,
        }
    }

    /// Number of matching documents, visiting every match of every segment
    pub fn count(&self, query: &Query) -> Result<usize> {
        if self.reader.is_closed() {
            return Err(Error::ReaderClosed);
        }
        let weight = self.create_weight(query);
        let mut count = 0;
        for ctx in self.reader.leaves() {
            if let Some(mut scorer) = weight.bulk_scorer(&ctx)? {
                scorer.score_all(&mut |_| count += 1);
            }
        }
        debug!(query = %query, count, "count");
        Ok(count)
    }

    /// Reader-level ids of the first `n` matches, stopping as soon as `n` are found
    pub fn first_docs(&self, query: &Query, n: usize) -> Result<Vec<u32>> {
        if self.reader.is_closed() {
            return Err(Error::ReaderClosed);
        }
        let weight = self.create_weight(query);
        let mut docs = Vec::with_capacity(n);
        for ctx in self.reader.leaves() {
            if docs.len() >= n {
                break;
            }
            if let Some(mut it) = weight.scorer(&ctx)? {
                while docs.len() < n {
                    match it.next_doc() {
                        Some(doc) => docs.push(ctx.doc_base() + doc),
                        None => break,
                    }
                }
            }
        }
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::BooleanQuery;
    use crate::segment::SegmentBuilder;
    use parking_lot::Mutex;

    fn reader() -> Arc<IndexReader> {
        let mut first = SegmentBuilder::new();
        for (color, size) in [("red", "s"), ("blue", "m"), ("red", "m")] {
            first.add_document([("color", color), ("size", size)]);
        }
        let mut second = SegmentBuilder::new();
        for (color, size) in [("green", "s"), ("red", "l")] {
            second.add_document([("color", color), ("size", size)]);
        }
        Arc::new(IndexReader::open(vec![first.build(), second.build()]).unwrap())
    }

    #[test]
    fn test_count_term() {
        let searcher = IndexSearcher::new(reader());
        assert_eq!(searcher.count(&Query::term("color", "red")).unwrap(), 3);
        assert_eq!(searcher.count(&Query::term("color", "pink")).unwrap(), 0);
        assert_eq!(searcher.count(&Query::match_all()).unwrap(), 5);
    }

    #[test]
    fn test_count_boolean() {
        let searcher = IndexSearcher::new(reader());
        let query = BooleanQuery::builder()
            .must(Query::term("color", "red"))
            .must_not(Query::term("size", "s"))
            .build();
        assert_eq!(searcher.count(&query).unwrap(), 2);

        let union = BooleanQuery::builder()
            .should(Query::term("color", "green"))
            .should(Query::term("color", "blue"))
            .build();
        assert_eq!(searcher.count(&union).unwrap(), 2);
    }

    #[test]
    fn test_boost_does_not_change_matches() {
        let searcher = IndexSearcher::new(reader());
        let red = Query::term("color", "red");
        assert_eq!(
            searcher.count(&Query::boost(red.clone(), 4.0)).unwrap(),
            searcher.count(&red).unwrap()
        );
    }

    #[test]
    fn test_first_docs_uses_doc_base() {
        let searcher = IndexSearcher::new(reader());
        assert_eq!(
            searcher.first_docs(&Query::term("color", "red"), 10).unwrap(),
            vec![0, 2, 4]
        );
        assert_eq!(
            searcher.first_docs(&Query::term("color", "red"), 1).unwrap(),
            vec![0]
        );
    }

    #[test]
    fn test_closed_reader() {
        let reader = reader();
        let searcher = IndexSearcher::new(Arc::clone(&reader));
        reader.close();
        assert!(matches!(
            searcher.count(&Query::match_all()),
            Err(Error::ReaderClosed)
        ));
    }

    struct RecordingCache {
        seen: Mutex<Vec<String>>,
    }

    impl QueryCache for RecordingCache {
        fn do_cache(&self, weight: Box<dyn Weight>) -> Box<dyn Weight> {
            self.seen.lock().push(weight.query().to_string());
            weight
        }
    }

    #[test]
    fn test_cache_hook_sees_every_clause() {
        let cache = Arc::new(RecordingCache {
            seen: Mutex::new(Vec::new()),
        });
        let searcher = IndexSearcher::new(reader()).with_query_cache(cache.clone());
        let query = BooleanQuery::builder()
            .filter(Query::boost(Query::term("color", "red"), 2.0))
            .must_not(Query::term("size", "s"))
            .build();

        searcher.count(&query).unwrap();

        assert_eq!(
            *cache.seen.lock(),
            vec!["color:red", "size:s", "(#(color:red)^2 -size:s)"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }
}
