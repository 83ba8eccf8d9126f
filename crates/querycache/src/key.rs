//! Cache keys
//!
//! A query's cache identity is the query itself with score-only wrappers
//! stripped: `(color:red)^2` and `color:red` match the same documents and
//! share one entry.

use std::fmt;
use std::hash::Hash;

use segindex::Query;

use crate::ram::QUERY_DEFAULT_RAM_BYTES_USED;

/// A query usable as a cache key
///
/// Equality and hashing must not depend on mutable state. A key whose
/// identity changes while cached is reported as
/// [`Error::KeyIdentityChanged`](crate::Error::KeyIdentityChanged) when the
/// cache tries to evict it.
pub trait CacheQuery: Hash + Eq + Clone + fmt::Display + fmt::Debug + Send + Sync + 'static {
    /// The wrapped query if this one only affects scoring
    fn score_wrapped(&self) -> Option<&Self> {
        None
    }

    /// Estimated footprint of a cached copy of this query
    fn ram_bytes_used(&self) -> usize {
        QUERY_DEFAULT_RAM_BYTES_USED
    }
}

/// Strip score-only wrappers, recursively
pub fn normalize<Q: CacheQuery>(query: &Q) -> &Q {
    let mut query = query;
    while let Some(inner) = query.score_wrapped() {
        query = inner;
    }
    query
}

impl CacheQuery for Query {
    fn score_wrapped(&self) -> Option<&Self> {
        Query::score_wrapped(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_nested_wrappers() {
        let red = Query::term("color", "red");
        let wrapped = Query::boost(Query::constant_score(Query::boost(red.clone(), 3.0)), 2.0);

        assert_eq!(normalize(&wrapped), &red);
        assert_eq!(normalize(&red), &red);
    }

    #[test]
    fn test_normalize_keeps_boolean_clauses() {
        let query = segindex::BooleanQuery::builder()
            .must(Query::boost(Query::term("color", "red"), 2.0))
            .build();

        assert_eq!(normalize(&query), &query);
    }

    #[test]
    fn test_default_ram_estimate() {
        assert_eq!(
            CacheQuery::ram_bytes_used(&Query::match_all()),
            QUERY_DEFAULT_RAM_BYTES_USED
        );
    }
}
