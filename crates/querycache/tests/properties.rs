use std::sync::Arc;

use proptest::prelude::*;
use querycache::{ram, AlwaysCache, CacheConfig, LruQueryCache};
use segindex::{DocSet, Query, SegmentBuilder, SegmentContext};

fn ctx(max_doc: u32) -> SegmentContext {
    let mut builder = SegmentBuilder::new();
    for _ in 0..max_doc {
        builder.add_document([("f", "v")]);
    }
    SegmentContext::standalone(builder.build())
}

fn key(i: u8) -> Query {
    Query::term("k", i.to_string())
}

/// Set size depends on the key so entries have different costs
fn set_for(i: u8) -> DocSet {
    DocSet::from_sorted((0..u32::from(i % 4) * 25).collect())
}

const SEGMENTS: usize = 12;

#[derive(Debug, Clone)]
enum Op {
    Lookup { key: u8, segment: usize },
    Invalidate(u8),
    CloseSegment(usize),
    ClearAll,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        8 => (0u8..12, 0usize..SEGMENTS).prop_map(|(key, segment)| Op::Lookup { key, segment }),
        1 => (0u8..12).prop_map(Op::Invalidate),
        1 => (0usize..SEGMENTS).prop_map(Op::CloseSegment),
        1 => Just(Op::ClearAll),
    ]
}

proptest! {
    #[test]
    fn prop_cached_keys_are_most_recently_used(
        capacity in 1usize..6,
        lookups in prop::collection::vec(0u8..10, 1..60),
    ) {
        let cache = LruQueryCache::new(CacheConfig::new(capacity, usize::MAX), AlwaysCache).unwrap();
        let ctx = ctx(100);
        let mut recency: Vec<u8> = Vec::new();

        for &i in &lookups {
            cache.get_or_compute(&key(i), &ctx, || Ok(set_for(i))).unwrap();
            recency.retain(|&k| k != i);
            recency.push(i);
        }

        let start = recency.len().saturating_sub(capacity);
        let expected: Vec<Query> = recency[start..].iter().map(|&i| key(i)).collect();
        let cached: Vec<Query> = cache.cached_queries().iter().map(|q| (**q).clone()).collect();
        prop_assert_eq!(cached, expected);
    }

    #[test]
    fn prop_bounds_and_accounting_hold(
        max_size in 1usize..8,
        entries_budget in 1usize..10,
        ops in prop::collection::vec(op(), 1..80),
    ) {
        let max_ram = ram::segment_table_cost()
            + entries_budget * (ram::query_cost(&key(0)) + ram::doc_set_cost(&set_for(3)));
        let cache = LruQueryCache::new(CacheConfig::new(max_size, max_ram), AlwaysCache).unwrap();
        let mut segments: Vec<SegmentContext> = (0..SEGMENTS).map(|_| ctx(100)).collect();

        for op in ops {
            match op {
                Op::Lookup { key: i, segment } => {
                    let set = cache
                        .get_or_compute(&key(i), &segments[segment], || Ok(set_for(i)))
                        .unwrap();
                    prop_assert_eq!(&*set, &set_for(i));
                }
                Op::Invalidate(i) => {
                    cache.invalidate(&key(i));
                    for ctx in &segments {
                        prop_assert!(cache.get(&key(i), ctx).is_none());
                    }
                }
                Op::CloseSegment(segment) => {
                    let closed = std::mem::replace(&mut segments[segment], ctx(100));
                    closed.segment().close();
                    prop_assert_eq!(closed.segment().close_listener_count(), 0);
                }
                Op::ClearAll => cache.clear_all(),
            }
            prop_assert!(cache.current_ram_bytes() <= max_ram);
            prop_assert!(cache.cached_query_count() <= max_size);
            prop_assert!(cache.assert_consistent().is_ok());
        }
    }
}

#[test]
fn shared_sets_are_not_copied() {
    let cache = LruQueryCache::new(CacheConfig::default(), AlwaysCache).unwrap();
    let ctx = ctx(10);
    let first = cache
        .get_or_compute(&key(1), &ctx, || Ok(set_for(1)))
        .unwrap();
    let second = cache
        .get_or_compute(&key(1), &ctx, || Ok(set_for(2)))
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}
