use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use querycache::{AlwaysCache, CacheConfig, LruQueryCache};
use segindex::{BooleanQuery, DocSet, IndexReader, IndexSearcher, Query, SegmentBuilder, SegmentContext};

const COLORS: [&str; 4] = ["red", "blue", "green", "yellow"];

fn build_reader(segments: usize, docs_per_segment: usize) -> Arc<IndexReader> {
    let cores = (0..segments)
        .map(|_| {
            let mut builder = SegmentBuilder::new();
            for d in 0..docs_per_segment {
                let size = if d % 3 == 0 { "s" } else { "m" };
                builder.add_document([("color", COLORS[d % COLORS.len()]), ("size", size)]);
            }
            builder.build()
        })
        .collect();
    Arc::new(IndexReader::open(cores).unwrap())
}

fn bench_cached_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached_get");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_hit", |b| {
        let reader = build_reader(1, 1_000);
        let ctx = reader.leaves().remove(0);
        let cache = LruQueryCache::new(CacheConfig::default(), AlwaysCache).unwrap();
        let queries: Vec<Query> = (0..100).map(|i| Query::term("id", i.to_string())).collect();

        // Pre-populate
        for query in &queries {
            cache
                .put_if_absent(query, &ctx, Arc::new(DocSet::from_sorted(vec![1, 2, 3])))
                .unwrap();
        }

        let mut counter = 0;
        b.iter(|| {
            black_box(cache.get(&queries[counter % 100], &ctx));
            counter += 1;
        });
    });

    group.finish();
}

fn bench_eviction_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("insert_evict_small_cache", |b| {
        let reader = build_reader(1, 1_000);
        let ctx = SegmentContext::standalone(reader.segments()[0].clone());
        let cache = LruQueryCache::new(CacheConfig::new(10, usize::MAX), AlwaysCache).unwrap();
        let set = Arc::new(DocSet::from_sorted((0..64).collect()));

        let mut counter = 0u64;
        b.iter(|| {
            let query = Query::term("id", counter.to_string());
            black_box(cache.put_if_absent(&query, &ctx, Arc::clone(&set)).unwrap());
            counter += 1;
        });
    });

    group.finish();
}

fn bench_searcher(c: &mut Criterion) {
    let mut group = c.benchmark_group("searcher");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    let reader = build_reader(8, 10_000);
    let conjunction = BooleanQuery::builder()
        .must(Query::term("color", "red"))
        .filter(Query::term("size", "s"))
        .build();

    let plain = IndexSearcher::new(Arc::clone(&reader));
    group.bench_function("conjunction_uncached", |b| {
        b.iter(|| black_box(plain.count(&conjunction).unwrap()));
    });

    let cache = LruQueryCache::new(CacheConfig::default(), AlwaysCache).unwrap();
    let cached = IndexSearcher::new(reader).with_query_cache(Arc::new(cache));
    group.bench_function("conjunction_cached", |b| {
        b.iter(|| black_box(cached.count(&conjunction).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_cached_get, bench_eviction_churn, bench_searcher);
criterion_main!(benches);
