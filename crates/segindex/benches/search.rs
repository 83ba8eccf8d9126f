use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use segindex::{BooleanQuery, IndexReader, IndexSearcher, Query, SegmentBuilder};

const COLORS: [&str; 4] = ["red", "blue", "green", "yellow"];

fn build_reader(segments: usize, docs_per_segment: usize) -> Arc<IndexReader> {
    let cores = (0..segments)
        .map(|s| {
            let mut builder = SegmentBuilder::new();
            for d in 0..docs_per_segment {
                let size = if (d + s) % 3 == 0 { "s" } else { "m" };
                builder.add_document([("color", COLORS[d % COLORS.len()]), ("size", size)]);
            }
            builder.build()
        })
        .collect();
    Arc::new(IndexReader::open(cores).unwrap())
}

fn bench_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("count");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    let searcher = IndexSearcher::new(build_reader(8, 10_000));
    let term = Query::term("color", "red");
    let conjunction = BooleanQuery::builder()
        .must(Query::term("color", "red"))
        .filter(Query::term("size", "s"))
        .build();

    group.bench_function("term", |b| {
        b.iter(|| black_box(searcher.count(&term).unwrap()));
    });
    group.bench_function("conjunction", |b| {
        b.iter(|| black_box(searcher.count(&conjunction).unwrap()));
    });

    group.finish();
}

fn bench_first_docs(c: &mut Criterion) {
    let mut group = c.benchmark_group("first_docs");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    let searcher = IndexSearcher::new(build_reader(8, 10_000));
    let query = Query::term("color", "blue");

    group.bench_function("first_10", |b| {
        b.iter(|| black_box(searcher.first_docs(&query, 10).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_count, bench_first_docs);
criterion_main!(benches);
