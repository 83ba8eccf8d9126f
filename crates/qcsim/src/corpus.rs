//! Synthetic documents and queries

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use segindex::{BooleanQuery, Query, Segment, SegmentBuilder};

const COLORS: [&str; 6] = ["red", "blue", "green", "yellow", "black", "white"];
const SIZES: [&str; 4] = ["xs", "s", "m", "l"];
const BRANDS: u32 = 20;

fn pick<'a>(rng: &mut StdRng, values: &[&'a str]) -> &'a str {
    values[rng.gen_range(0..values.len())]
}

fn brand(rng: &mut StdRng) -> String {
    format!("b{}", rng.gen_range(0..BRANDS))
}

/// Segment of `docs` random products
pub fn build_segment(rng: &mut StdRng, docs: u32) -> Arc<Segment> {
    let mut builder = SegmentBuilder::new();
    for _ in 0..docs {
        let color = pick(rng, &COLORS);
        let size = pick(rng, &SIZES);
        let brand = brand(rng);
        builder.add_document([("color", color), ("size", size), ("brand", brand.as_str())]);
    }
    builder.build()
}

/// A query from a small vocabulary, so that searches repeat
pub fn random_query(rng: &mut StdRng) -> Query {
    let color = Query::term("color", pick(rng, &COLORS));
    match rng.gen_range(0..6) {
        0 => color,
        1 => Query::term("brand", brand(rng)),
        2 => Query::boost(color, rng.gen_range(1..5) as f32),
        3 => BooleanQuery::builder()
            .must(color)
            .filter(Query::term("size", pick(rng, &SIZES)))
            .build(),
        4 => BooleanQuery::builder()
            .should(Query::term("brand", brand(rng)))
            .should(Query::term("brand", brand(rng)))
            .build(),
        _ => BooleanQuery::builder()
            .must(color)
            .must_not(Query::term("size", pick(rng, &SIZES)))
            .build(),
    }
}
