//! # segindex
//!
//! Minimal in-memory segmented index used as the evaluation backend of the
//! query cache.
//!
//! ## Architecture
//! - **Segments**: immutable postings (`term -> sorted doc ids`) with a
//!   stable [`SegmentId`] and an explicit close notification
//! - **Readers**: ref-counted views over shared segment cores
//! - **Evaluation**: [`Weight`]s produce per-segment [`DocIdIterator`]s
//!   (possibly consumed partially) or [`BulkScorer`]s (always exhaustive)
//! - **Doc sets**: dense or sparse [`DocSet`]s with a RAM estimate

#![warn(missing_docs)]

mod docset;
mod error;
mod query;
mod searcher;
mod segment;
mod weight;

pub use docset::{DocSet, DocSetBuilder, DocSetIterator};
pub use error::{Error, Result};
pub use query::{BooleanQuery, BooleanQueryBuilder, BoostQuery, Occur, Query, Term};
pub use searcher::{IndexSearcher, QueryCache};
pub use segment::{
    CloseListener, IndexReader, ListenerId, Segment, SegmentBuilder, SegmentContext, SegmentId,
};
pub use weight::{
    AllDocsIterator, BulkScorer, ConjunctionIterator, DefaultBulkScorer, DisjunctionIterator,
    DocIdIterator, ExclusionIterator, PostingsIterator, Weight,
};
