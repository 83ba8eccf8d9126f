//! # querycache
//!
//! Segment-aware LRU cache of query results for a segmented index.
//!
//! ## Architecture
//! - **Entries**: one [`DocSet`](segindex::DocSet) per (segment, normalized
//!   query), shared through `Arc`
//! - **Recency**: a single LRU over distinct queries; evicting a query drops
//!   its entries on every segment
//! - **Bounds**: number of distinct queries and estimated RAM
//! - **Lifecycle**: per-segment tables are dropped when the segment core
//!   closes, via a close listener that holds only a weak reference
//! - **Integration**: [`CachingWeight`] plugs the cache into an
//!   [`IndexSearcher`](segindex::IndexSearcher) through the
//!   [`QueryCache`](segindex::QueryCache) hook
//!
//! ## Example
//! ```
//! use std::sync::Arc;
//! use querycache::{CacheConfig, LruQueryCache, AlwaysCache};
//! use segindex::{IndexReader, IndexSearcher, Query, SegmentBuilder};
//!
//! let mut segment = SegmentBuilder::new();
//! segment.add_document([("color", "red")]);
//! let reader = Arc::new(IndexReader::open(vec![segment.build()]).unwrap());
//!
//! let cache = LruQueryCache::new(CacheConfig::default(), AlwaysCache).unwrap();
//! let searcher = IndexSearcher::new(reader).with_query_cache(Arc::new(cache.clone()));
//!
//! assert_eq!(searcher.count(&Query::term("color", "red")).unwrap(), 1);
//! assert_eq!(cache.current_entry_count(), 1);
//! ```

#![warn(missing_docs)]

mod builder;
mod cache;
mod config;
mod error;
mod key;
mod listener;
mod lru;
mod policy;
pub mod ram;
mod stats;
mod table;
mod weight;

pub use builder::CacheBuilder;
pub use cache::LruQueryCache;
pub use config::{CacheConfig, DEFAULT_MAX_RAM_BYTES, DEFAULT_MAX_SIZE};
pub use error::{Error, Result};
pub use key::{normalize, CacheQuery};
pub use listener::CacheListener;
pub use policy::{AlwaysCache, CachingPolicy, FnPolicy, MinSegmentSizePolicy, NeverCache};
pub use stats::{CacheStats, StatsSnapshot};
pub use weight::CachingWeight;
