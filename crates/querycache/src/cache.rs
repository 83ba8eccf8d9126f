//! Segment-aware LRU query cache
//!
//! Entries are per-segment document sets keyed by normalized query. A single
//! recency index over distinct queries drives eviction: evicting a query drops
//! its entries on every segment at once. A segment table is dropped once its
//! last entry goes or its segment core closes.

use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::Mutex;
use segindex::{DocSet, SegmentContext, SegmentId};
use tracing::{debug, warn};

use crate::builder::CacheBuilder;
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::key::{normalize, CacheQuery};
use crate::listener::CacheListener;
use crate::lru::{IdentityViolation, LruIndex};
use crate::policy::CachingPolicy;
use crate::ram;
use crate::stats::{CacheStats, StatsSnapshot};
use crate::table::SegmentTable;

struct State<Q> {
    tables: HashMap<SegmentId, SegmentTable<Q>, RandomState>,
    lru: LruIndex<Q>,
    entry_count: usize,
    ram_bytes: usize,
}

struct Inner<Q> {
    config: CacheConfig,
    policy: Box<dyn CachingPolicy<Q>>,
    listeners: Vec<Arc<dyn CacheListener<Q>>>,
    stats: CacheStats,
    state: Mutex<State<Q>>,
}

impl<Q> Inner<Q> {
    fn notify(&self, event: impl Fn(&dyn CacheListener<Q>)) {
        for listener in &self.listeners {
            event(listener.as_ref());
        }
    }
}

impl<Q> Drop for Inner<Q> {
    fn drop(&mut self) {
        for table in self.state.get_mut().tables.values() {
            table.deregister();
        }
    }
}

/// Thread-safe LRU cache of per-segment query results
///
/// Cloning is cheap: clones share the same entries.
pub struct LruQueryCache<Q> {
    inner: Arc<Inner<Q>>,
}

impl<Q> Clone for LruQueryCache<Q> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Q: CacheQuery> LruQueryCache<Q> {
    /// Create a cache with the given bounds and admission policy
    ///
    /// # Arguments
    /// * `config` - Maximum number of cached queries and RAM budget
    /// * `policy` - Decides which misses are worth storing
    ///
    /// # Returns
    /// * `Result<Self>` - The cache, or [`Error::InvalidConfig`]
    pub fn new(config: CacheConfig, policy: impl CachingPolicy<Q> + 'static) -> Result<Self> {
        Self::builder().config(config).policy(policy).build()
    }

    /// Start configuring a cache, including event listeners
    pub fn builder() -> CacheBuilder<Q> {
        CacheBuilder::new()
    }

    pub(crate) fn from_parts(
        config: CacheConfig,
        policy: Box<dyn CachingPolicy<Q>>,
        listeners: Vec<Arc<dyn CacheListener<Q>>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                policy,
                listeners,
                stats: CacheStats::new(),
                state: Mutex::new(State {
                    tables: HashMap::with_hasher(RandomState::new()),
                    lru: LruIndex::new(),
                    entry_count: 0,
                    ram_bytes: 0,
                }),
            }),
        })
    }

    /// Cache bounds
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Admission policy
    pub fn policy(&self) -> &dyn CachingPolicy<Q> {
        self.inner.policy.as_ref()
    }

    /// Serve `query` on `ctx` from the cache, computing and maybe storing it on a miss
    ///
    /// `evaluate` runs outside the cache lock and must produce the complete
    /// set of matches of `query` on the segment. Concurrent misses may both
    /// evaluate; only the first result is kept.
    ///
    /// # Returns
    /// * `Result<Arc<DocSet>>` - The matches, or the evaluation error
    pub fn get_or_compute<F>(&self, query: &Q, ctx: &SegmentContext, evaluate: F) -> Result<Arc<DocSet>>
    where
        F: FnOnce() -> segindex::Result<DocSet>,
    {
        let key = normalize(query);
        let cached = self.get(key, ctx);
        self.inner.policy.on_use(key);
        if let Some(set) = cached {
            return Ok(set);
        }

        let admit = self.inner.policy.should_cache(key, ctx);
        let set = Arc::new(evaluate()?);
        if admit {
            self.put_if_absent(key, ctx, Arc::clone(&set))?;
        }
        Ok(set)
    }

    /// Look `query` up on `ctx`, recording a hit or a miss
    ///
    /// A query cached on any segment becomes the most recently used one,
    /// even if this segment has no entry for it.
    pub fn get(&self, query: &Q, ctx: &SegmentContext) -> Option<Arc<DocSet>> {
        let key = normalize(query);
        let segment = ctx.id();
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let found = state.tables.get(&segment).and_then(|table| {
            state.lru.get(key)?;
            table.get(key).cloned()
        });

        if found.is_some() {
            self.inner.stats.record_hit();
            self.inner.notify(|l| l.on_hit(segment, key));
        } else {
            self.inner.stats.record_miss();
            self.inner.notify(|l| l.on_miss(segment, key));
        }
        found
    }

    /// Store `set` as the matches of `query` on `ctx` unless an entry exists
    ///
    /// Sets whose own cost exceeds the RAM budget, and segments that are
    /// already closed, are silently skipped. Evicts least recently used
    /// queries until both bounds hold. If eviction meets a corrupted key the
    /// new entry is taken back, leaving the cache within its bounds.
    ///
    /// # Returns
    /// * `Result<bool>` - Whether the set is cached once eviction is done, or
    ///   [`Error::KeyIdentityChanged`] if eviction met a corrupted key
    pub fn put_if_absent(&self, query: &Q, ctx: &SegmentContext, set: Arc<DocSet>) -> Result<bool> {
        let key = normalize(query);
        let segment = ctx.id();
        let cost = ram::doc_set_cost(&set);
        if cost > self.inner.config.max_ram_bytes {
            debug!(
                query = %key,
                segment = %segment,
                cost,
                max_ram_bytes = self.inner.config.max_ram_bytes,
                "set exceeds the RAM budget, not caching"
            );
            return Ok(false);
        }

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        if !state.tables.contains_key(&segment) {
            let cache = Arc::downgrade(&self.inner);
            let registered = ctx.segment().add_close_listener(Box::new(move |closed: SegmentId| {
                if let Some(inner) = cache.upgrade() {
                    LruQueryCache { inner }.clear_for_segment(closed);
                }
            }));
            let listener = match registered {
                Ok(listener) => listener,
                Err(e) => {
                    debug!(segment = %segment, error = %e, "segment closed, not caching");
                    return Ok(false);
                }
            };
            state
                .tables
                .insert(segment, SegmentTable::new(ctx.segment(), listener));
            state.ram_bytes += ram::segment_table_cost();
        }

        let singleton = match state.lru.get(key) {
            Some(singleton) => singleton,
            None => {
                let singleton = Arc::new(key.clone());
                state.lru.insert(Arc::clone(&singleton));
                let bytes = ram::query_cost(key);
                state.ram_bytes += bytes;
                self.inner.notify(|l| l.on_query_cache(key, bytes));
                singleton
            }
        };

        let stored = match state.tables.get_mut(&segment) {
            Some(table) => table.put_if_absent(Arc::clone(&singleton), set),
            None => None,
        };
        if let Some(cost) = stored {
            state.lru.acquire(&singleton);
            state.entry_count += 1;
            state.ram_bytes += cost;
            self.inner.stats.record_insert();
            self.inner.notify(|l| l.on_doc_set_cache(segment, cost));
        } else {
            self.drop_empty_tables(state);
            return Ok(false);
        }

        if let Err(e) = self.evict_if_necessary(state) {
            self.undo_insert(state, segment, &singleton);
            return Err(e);
        }
        Ok(state
            .tables
            .get(&segment)
            .is_some_and(|table| table.contains(key)))
    }

    /// Drop every entry of `query`, on all segments
    ///
    /// # Returns
    /// * `bool` - Whether anything was cached for the query
    pub fn invalidate(&self, query: &Q) -> bool {
        let key = normalize(query);
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        match state.lru.remove(key) {
            Some(singleton) => {
                self.on_key_removed(state, &singleton);
                true
            }
            None => false,
        }
    }

    /// Drop every entry and table
    ///
    /// Lifetime counters are kept; removed entries are not counted as evictions.
    pub fn clear_all(&self) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        for (_, table) in state.tables.drain() {
            table.deregister();
        }
        state.lru.clear();
        state.entry_count = 0;
        state.ram_bytes = 0;
        self.inner.notify(|l| l.on_clear());
        debug!("query cache cleared");
    }

    /// Drop every entry of one segment
    ///
    /// Runs automatically when the segment core closes. Queries left without
    /// entries on any segment leave the recency index.
    pub fn clear_for_segment(&self, segment: SegmentId) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let Some(table) = state.tables.remove(&segment) else {
            return;
        };
        table.deregister();
        state.ram_bytes -= ram::segment_table_cost();

        for key in table.keys() {
            if let Some(orphan) = state.lru.release(key) {
                let bytes = ram::query_cost(&*orphan);
                state.ram_bytes -= bytes;
                self.inner.notify(|l| l.on_query_eviction(&orphan, bytes));
            }
        }

        let entries = table.len();
        if entries > 0 {
            let bytes = table.ram_bytes();
            state.entry_count -= entries;
            state.ram_bytes -= bytes;
            self.inner.stats.record_evictions(entries);
            self.inner.notify(|l| l.on_doc_set_eviction(segment, entries, bytes));
        }
        debug!(segment = %segment, entries, "dropped segment from query cache");
    }

    /// Recompute totals from the stored entries and compare with the maintained ones
    ///
    /// # Returns
    /// * `Result<()>` - [`Error::Inconsistent`] describing the first mismatch
    pub fn assert_consistent(&self) -> Result<()> {
        let state = self.inner.state.lock();
        let config = &self.inner.config;

        if state.lru.len() > config.max_size || state.ram_bytes > config.max_ram_bytes {
            return Err(Error::Inconsistent(format!(
                "bounds exceeded: {} queries (max {}), {} bytes (max {})",
                state.lru.len(),
                config.max_size,
                state.ram_bytes,
                config.max_ram_bytes
            )));
        }

        let mut entry_count = 0;
        let mut ram_bytes = state.tables.len() * ram::segment_table_cost();
        for (segment, table) in &state.tables {
            if table.is_empty() {
                return Err(Error::Inconsistent(format!(
                    "segment {} keeps an empty table",
                    segment
                )));
            }
            let table_bytes = table.recompute_ram_bytes();
            if table_bytes != table.ram_bytes() {
                return Err(Error::Inconsistent(format!(
                    "segment {} accounts {} bytes, entries sum to {}",
                    segment,
                    table.ram_bytes(),
                    table_bytes
                )));
            }
            for key in table.keys() {
                if state.lru.peek(key).is_none() {
                    return Err(Error::Inconsistent(format!(
                        "segment {} caches {} which is missing from the recency index",
                        segment, key
                    )));
                }
            }
            entry_count += table.len();
            ram_bytes += table_bytes;
        }

        for (key, holders) in state.lru.iter() {
            let tables = state.tables.values().filter(|t| t.contains(key)).count();
            if tables == 0 || tables != holders {
                return Err(Error::Inconsistent(format!(
                    "{} is held by {} segments but tracked as held by {}",
                    key, tables, holders
                )));
            }
            ram_bytes += ram::query_cost(&**key);
        }

        if entry_count != state.entry_count {
            return Err(Error::Inconsistent(format!(
                "entry count is {} but segments hold {}",
                state.entry_count, entry_count
            )));
        }
        if ram_bytes != state.ram_bytes {
            return Err(Error::Inconsistent(format!(
                "RAM usage is {} bytes but entries sum to {}",
                state.ram_bytes, ram_bytes
            )));
        }
        Ok(())
    }

    /// Number of (segment, query) entries
    pub fn current_entry_count(&self) -> usize {
        self.inner.state.lock().entry_count
    }

    /// Estimated RAM of all entries and bookkeeping
    pub fn current_ram_bytes(&self) -> usize {
        self.inner.state.lock().ram_bytes
    }

    /// Number of segments holding at least one entry
    pub fn cached_segment_count(&self) -> usize {
        self.inner.state.lock().tables.len()
    }

    /// Number of distinct cached queries
    pub fn cached_query_count(&self) -> usize {
        self.inner.state.lock().lru.len()
    }

    /// Cached queries, least recently used first
    pub fn cached_queries(&self) -> Vec<Arc<Q>> {
        self.inner
            .state
            .lock()
            .lru
            .iter()
            .map(|(key, _)| Arc::clone(key))
            .collect()
    }

    /// Estimated cost of keeping `query` in the recency index
    pub fn ram_bytes_used_by(&self, query: &Q) -> usize {
        ram::query_cost(normalize(query))
    }

    /// Lifetime counters
    pub fn stats(&self) -> &CacheStats {
        &self.inner.stats
    }

    /// Counters and current totals
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        let (entry_count, ram_bytes) = {
            let state = self.inner.state.lock();
            (state.entry_count, state.ram_bytes)
        };
        let stats = &self.inner.stats;
        StatsSnapshot {
            hits: stats.hits(),
            misses: stats.misses(),
            inserts: stats.inserts(),
            evictions: stats.evictions(),
            hit_ratio: stats.hit_ratio(),
            entry_count,
            ram_bytes,
        }
    }

    fn requires_eviction(config: &CacheConfig, state: &State<Q>) -> bool {
        !state.lru.is_empty()
            && (state.lru.len() > config.max_size || state.ram_bytes > config.max_ram_bytes)
    }

    fn evict_if_necessary(&self, state: &mut State<Q>) -> Result<()> {
        while Self::requires_eviction(&self.inner.config, state) {
            let key = match state.lru.pop_lru() {
                Ok(Some(key)) => key,
                Ok(None) => break,
                Err(IdentityViolation(key)) => {
                    warn!(query = %key, "cached query changed identity, cannot evict");
                    return Err(Error::KeyIdentityChanged {
                        query: key.to_string(),
                    });
                }
            };
            debug!(query = %key, "evicting query");
            self.on_key_removed(state, &key);
        }
        Ok(())
    }

    /// Account for `key` having left the recency index and drop its entries
    fn on_key_removed(&self, state: &mut State<Q>, key: &Arc<Q>) {
        let bytes = ram::query_cost(&**key);
        state.ram_bytes -= bytes;
        self.inner.notify(|l| l.on_query_eviction(key, bytes));

        for (&segment, table) in state.tables.iter_mut() {
            if let Some(cost) = table.remove(key) {
                state.entry_count -= 1;
                state.ram_bytes -= cost;
                self.inner.stats.record_evictions(1);
                self.inner.notify(|l| l.on_doc_set_eviction(segment, 1, cost));
            }
        }
        self.drop_empty_tables(state);
    }

    /// Take back the entry of `key` on `segment` stored by the current insert
    fn undo_insert(&self, state: &mut State<Q>, segment: SegmentId, key: &Arc<Q>) {
        let removed = state
            .tables
            .get_mut(&segment)
            .and_then(|table| table.remove(key));
        if let Some(cost) = removed {
            state.entry_count -= 1;
            state.ram_bytes -= cost;
            self.inner.stats.record_evictions(1);
            self.inner.notify(|l| l.on_doc_set_eviction(segment, 1, cost));
            if let Some(orphan) = state.lru.release(key) {
                let bytes = ram::query_cost(&*orphan);
                state.ram_bytes -= bytes;
                self.inner.notify(|l| l.on_query_eviction(&orphan, bytes));
            }
        }
        self.drop_empty_tables(state);
    }

    /// Drop tables left without entries and stop listening for their segments
    fn drop_empty_tables(&self, state: &mut State<Q>) {
        let before = state.tables.len();
        state.tables.retain(|segment, table| {
            if !table.is_empty() {
                return true;
            }
            table.deregister();
            debug!(segment = %segment, "dropped empty segment table");
            false
        });
        state.ram_bytes -= (before - state.tables.len()) * ram::segment_table_cost();
    }
}
