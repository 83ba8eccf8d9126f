//! Concurrent search workload against a cached, refreshing index
//!
//! Workers search random queries through a shared [`LruQueryCache`] while a
//! refresher replaces the oldest segment and a clearer periodically empties
//! the cache. Old readers close when their last searcher drops them, which
//! closes the replaced segments and drains their cache entries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use parking_lot::RwLock;
use querycache::{CacheConfig, LruQueryCache, StatsSnapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use segindex::{IndexReader, IndexSearcher, Query, QueryCache};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::corpus;

/// Workload shape
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub segments: usize,
    pub docs_per_segment: u32,
    pub workers: usize,
    pub searches_per_worker: usize,
    pub refresh_every: Option<Duration>,
    pub clear_every: Option<Duration>,
    pub verify: bool,
    pub seed: u64,
}

/// Outcome of a run
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub cache: CacheConfig,
    pub searches: u64,
    pub matches: u64,
    pub mismatches: u64,
    pub refreshes: u64,
    pub clears: u64,
    pub elapsed_ms: u128,
    pub stats: StatsSnapshot,
    /// Entries left once the final reader closed
    pub entries_after_close: usize,
}

#[derive(Debug, Default)]
struct WorkerReport {
    searches: u64,
    matches: u64,
    mismatches: u64,
}

type SharedReader = Arc<RwLock<Arc<IndexReader>>>;

/// A configured run
pub struct Simulation {
    config: SimulationConfig,
    cache: LruQueryCache<Query>,
    reader: SharedReader,
}

impl Simulation {
    /// Build the initial index
    pub fn new(config: SimulationConfig, cache: LruQueryCache<Query>) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let segments = (0..config.segments)
            .map(|_| corpus::build_segment(&mut rng, config.docs_per_segment))
            .collect();
        let reader = IndexReader::open(segments)?;
        info!(
            "Index opened: {} segments, {} docs",
            reader.segments().len(),
            reader.max_doc()
        );
        Ok(Self {
            config,
            cache,
            reader: Arc::new(RwLock::new(Arc::new(reader))),
        })
    }

    /// Run every worker to completion, then check and drain the cache
    pub async fn run(self) -> Result<SimulationReport> {
        let started = Instant::now();
        let stop = Arc::new(AtomicBool::new(false));

        let refresher = self.config.refresh_every.map(|every| {
            tokio::spawn(refresh_loop(
                Arc::clone(&self.reader),
                every,
                Arc::clone(&stop),
                self.config.seed,
                self.config.docs_per_segment,
            ))
        });
        let clearer = self
            .config
            .clear_every
            .map(|every| tokio::spawn(clear_loop(self.cache.clone(), every, Arc::clone(&stop))));

        let mut workers = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            let reader = Arc::clone(&self.reader);
            let cache = self.cache.clone();
            let config = self.config.clone();
            workers.push(tokio::task::spawn_blocking(move || {
                run_worker(id as u64, reader, cache, &config)
            }));
        }

        let mut totals = WorkerReport::default();
        for worker in workers {
            let report = worker.await??;
            totals.searches += report.searches;
            totals.matches += report.matches;
            totals.mismatches += report.mismatches;
        }

        stop.store(true, Ordering::Release);
        let refreshes = match refresher {
            Some(handle) => handle.await??,
            None => 0,
        };
        let clears = match clearer {
            Some(handle) => handle.await?,
            None => 0,
        };

        self.cache.assert_consistent()?;
        let stats = self.cache.stats_snapshot();

        let last = Arc::clone(&*self.reader.read());
        last.close();
        let entries_after_close = self.cache.current_entry_count();
        if entries_after_close > 0 {
            warn!("{} entries survived closing every segment", entries_after_close);
        }
        self.cache.assert_consistent()?;

        Ok(SimulationReport {
            cache: *self.cache.config(),
            searches: totals.searches,
            matches: totals.matches,
            mismatches: totals.mismatches,
            refreshes,
            clears,
            elapsed_ms: started.elapsed().as_millis(),
            stats,
            entries_after_close,
        })
    }
}

fn run_worker(
    id: u64,
    reader: SharedReader,
    cache: LruQueryCache<Query>,
    config: &SimulationConfig,
) -> Result<WorkerReport> {
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(id + 1));
    let hook: Arc<dyn QueryCache> = Arc::new(cache);
    let mut report = WorkerReport::default();

    for _ in 0..config.searches_per_worker {
        let snapshot = Arc::clone(&*reader.read());
        let query = corpus::random_query(&mut rng);
        let searcher = IndexSearcher::new(Arc::clone(&snapshot)).with_query_cache(Arc::clone(&hook));
        let count = searcher.count(&query)?;

        if config.verify {
            let expected = IndexSearcher::new(snapshot).count(&query)?;
            if count != expected {
                warn!(worker = id, query = %query, count, expected, "cached count differs");
                report.mismatches += 1;
            }
        }
        report.searches += 1;
        report.matches += count as u64;
    }

    debug!(worker = id, searches = report.searches, "worker done");
    Ok(report)
}

/// Replace the oldest segment with a fresh one on every tick
async fn refresh_loop(
    reader: SharedReader,
    every: Duration,
    stop: Arc<AtomicBool>,
    seed: u64,
    docs: u32,
) -> Result<u64> {
    let mut rng = StdRng::seed_from_u64(seed.rotate_left(32));
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    let mut refreshes = 0;

    while !stop.load(Ordering::Acquire) {
        ticker.tick().await;
        let segment_seed: u64 = rng.gen();
        let added = tokio::task::spawn_blocking(move || {
            corpus::build_segment(&mut StdRng::seed_from_u64(segment_seed), docs)
        })
        .await?;

        let current = Arc::clone(&*reader.read());
        let dropped: Vec<_> = current.segments().first().map(|s| s.id()).into_iter().collect();
        let next = current.reopen(vec![added], &dropped)?;
        *reader.write() = Arc::new(next);
        refreshes += 1;
        debug!(refreshes, ?dropped, "reader refreshed");
    }

    Ok(refreshes)
}

/// Empty the cache on every tick
async fn clear_loop(cache: LruQueryCache<Query>, every: Duration, stop: Arc<AtomicBool>) -> u64 {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    let mut clears = 0;

    while !stop.load(Ordering::Acquire) {
        ticker.tick().await;
        cache.clear_all();
        clears += 1;
    }
    clears
}

/// Fail if any cached search disagreed with uncached evaluation
pub fn check(report: &SimulationReport) -> Result<()> {
    if report.mismatches > 0 {
        bail!("{} searches returned a wrong count", report.mismatches);
    }
    if report.entries_after_close > 0 {
        bail!(
            "{} cache entries outlived their segments",
            report.entries_after_close
        );
    }
    Ok(())
}
