//! Query cache simulator - concurrent searches over a refreshing index

mod corpus;
mod simulation;

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use querycache::{AlwaysCache, CacheConfig, LruQueryCache, MinSegmentSizePolicy, NeverCache};
use segindex::Query;
use tracing::info;

use crate::simulation::{Simulation, SimulationConfig};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    /// Cache every result
    Always,
    /// Never cache
    Never,
    /// Cache only on large segments
    MinSegmentSize,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of segments in the initial index
    #[arg(long, default_value_t = 8)]
    segments: usize,

    /// Documents per segment
    #[arg(long, default_value_t = 10_000)]
    docs_per_segment: u32,

    /// Concurrent search workers
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Searches run by each worker
    #[arg(short, long, default_value_t = 2_000)]
    searches: usize,

    /// Maximum number of cached queries
    #[arg(long, default_value_t = querycache::DEFAULT_MAX_SIZE)]
    max_size: usize,

    /// Cache RAM budget in MiB
    #[arg(long, default_value_t = 32)]
    max_ram_mb: usize,

    /// Admission policy
    #[arg(long, value_enum, default_value_t = Policy::Always)]
    policy: Policy,

    /// Replace the oldest segment every N milliseconds (0 disables)
    #[arg(long, default_value_t = 20)]
    refresh_ms: u64,

    /// Clear the whole cache every N milliseconds (0 disables)
    #[arg(long, default_value_t = 0)]
    clear_ms: u64,

    /// Compare every cached count with an uncached search
    #[arg(long)]
    verify: bool,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn every(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    info!("Starting query cache simulator v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Index: {} segments x {} docs",
        args.segments, args.docs_per_segment
    );
    info!("Workers: {} x {} searches", args.workers, args.searches);

    let config = CacheConfig::new(args.max_size, args.max_ram_mb.saturating_mul(1024 * 1024));
    let cache: LruQueryCache<Query> = match args.policy {
        Policy::Always => LruQueryCache::new(config, AlwaysCache)?,
        Policy::Never => LruQueryCache::new(config, NeverCache)?,
        Policy::MinSegmentSize => LruQueryCache::new(config, MinSegmentSizePolicy::default())?,
    };
    info!("Cache: {:?}, policy {:?}", config, args.policy);

    let simulation = Simulation::new(
        SimulationConfig {
            segments: args.segments,
            docs_per_segment: args.docs_per_segment,
            workers: args.workers,
            searches_per_worker: args.searches,
            refresh_every: every(args.refresh_ms),
            clear_every: every(args.clear_ms),
            verify: args.verify,
            seed: args.seed,
        },
        cache,
    )?;

    let report = simulation.run().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        info!(
            "{} searches in {} ms, {} refreshes, {} clears",
            report.searches, report.elapsed_ms, report.refreshes, report.clears
        );
        info!(
            "hits {} misses {} (ratio {:.3}), inserts {}, evictions {}",
            report.stats.hits,
            report.stats.misses,
            report.stats.hit_ratio,
            report.stats.inserts,
            report.stats.evictions
        );
        info!(
            "{} entries using {} bytes at the end of the run",
            report.stats.entry_count, report.stats.ram_bytes
        );
    }

    simulation::check(&report)
}
