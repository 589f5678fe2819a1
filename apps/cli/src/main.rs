mod args;
mod config;
mod summary;

use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use clap::Parser;
use tokentop_app::{CacheConfig, Collector, UsageCache};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::args::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let load = config::load_or_create(cli.config.as_deref())?;
    if load.created {
        eprintln!("Created config at {}.", load.file.display());
    }
    let mut cache_config = load.config;
    config::apply_overrides(&mut cache_config, &cli);
    tracing::debug!(
        cache = %cache_config.db_path().display(),
        projects = %cache_config.projects_dir().display(),
        "configuration loaded"
    );

    let mut cache = UsageCache::open(cache_config.db_path(), cache_config.retry_policy());
    let outcome = match cli.command {
        None => watch(&mut cache, cache_config, None).await,
        Some(Command::Watch { interval }) => watch(&mut cache, cache_config, interval).await,
        Some(Command::Collect { pretty, stats }) => {
            collect_once(&mut cache, cache_config, pretty, stats)
        }
        Some(Command::Compact { quiet_period_secs }) => {
            compact(&mut cache, &cache_config, quiet_period_secs)
        }
        Some(Command::Reset) => reset(&mut cache),
    };
    if let Err(err) = cache.close() {
        tracing::warn!(error = %err, "closing metrics cache failed");
    }
    outcome
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("tokentop_cli=debug,tokentop_app=debug,tokentop_db=debug,ingest=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("tokentop_cli=info,tokentop_app=info,tokentop_db=info,ingest=info")
        })
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn watch(cache: &mut UsageCache, config: CacheConfig, interval: Option<u64>) -> Result<()> {
    let period = interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| config.refresh_interval());
    let mut collector = Collector::new(config);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tracing::info!(
        instance = %collector.lease().instance_id(),
        interval_secs = period.as_secs(),
        "watching"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = tokio::task::block_in_place(|| collector.collect(cache));
                println!("{}", summary::one_line(&snapshot));
            }
            signal = &mut shutdown => {
                if let Err(err) = signal {
                    tracing::warn!(error = %err, "signal handler failed");
                }
                break;
            }
        }
    }

    collector.shutdown(cache);
    Ok(())
}

fn collect_once(
    cache: &mut UsageCache,
    config: CacheConfig,
    pretty: bool,
    stats: bool,
) -> Result<()> {
    let mut collector = Collector::new(config);
    let snapshot = collector.collect(cache);
    collector.shutdown(cache);
    let output = if pretty {
        serde_json::to_string_pretty(&snapshot)
    } else {
        serde_json::to_string(&snapshot)
    }
    .context("serialize snapshot")?;
    println!("{output}");
    if stats {
        let stats = cache.stats().context("read store stats")?;
        eprintln!("{}", summary::store_stats(&stats));
    }
    Ok(())
}

fn compact(
    cache: &mut UsageCache,
    config: &CacheConfig,
    quiet_period_secs: Option<u64>,
) -> Result<()> {
    let quiet_period = quiet_period_secs
        .map(Duration::from_secs)
        .or_else(|| config.compaction_quiet_period())
        .context("compaction is disabled; pass --quiet-period-secs")?;
    let ingested = cache.ingest_projects_dir(&config.projects_dir());
    if ingested.has_failures() {
        tracing::warn!(failed = ingested.files_failed, "some files could not be ingested");
    }
    let compacted = cache
        .compact_idle_files(SystemTime::now(), quiet_period)
        .context("compact idle files")?;
    println!("compacted {compacted} files");
    Ok(())
}

fn reset(cache: &mut UsageCache) -> Result<()> {
    if let Some(reason) = cache.unavailable_reason() {
        anyhow::bail!("{reason}");
    }
    cache.reset().context("reset metrics cache")?;
    println!("metrics cache cleared: {}", cache.path().display());
    Ok(())
}
