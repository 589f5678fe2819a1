use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "tokentop", about = "Token usage metrics cache for the terminal dashboard", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file (default: tokentop.toml in the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the cache directory for this run
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Override the transcript projects directory for this run
    #[arg(long, global = true)]
    pub projects_dir: Option<PathBuf>,

    /// Lookback window in hours (0 = everything)
    #[arg(long, global = true)]
    pub lookback_hours: Option<u64>,

    /// Debug logging to stderr
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Collect on every tick and print a one-line summary (default)
    Watch {
        /// Seconds between ticks
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Run one collection cycle and print the snapshot as JSON
    Collect {
        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Also print store row counts to stderr
        #[arg(long)]
        stats: bool,
    },
    /// Ingest, then compact files idle longer than the quiet period
    Compact {
        /// Quiet period in seconds (default from config)
        #[arg(long)]
        quiet_period_secs: Option<u64>,
    },
    /// Delete every cached row; the next cycle re-ingests from scratch
    Reset,
}
