//! Chunk pool demo - drives the pool the way a caller would

#![deny(clippy::all)]

mod config;
mod scenarios;

use anyhow::{Context, Result, bail};
use chunk_pool::PolicyKind;
use clap::{Parser, Subcommand};
use config::DemoConfig;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chunk-pool-demo")]
#[command(about = "Fixed-chunk memory pool demo driver")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Single-threaded walkthrough: allocate, write, free, reuse
    Basic {
        #[arg(long)]
        chunks: Option<usize>,
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Drain a shared pool from several consumer threads
    Drain {
        /// lock-free or lock-based
        #[arg(long)]
        policy: Option<PolicyKind>,
        #[arg(long)]
        threads: Option<usize>,
        /// Chunks per consumer; the pool is sized threads x per-thread
        #[arg(long, conflicts_with = "chunks")]
        per_thread: Option<usize>,
        #[arg(long)]
        chunks: Option<usize>,
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = DemoConfig::load(cli.config.as_deref())?;

    init_tracing(&config.log_level);

    match cli.command {
        Commands::Basic { chunks, chunk_size } => {
            config.pool.policy = PolicyKind::None;
            config.override_pool(chunks, chunk_size);
            config.pool.validate()?;

            scenarios::run_basic(&config.pool)?;
        }
        Commands::Drain {
            policy,
            threads,
            per_thread,
            chunks,
            chunk_size,
            json,
        } => {
            config.pool.policy = match policy {
                Some(policy) => policy,
                // Sharing needs a thread-safe policy; fall back to the mutex
                None if !config.pool.policy.is_thread_safe() => PolicyKind::LockBased,
                None => config.pool.policy,
            };
            config.override_pool(chunks, chunk_size);
            if let Some(threads) = threads {
                config.threads = threads;
            }
            if let Some(per_thread) = per_thread {
                config.pool.chunk_count = config
                    .threads
                    .checked_mul(per_thread)
                    .context("Pool size overflows")?;
            }
            config.pool.validate()?;

            let report = scenarios::run_drain(&config.pool, config.threads)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }

            if !report.is_consistent() {
                error!(?report, "Consumers saw inconsistent chunks");
                bail!("Drain check failed");
            }
            info!(
                policy = %report.policy,
                handed_out = report.handed_out,
                in_use = report.stats.in_use,
                "Every consumer got distinct chunks"
            );
        }
    }

    Ok(())
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();
}
