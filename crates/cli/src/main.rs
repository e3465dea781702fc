//! drehscheibe — demonstration runner for the dispatch library.
//!
//! Generates a synthetic workload (or reads one line per item from a file),
//! hashes every item on the pool, and prints a JSON run summary. Useful for
//! smoke-testing shard specs and failure isolation from the command line:
//!
//! ```text
//! drehscheibe --count 10000 --num-workers 8 --split 1/2 --fail-every 100
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use drehscheibe_dispatch::{
    DispatchConfig, Dispatcher, IterSource, ProgressReporter, TaskError, TaskPool,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Drive a demonstration workload through the dispatch loop.
#[derive(Parser, Debug)]
#[command(name = "drehscheibe", version, about)]
struct Cli {
    /// Worker pool size.
    #[arg(long, env = "DISPATCH_NUM_WORKERS", default_value_t = 4)]
    num_workers: usize,

    /// Number of synthetic items to generate (ignored with --input).
    #[arg(long, default_value_t = 1000)]
    count: usize,

    /// Input file, processed one line per item, instead of synthetic items.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Shard spec "idx/total" restricting this run to one partition.
    #[arg(long, env = "DISPATCH_SPLIT")]
    split: Option<String>,

    /// File receiving one appended line per failed item.
    #[arg(long)]
    error_path: Option<PathBuf>,

    /// Fail every n-th item, to demonstrate failure isolation.
    #[arg(long)]
    fail_every: Option<usize>,

    /// Run a one-shot initialization task per pool slot first.
    #[arg(long, default_value_t = false)]
    with_init: bool,
}

// ── Progress ────────────────────────────────────────────────────────

/// Counts completions so the summary can report them after the run.
#[derive(Default)]
struct CountingProgress {
    done: Arc<AtomicUsize>,
}

impl ProgressReporter for CountingProgress {
    fn begin(&mut self, total: Option<usize>) {
        match total {
            Some(total) => info!(total, "Processing data"),
            None => info!("Processing data"),
        }
    }

    fn tick(&mut self) {
        self.done.fetch_add(1, Ordering::Relaxed);
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let items: Vec<String> = match &cli.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {}", path.display()))?
            .lines()
            .map(str::to_string)
            .collect(),
        None => (0..cli.count).map(|i| format!("item-{i}")).collect(),
    };
    info!(items = items.len(), num_workers = cli.num_workers, "workload ready");

    let mut config = DispatchConfig::new(cli.num_workers).with_data_count(items.len());
    if let Some(split) = &cli.split {
        config = config.with_split(split.clone());
    }
    if let Some(path) = &cli.error_path {
        config = config.with_error_path(path.clone());
    }

    let done = Arc::new(AtomicUsize::new(0));
    let progress = CountingProgress {
        done: Arc::clone(&done),
    };

    let fail_every = cli.fail_every.unwrap_or(0);
    let mut builder = Dispatcher::builder(config)
        .process(move |slot, (index, line): (usize, String)| {
            if fail_every != 0 && (index + 1) % fail_every == 0 {
                return Err(TaskError::new(format!("injected failure at item {index}")));
            }
            let digest = Sha256::digest(line.as_bytes());
            debug!(worker = %slot.id, index, digest = %format!("{digest:x}"), "hashed");
            Ok(())
        })
        .progress(progress);

    if cli.with_init {
        builder = builder.init(|worker| {
            info!(worker = %worker, "worker initialized");
            Ok(())
        });
    }

    let mut dispatcher = builder.build().context("invalid dispatch configuration")?;
    let mut pool = TaskPool::new(cli.num_workers);

    let source = IterSource::new(items.into_iter().enumerate());
    dispatcher
        .run(source, &mut pool)
        .await
        .context("dispatch run failed")?;
    pool.shutdown().await;

    let summary = serde_json::json!({
        "processed": done.load(Ordering::Relaxed),
        "failed": dispatcher.sink().len(),
    });
    println!("{summary}");
    Ok(())
}
