//! slotvault command-line interface
//!
//! - Exercise a slot table against a moving GC window
//! - Save files through the local save provider
//! - Inspect the effective configuration
//!
//! # Examples
//!
//! ```bash
//! # 100k operations with an 8-slot collector window
//! slotvault simulate --ops 100000 --window 8
//!
//! # Save two files as one batch for user 1
//! slotvault save --user 1 --container slot1 progress.dat options.dat
//!
//! # Show configuration (file + SLOTVAULT_* environment)
//! slotvault config
//! ```

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slotvault::save::{LocalSetup, SavePipeline, UserDirectory, UserId};
use slotvault::slots::{GcWindow, SlotTable};
use slotvault::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// slotvault - GC-aware slot handles and batched cloud saves
#[derive(Parser, Debug)]
#[command(name = "slotvault")]
#[command(version = slotvault::VERSION)]
#[command(about = "GC-aware slot handles and batched cloud saves", long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "SLOTVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Log directory path (overrides logging.directory)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log level (overrides logging.level)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a synthetic allocate/free workload against a slot table
    Simulate(SimulateArgs),

    /// Save files as one batch through the local provider
    Save(SaveArgs),

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Number of allocate/free operations
    #[arg(long, default_value = "10000")]
    ops: usize,

    /// Size of the collector's exclusion window
    #[arg(long, default_value = "4")]
    window: usize,

    /// Initial capacity (overrides slots.initial_capacity)
    #[arg(long)]
    capacity: Option<usize>,

    /// Collector compaction interval in operations (0 = never)
    #[arg(long, default_value = "1000")]
    compact_every: usize,

    /// Random seed
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Never reuse slots
    #[arg(long)]
    unique: bool,

    /// Print statistics as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SaveArgs {
    /// Local user id
    #[arg(short, long)]
    user: u64,

    /// Target container
    #[arg(short, long)]
    container: String,

    /// Save root (overrides save.root)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Seconds to wait for all outcomes
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Files to save; each becomes a blob named after the file
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        settings.logging.level = level.clone();
    }
    if let Some(dir) = &cli.log_dir {
        settings.logging.directory = dir.clone();
    }
    if cli.no_color {
        settings.logging.ansi = false;
    }

    setup_logging(&settings)?;

    match cli.command {
        Commands::Simulate(args) => simulate_command(&settings, args),
        Commands::Save(args) => save_command(&settings, args).await,
        Commands::Config => {
            print!("{}", settings.to_toml()?);
            Ok(())
        }
    }
}

/// Setup logging with rolling files and console output
fn setup_logging(settings: &Settings) -> anyhow::Result<()> {
    let logging = &settings.logging;
    std::fs::create_dir_all(&logging.directory)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logging.directory, "slotvault.log");

    let log_level = logging
        .level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(logging.ansi)
                .pretty(),
        )
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

/// Window of `size` slots starting at `cursor`, clipped at `usize::MAX`
fn collector_window(cursor: usize, size: usize) -> GcWindow {
    GcWindow::new(cursor, cursor.saturating_add(size))
}

/// Simulate command - allocate/free while a collector window sweeps the table
fn simulate_command(settings: &Settings, args: SimulateArgs) -> anyhow::Result<()> {
    let mut slot_settings = settings.slots.clone();
    if let Some(capacity) = args.capacity {
        slot_settings.initial_capacity = capacity;
    }
    if args.unique {
        slot_settings.reuse = false;
    }

    let mut table: SlotTable<u64> = SlotTable::from_settings(&slot_settings);
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut live: Vec<(usize, u64)> = Vec::new();
    let mut cursor = 0usize;
    let mut compactions = 0usize;

    info!(ops = args.ops, window = args.window, seed = args.seed, "Starting simulation");

    for op in 0..args.ops {
        // Collector sweeps upward through the table, one slot per operation
        cursor = (cursor + 1) % table.capacity();
        let window = collector_window(cursor, args.window);

        if live.is_empty() || rng.random_bool(0.6) {
            let owner = op as u64;
            let index = table.allocate(owner, window);
            if window.contains(index) {
                bail!("slot {} handed out inside GC window {}", index, window);
            }
            if table.lookup(index) != Some(&owner) {
                bail!("slot {} does not hold its owner after allocation", index);
            }
            live.push((index, owner));
        } else {
            let (index, owner) = live.swap_remove(rng.random_range(0..live.len()));
            if table.free(index) != Some(owner) {
                bail!("slot {} lost its owner before free", index);
            }
        }

        if args.compact_every > 0 && (op + 1) % args.compact_every == 0 {
            table.purge_free_ranges();
            table.add_free_range(0, None);
            table.set_last_freed_hint(0);
            compactions += 1;
        }
    }

    if table.count() != live.len() {
        bail!("table count {} disagrees with {} live slots", table.count(), live.len());
    }

    let stats = table.stats();
    info!(?stats, compactions, "Simulation complete");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Simulation: {} operations, {} compactions", args.ops, compactions);
        println!("───────────────────────────────");
        println!("  Capacity:     {}", stats.capacity);
        println!("  Live slots:   {}", stats.count);
        println!("  Free ranges:  {} ({} slots)", stats.free_ranges, stats.free_range_slots);
        println!("  Scan hint:    {}", stats.last_freed);
        println!("  Strategy:     {:?}", stats.strategy);
    }
    Ok(())
}

/// Save command - commit files as a single batch and wait for every outcome
async fn save_command(settings: &Settings, args: SaveArgs) -> anyhow::Result<()> {
    let mut save_settings = settings.save.clone();
    if let Some(root) = args.root {
        save_settings.root = root;
    }

    let user = UserId(args.user);
    let directory = Arc::new(UserDirectory::new(
        Arc::new(LocalSetup::from_settings(&save_settings)),
        save_settings.setup_poll_interval(),
    ));
    directory.register_user(user);
    directory.set_save_data_user(Some(user));

    let (mut pipeline, mut outcomes) = SavePipeline::new(Arc::clone(&directory))?;
    pipeline.begin_batch(&args.container)?;

    let mut names = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("No usable file name in {}", path.display()))?
            .to_string();
        let id = pipeline.submit_blob(&name, &data);
        names.push((id, name));
    }

    let submitted = pipeline.end_batch()?;
    info!(submitted, container = %args.container, %user, "Batch handed to committer");

    let deadline = Duration::from_secs(args.timeout);
    let mut failed = 0usize;
    for _ in 0..submitted {
        let outcome = tokio::time::timeout(deadline, outcomes.recv())
            .await
            .context("Timed out waiting for save outcomes")?
            .context("Save outcome channel closed")?;

        let name = names
            .iter()
            .find(|(id, _)| *id == outcome.id)
            .map(|(_, name)| name.as_str())
            .unwrap_or("<unknown>");
        match outcome.result {
            Ok(()) => println!("✅ {} (#{})", name, outcome.id),
            Err(err) => {
                failed += 1;
                warn!(id = %outcome.id, blob = name, %err, "Save failed");
                println!("❌ {} (#{}): {} [code {}]", name, outcome.id, err, outcome.error_code());
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} blobs failed to save", failed, submitted);
    }
    Ok(())
}
