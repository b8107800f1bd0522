//! Sector allocator diagnostics
//!
//! # Examples
//!
//! ```bash
//! # Run a mixed workload on 4 threads and print per-sector statistics
//! sectorctl stress --threads 4 --operations 100000
//!
//! # Show the effective configuration
//! sectorctl --config sectoralloc.toml config
//!
//! # Print Prometheus metrics after a short workload
//! sectorctl metrics
//! ```

use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sectoralloc::memory::{MemoryManager, SectorMemoryManager};
use sectoralloc::sector::BLOB_SIZE;
use sectoralloc::MemoryManagerConfig;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Sector slab allocator diagnostics
#[derive(Parser, Debug)]
#[command(name = "sectorctl")]
#[command(version = sectoralloc::VERSION)]
#[command(about = "Sector slab allocator diagnostics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "SECTORALLOC_CONFIG")]
    config: Option<PathBuf>,

    /// Log directory path
    #[arg(long, global = true, default_value = "logs", env = "SECTORALLOC_LOG_DIR")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an allocate/free/commit workload and print statistics as JSON
    Stress(StressArgs),

    /// Print the effective configuration as TOML
    Config,

    /// Run a short workload and print Prometheus metrics
    Metrics,

    /// Show version
    Version,
}

#[derive(Args, Debug)]
struct StressArgs {
    /// Worker threads, each with its own allocation context
    #[arg(short, long, default_value = "4")]
    threads: usize,

    /// Operations per thread
    #[arg(short, long, default_value = "10000")]
    operations: usize,

    /// Largest allocation in bytes
    #[arg(long, default_value_t = BLOB_SIZE)]
    max_size: usize,

    /// Commit every N operations per thread (0 disables)
    #[arg(long, default_value = "1000")]
    commit_every: usize,

    /// Keep freed slots reserved for the whole run
    #[arg(long)]
    preserve_session: bool,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    match cli.command {
        Commands::Stress(ref args) => stress_command(load_config(&cli)?, args),
        Commands::Config => {
            print!("{}", load_config(&cli)?.to_toml()?);
            Ok(())
        }
        Commands::Metrics => metrics_command(load_config(&cli)?),
        Commands::Version => {
            println!("sectorctl {}", sectoralloc::VERSION);
            Ok(())
        }
    }
}

/// Setup logging with rolling files and console output
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &cli.log_dir, "sectorctl.log");

    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::WARN);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color)
                .pretty(),
        )
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<MemoryManagerConfig> {
    Ok(MemoryManagerConfig::load(cli.config.as_deref())?)
}

#[derive(Debug, Default)]
struct WorkerReport {
    allocations: u64,
    frees: u64,
    exhausted: u64,
    corrupted: u64,
}

fn stress_worker(
    mm: &SectorMemoryManager,
    worker: usize,
    args: &StressArgs,
) -> anyhow::Result<WorkerReport> {
    let context = mm.create_allocation_context()?;
    // seeded per worker so runs are reproducible
    let mut rng = StdRng::seed_from_u64(args.seed ^ ((worker as u64 + 1) << 32));
    let mut held: Vec<(i64, u8)> = Vec::new();
    let mut report = WorkerReport::default();
    let max_size = args.max_size.clamp(1, BLOB_SIZE);

    for op in 0..args.operations {
        if held.is_empty() || rng.gen_ratio(2, 3) {
            let size = rng.gen_range(1..=max_size);
            let fill = rng.gen::<u8>();
            match context.allocate_bytes(&vec![fill; size], false) {
                Ok(addr) => {
                    held.push((addr, fill));
                    report.allocations += 1;
                }
                Err(e) if e.is_retryable() => report.exhausted += 1,
                Err(e) => return Err(e.into()),
            }
        } else {
            let victim = rng.gen_range(0..held.len());
            let (addr, fill) = held.swap_remove(victim);
            if context.read(addr)?.iter().any(|&b| b != fill) {
                report.corrupted += 1;
            }
            context.free(addr)?;
            report.frees += 1;
        }

        if args.commit_every > 0 && op % args.commit_every == args.commit_every - 1 {
            mm.commit();
        }
    }

    context.detach()?;
    Ok(report)
}

fn stress_command(config: MemoryManagerConfig, args: &StressArgs) -> anyhow::Result<()> {
    let mm = SectorMemoryManager::with_heap_pool(config)?;
    if args.preserve_session {
        mm.preserve_session();
    }

    info!(threads = args.threads, operations = args.operations, "Starting stress run");
    let started = Instant::now();

    // Plain threads: commit may fan out on the rayon pool while holding the manager lock
    let reports = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..args.threads.max(1))
            .map(|worker| {
                let mm = &mm;
                scope.spawn(move || stress_worker(mm, worker, args))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .map_err(|_| anyhow::anyhow!("Stress worker panicked"))?
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })?;

    if args.preserve_session {
        mm.release_session();
    }

    let elapsed = started.elapsed();
    let total = reports.iter().fold(WorkerReport::default(), |acc, r| WorkerReport {
        allocations: acc.allocations + r.allocations,
        frees: acc.frees + r.frees,
        exhausted: acc.exhausted + r.exhausted,
        corrupted: acc.corrupted + r.corrupted,
    });
    if total.corrupted > 0 {
        warn!(corrupted = total.corrupted, "Payload mismatches detected");
    }

    let summary = serde_json::json!({
        "elapsed_ms": elapsed.as_millis() as u64,
        "allocations": total.allocations,
        "frees": total.frees,
        "exhausted": total.exhausted,
        "corrupted": total.corrupted,
        "manager": mm.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if total.corrupted > 0 {
        anyhow::bail!("{} allocations read back corrupted", total.corrupted);
    }
    Ok(())
}

fn metrics_command(config: MemoryManagerConfig) -> anyhow::Result<()> {
    let mm = SectorMemoryManager::with_heap_pool(config)?;

    let addrs = (1..=64)
        .map(|i| mm.allocate(i * 64, false))
        .collect::<Result<Vec<_>, _>>()?;
    mm.commit();
    for addr in addrs.iter().step_by(2) {
        mm.free(*addr)?;
    }

    print!("{}", sectoralloc::metrics::export_metrics());
    Ok(())
}
