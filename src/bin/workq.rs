//! workq CLI: run a producer/consumer session or a fixed-pool batch.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use workq::config::Config;
use workq::coordinator::{Coordinator, RunReport};
use workq::pool::{FixedPool, PoolReport};
use workq::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "workq", about = "Bounded work queue with cooperative shutdown")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run producers and consumers against one buffer, then shut down
    Run {
        /// TOML file with a [workq] table (otherwise WORKQ_* env vars)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Buffer capacity
        #[arg(long)]
        capacity: Option<usize>,
        /// Number of producers
        #[arg(long)]
        producers: Option<usize>,
        /// Number of consumers
        #[arg(long)]
        consumers: Option<usize>,
        /// Pause after each produced item
        #[arg(long)]
        produce_delay_ms: Option<u64>,
        /// Pause after each consumed item
        #[arg(long)]
        consume_delay_ms: Option<u64>,
        /// Stop after this many seconds (Ctrl-C stops earlier)
        #[arg(long)]
        duration_secs: Option<u64>,
        /// Time units get to exit on their own after stop
        #[arg(long)]
        grace_ms: Option<u64>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a batch of tasks on a fixed-size pool
    Pool {
        /// Worker threads
        #[arg(long, default_value_t = 3)]
        threads: usize,
        /// Tasks to submit
        #[arg(long, default_value_t = 5)]
        tasks: usize,
        /// Queue capacity (submission blocks when full)
        #[arg(long, default_value_t = 16)]
        queue_capacity: usize,
        /// How long each task sleeps
        #[arg(long, default_value_t = 1000)]
        task_ms: u64,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            capacity,
            producers,
            consumers,
            produce_delay_ms,
            consume_delay_ms,
            duration_secs,
            grace_ms,
            json,
        } => {
            let mut config = match config {
                Some(path) => Config::from_file(&path)?,
                None => Config::from_env()?,
            };
            if let Some(n) = capacity {
                config.capacity = n;
            }
            if let Some(n) = producers {
                config.producers = n;
            }
            if let Some(n) = consumers {
                config.consumers = n;
            }
            if let Some(ms) = produce_delay_ms {
                config.produce_delay_ms = ms;
            }
            if let Some(ms) = consume_delay_ms {
                config.consume_delay_ms = ms;
            }
            if let Some(secs) = duration_secs {
                config.run_secs = secs;
            }
            if let Some(ms) = grace_ms {
                config.grace_ms = ms;
            }
            config.validate()?;
            cmd_run(config, json).await
        }
        Command::Pool {
            threads,
            tasks,
            queue_capacity,
            task_ms,
            json,
        } => {
            init_telemetry(TelemetryConfig {
                log_level: Config::log_level_from_env(),
                compact: true,
            })?;
            cmd_pool(threads, tasks, queue_capacity, task_ms, json).await
        }
    }
}

async fn cmd_run(config: Config, json: bool) -> anyhow::Result<()> {
    init_telemetry(TelemetryConfig {
        log_level: config.log_level.clone(),
        compact: true,
    })?;

    let coordinator = Coordinator::start(
        config.coordinator_config(),
        |id| id.seq,
        |item| {
            info!(item = %item.id, value = item.payload, "consumed");
            Ok(())
        },
    )?;

    tokio::select! {
        _ = ctrl_c() => info!("interrupt received, stopping"),
        _ = tokio::time::sleep(config.run_for()) => info!(secs = config.run_secs, "run period over, stopping"),
    }

    let grace = config.grace();
    let report = tokio::task::spawn_blocking(move || coordinator.shutdown(grace)).await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_run_report(&report);
    }
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves,
/// so the run timer decides when to stop.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn cmd_pool(
    threads: usize,
    tasks: usize,
    queue_capacity: usize,
    task_ms: u64,
    json: bool,
) -> anyhow::Result<()> {
    let report = tokio::task::spawn_blocking(move || -> workq::Result<PoolReport> {
        let pool = FixedPool::new(threads, queue_capacity)?;
        for task in 0..tasks {
            pool.execute(move || {
                info!(task, "task started");
                std::thread::sleep(Duration::from_millis(task_ms));
                info!(task, "task complete");
            })?;
        }
        pool.shutdown()
    })
    .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Threads:    {}", report.threads);
        println!("Completed:  {}", report.completed);
        println!("Panicked:   {}", report.panicked);
        println!("Rejected:   {}", report.rejected);
    }
    Ok(())
}

fn print_run_report(report: &RunReport) {
    println!("Run:        {}", report.run_id);
    println!(
        "Window:     {} -> {}",
        report.started_at.format("%H:%M:%S"),
        report.finished_at.format("%H:%M:%S")
    );
    println!("Produced:   {}", report.produced);
    println!("Consumed:   {}", report.consumed);
    println!("Failures:   {}", report.failures);
    println!("Remaining:  {}", report.remaining);
    println!("Rejected:   {}", report.buffer.rejected);
    println!("---");
    println!("{:<12}  {:<9}  {:<6}  EXIT", "UNIT", "KIND", "ITEMS");
    for unit in &report.units {
        println!(
            "{:<12}  {:<9}  {:<6}  {}",
            unit.name, unit.kind, unit.items, unit.exit
        );
    }
}
