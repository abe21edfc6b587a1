//! nextgsim gNB scheduler host
//!
//! Runs the cell schedulers of a gNB against a loopback PHY:
//! - CLI argument parsing
//! - Configuration loading and validation
//! - Task spawning and lifecycle management
//! - Graceful shutdown on completion or Ctrl+C
//!
//! # Usage
//!
//! ```bash
//! nr-gnb-sched -c config/gnb-sched.yaml --slots 20000
//! ```

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use nextgsim_common::config::GnbConfig;
use nextgsim_common::{init_logging_from_config, LogLevel};
use nextgsim_gnb::{load_and_validate_gnb_config, validate_gnb_config, GnbApp, MetricsSummary};

/// nextgsim gNB - slot scheduler with loopback PHY
#[derive(Parser, Debug)]
#[command(name = "nr-gnb-sched")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the gNB configuration file (YAML); built-in defaults when absent
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config_file: Option<String>,

    /// Number of slots to run (0 runs until Ctrl+C)
    #[arg(short = 's', long = "slots")]
    slots: Option<u64>,

    /// Seed of the loopback PHY
    #[arg(long = "seed")]
    seed: Option<u64>,

    /// Pace slots at wall-clock slot duration
    #[arg(long = "real-time")]
    real_time: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level")]
    log_level: Option<LogLevel>,
}

/// Loads the configuration and applies the command line overrides.
fn load_config(args: &Args) -> Result<GnbConfig> {
    let mut config = match &args.config_file {
        Some(path) => load_and_validate_gnb_config(path)
            .with_context(|| format!("Failed to load configuration from {path}"))?,
        None => GnbConfig::default(),
    };
    if let Some(slots) = args.slots {
        config.simulation.total_slots = slots;
    }
    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
    }
    if args.real_time {
        config.simulation.real_time = true;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    validate_gnb_config(&config).context("Invalid configuration")?;
    Ok(config)
}

fn log_config(config: &GnbConfig) {
    for (i, cell) in config.cells.iter().enumerate() {
        info!(
            "Cell {}: PCI={}, {} MHz at {}, {}",
            i,
            cell.pci,
            cell.bandwidth_mhz,
            cell.scs,
            if cell.tdd.is_some() { "TDD" } else { "FDD" }
        );
    }
    info!(
        "Scheduler: policy={:?}, ring={} slots",
        config.scheduler.policy, config.scheduler.ring_size
    );
    info!(
        "Simulation: slots={}, real_time={}, seed={}, max_ues={}",
        config.simulation.total_slots, config.simulation.real_time, config.simulation.seed, config.simulation.max_ues
    );
}

fn print_summary(summary: &MetricsSummary) {
    for (cell, totals) in &summary.cells {
        println!(
            "cell {cell}: slots={} ues={} dl_tx={} dl_retx={} ul_tx={} ul_retx={} dl_bytes={} ul_bytes={} rars={} harq_failures={}",
            totals.nof_slots,
            totals.nof_ues,
            totals.nof_dl_new_txs,
            totals.nof_dl_retxs,
            totals.nof_ul_new_txs,
            totals.nof_ul_retxs,
            totals.dl_bytes,
            totals.ul_bytes,
            totals.nof_rars,
            totals.nof_harq_failures,
        );
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("nr-gnb-sched: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging_from_config(&config.logging) {
        eprintln!("nr-gnb-sched: {e}");
        return ExitCode::FAILURE;
    }

    // Print banner
    println!("nextgsim gNB - Slot Scheduler");
    println!("=============================");

    match run_gnb(config).await {
        Ok(()) => {
            info!("gNB exited successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("gNB failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Main gNB execution logic
async fn run_gnb(config: GnbConfig) -> Result<()> {
    log_config(&config);
    let mut app = GnbApp::start(config).context("Failed to start gNB")?;

    info!("gNB started");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = app.run_until_done() => {
            info!("Run complete");
        }
    }

    match app.shutdown().await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            // Still exit cleanly, the run itself completed.
            warn!("Some tasks failed during shutdown: {}", e);
            Ok(())
        }
    }
}
