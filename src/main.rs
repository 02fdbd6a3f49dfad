//! OCR Bench - OCR engine evaluation harness
//!
//! Runs a roster of OCR engines over a categorized, labeled image dataset,
//! scores every prediction with CER / WER and merges the rows into one
//! persistent result table.

mod config;
mod dataset;
mod engines;
mod error;
mod metrics;
mod orchestrator;
mod runner;
mod shared;
mod storage;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::BenchConfig;
use crate::dataset::DatasetPlan;
use crate::engines::EngineConfig;
use crate::error::BenchError;
use crate::orchestrator::{Launcher, Orchestrator, RunReport};
use crate::runner::{InProcessLauncher, ProcessLauncher};

/// OCR Bench - compare OCR engines on labeled images
#[derive(Parser, Debug)]
#[command(name = "ocr-bench")]
#[command(about = "Benchmark OCR engines against a categorized, labeled image dataset")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate every engine in the local roster, each in its own process
    Run {
        /// Configuration file (defaults to the user config directory)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Evaluate the remote engine and merge its rows into the result table
    Remote {
        /// Configuration file (defaults to the user config directory)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print per-engine, per-category averages from the result table
    Summary {
        /// Configuration file (defaults to the user config directory)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the default configuration as TOML
    Config {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Isolated runner entry point (internal)
    #[command(hide = true)]
    Worker {
        /// Serialized engine configuration
        #[arg(long)]
        engine: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let is_worker = matches!(args.command, Commands::Worker { .. });

    // Logs always go to stderr; a worker's stdout carries only frames
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(!is_worker)
        .init();

    match args.command {
        Commands::Run { config } => {
            let config = load_or_create_config(config.as_deref())?;
            let launcher = ProcessLauncher::current_exe(&config.runner)?;
            run_roster(&config, launcher, &config.roster)?;
        }
        Commands::Remote { config } => {
            let config = load_or_create_config(config.as_deref())?;
            let roster = [EngineConfig::Remote(config.remote.clone())];
            run_roster(&config, InProcessLauncher::new(), &roster)?;
        }
        Commands::Summary { config } => {
            let config = load_or_create_config(config.as_deref())?;
            let rows = storage::load_results(&config.paths.results_file)?;
            if rows.is_empty() {
                info!("No results in {:?} yet", config.paths.results_file);
            } else {
                print!("{}", metrics::render_table(&metrics::summarize(&rows)));
            }
        }
        Commands::Config { output } => {
            let config = BenchConfig::default();
            match output {
                Some(path) => {
                    config::save_config(&config, &path)?;
                    info!("Wrote default configuration to {:?}", path);
                }
                None => print!("{}", toml::to_string_pretty(&config)?),
            }
        }
        Commands::Worker { engine } => {
            let engine: EngineConfig =
                serde_json::from_str(&engine).context("Invalid engine configuration")?;
            let code = runner::run_worker(&engine)?;
            std::process::exit(code);
        }
    }

    Ok(())
}

/// Load configuration from the given file, the user config directory, or defaults
fn load_or_create_config(explicit: Option<&Path>) -> Result<BenchConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            let config = config::load_config(&config_path)?;
            info!("Loaded configuration from {:?}", config_path);
            return Ok(config);
        }
    }

    info!("Using default configuration");
    Ok(BenchConfig::default())
}

/// Scan the dataset, run the roster and print the summary of the new rows
fn run_roster<L: Launcher>(config: &BenchConfig, launcher: L, roster: &[EngineConfig]) -> Result<RunReport> {
    let plan = DatasetPlan::prepare(&config.paths.datasets_dir, &config.categories)?;
    plan.log_summary();

    if plan.total_samples() == 0 {
        return Err(BenchError::NoSamples {
            datasets_dir: config.paths.datasets_dir.clone(),
        }
        .into());
    }

    let report = Orchestrator::new(launcher, roster, &config.paths.results_file).run(&plan)?;

    for engine in &report.engines {
        info!("  {}: {} ({} rows)", engine.engine, engine.state, engine.rows);
    }
    print!("{}", metrics::render_table(&metrics::summarize(&report.rows)));

    Ok(report)
}
