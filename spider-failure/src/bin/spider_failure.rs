//! Command-line runner for SPIDER transient-failure experiments.
//!
//! Defaults reproduce the reference experiment; a TOML file can replace
//! them and individual flags override both.

use std::{path::PathBuf, process, time::Duration};

use clap::Parser;
use spider_failure::{ExperimentConfig, ExperimentResult, run_batch};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(
    name = "spider-failure",
    about = "Transient node-failure experiment on the SPIDER topology"
)]
struct Args {
    /// TOML configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Time between failure decisions (seconds)
    #[arg(long)]
    failure_time: Option<f64>,

    /// Per-node failure probability per decision
    #[arg(long)]
    failure_prob: Option<f64>,

    /// Simulation stop time (seconds)
    #[arg(long)]
    stop_time: Option<f64>,

    /// Time the source spends at each location (seconds)
    #[arg(long)]
    location_time: Option<f64>,

    /// Source speed between locations (m/s)
    #[arg(long)]
    src_speed: Option<f64>,

    /// Seed of the first run
    #[arg(long)]
    seed: Option<u64>,

    /// Number of runs, with consecutive seeds
    #[arg(long, default_value_t = 1)]
    runs: u64,

    /// Throughput output file
    #[arg(long, default_value = "thr_low_failure_HWMP.txt")]
    throughput_out: PathBuf,

    /// Residual energy output file
    #[arg(long, default_value = "energy_low_failure_HWMP.txt")]
    energy_out: PathBuf,

    /// Failure log output file
    #[arg(long, default_value = "failures_low_failure_HWMP.txt")]
    failure_log_out: PathBuf,

    /// Write the report as JSON to this file
    #[arg(long)]
    json: Option<PathBuf>,
}

fn seconds(value: f64, flag: &str) -> Result<Duration, String> {
    Duration::try_from_secs_f64(value).map_err(|e| format!("--{flag} {value}: {e}"))
}

fn build_config(args: &Args) -> Result<ExperimentConfig, String> {
    let mut config = match &args.config {
        Some(path) => ExperimentConfig::from_file(path).map_err(|e| e.to_string())?,
        None => ExperimentConfig::default(),
    };

    if let Some(value) = args.failure_time {
        let period = seconds(value, "failure-time")?;
        config.failure.period = period;
        config.failure.outage = period;
    }
    if let Some(value) = args.failure_prob {
        config.failure.probability = value;
    }
    if let Some(value) = args.stop_time {
        config.stop_time = seconds(value, "stop-time")?;
    }
    if let Some(value) = args.location_time {
        config.topology.location_time = seconds(value, "location-time")?;
    }
    if let Some(value) = args.src_speed {
        config.topology.src_speed = value;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    if config.outputs.throughput.is_none() {
        config.outputs.throughput = Some(args.throughput_out.clone());
    }
    if config.outputs.energy.is_none() {
        config.outputs.energy = Some(args.energy_out.clone());
    }
    if config.outputs.failure_log.is_none() {
        config.outputs.failure_log = Some(args.failure_log_out.clone());
    }
    Ok(config)
}

fn run(args: &Args, config: &ExperimentConfig) -> ExperimentResult<bool> {
    let first = config.seed;
    let batch = run_batch(config, first..first.saturating_add(args.runs.max(1)))?;

    if let [report] = batch.runs.as_slice() {
        println!("{report}");
    }
    if args.runs > 1 {
        println!("{batch}");
    }
    for (seed, reason) in &batch.seeds_failing {
        eprintln!("seed {seed} failed: {reason}");
    }
    if let Some(path) = &args.json {
        std::fs::write(path, serde_json::to_string_pretty(&batch)?)?;
    }
    Ok(batch.seeds_failing.is_empty())
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match build_config(&args) {
        Ok(config) => config,
        Err(reason) => {
            eprintln!("{reason}");
            process::exit(2);
        }
    };

    match run(&args, &config) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            eprintln!("{err}");
            process::exit(2);
        }
    }
}
