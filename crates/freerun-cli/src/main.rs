use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use freerun_core::{CivilDate, SleepRecord, export_json, records_from_json, registry};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "freerun", about = "Circadian phase estimation from sleep logs")]
struct Cli {
    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a JSON sleep log and print the analysis
    Analyze {
        /// Path to a JSON array of sleep records
        input: PathBuf,

        /// Estimator id (see `freerun algorithms`)
        #[arg(long, default_value = "regression-v1")]
        algorithm: String,

        /// Days to forecast past the last record
        #[arg(long, default_value_t = 0)]
        forecast: u32,

        /// Write the analysis here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List registered estimator ids
    Algorithms,

    /// Generate a synthetic non-24 sleep log for demos and fixtures
    Synth {
        /// Days of data to generate
        #[arg(long, default_value_t = 90)]
        days: i64,

        /// Daily drift in hours (tau - 24)
        #[arg(long, default_value_t = 0.5)]
        drift: f64,

        /// Rng seed
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Write the records here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Analyze {
            input,
            algorithm,
            forecast,
            output,
        } => cmd_analyze(input, algorithm, *forecast, output.as_deref()),
        Commands::Algorithms => cmd_algorithms(),
        Commands::Synth {
            days,
            drift,
            seed,
            output,
        } => cmd_synth(*days, *drift, *seed, output.as_deref()),
    }
}

fn cmd_analyze(input: &Path, algorithm: &str, forecast: u32, output: Option<&Path>) -> Result<()> {
    let json = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let records = records_from_json(&json)
        .with_context(|| format!("failed to parse records from {}", input.display()))?;
    tracing::info!("loaded {} records from {}", records.len(), input.display());

    let analysis = registry().analyze(algorithm, &records, forecast)?;
    tracing::info!(
        "{}: tau {:.2} h over {} days",
        analysis.algorithm,
        analysis.global_tau,
        analysis.days.len()
    );

    emit(&export_json(&analysis)?, output)
}

fn cmd_algorithms() -> Result<()> {
    for id in registry().ids() {
        println!("{id}");
    }
    Ok(())
}

fn cmd_synth(days: i64, drift: f64, seed: u64, output: Option<&Path>) -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut records: Vec<SleepRecord> = Vec::new();

    for d in 0..days {
        if rng.random::<f64>() < 0.1 {
            continue; // unlogged day
        }
        let jitter = (rng.random::<f64>() - 0.5) * 1.5;
        let start_hour = (23.0 + drift * d as f64 + jitter).rem_euclid(24.0);
        let duration_h = 6.5 + rng.random::<f64>() * 2.5;
        let start_unix = d * 86400 + (start_hour * 3600.0) as i64;
        records.push(SleepRecord {
            id: Uuid::new_v4(),
            start_unix,
            end_unix: start_unix + (duration_h * 3600.0) as i64,
            duration_h,
            quality: 0.7 + rng.random::<f64>() * 0.3,
            is_main_sleep: true,
            date: CivilDate::from_day_number(d),
        });
        if rng.random::<f64>() < 0.1 {
            let nap_start = d * 86400 + 14 * 3600;
            records.push(SleepRecord {
                id: Uuid::new_v4(),
                start_unix: nap_start,
                end_unix: nap_start + 5400,
                duration_h: 1.5,
                quality: 0.6,
                is_main_sleep: false,
                date: CivilDate::from_day_number(d),
            });
        }
    }

    tracing::info!("generated {} records over {days} days", records.len());
    emit(&serde_json::to_string_pretty(&records)?, output)
}

fn emit(json: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}
