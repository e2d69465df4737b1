//! filter-compare CLI
//!
//! Command-line interface for the audio comparison engine.

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::debug;

use filter_compare::cli::{commands, interval_arg, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    debug!("filter-compare v{}", env!("CARGO_PKG_VERSION"));

    handle_command(cli.command)
}

fn handle_command(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Compare {
            tested,
            reference,
            additional,
            config,
            sample_rate,
            start_ms,
            interval,
            name,
            output_dir,
        } => {
            commands::compare(
                &tested,
                reference.as_deref(),
                additional.as_deref(),
                config.as_deref(),
                sample_rate,
                start_ms,
                interval_arg(interval),
                name,
                output_dir.as_deref(),
            )
            .with_context(|| format!("comparison of {} failed", tested.display()))?;
        }
        Commands::Snr {
            signal,
            noise,
            interval,
            noise_gain,
        } => {
            commands::snr(&signal, &noise, interval_arg(interval), noise_gain)
                .context("SNR computation failed")?;
        }
        Commands::AecMetrics { log, json } => {
            commands::aec_metrics(&log, json)
                .with_context(|| format!("cannot read AEC metrics from {}", log.display()))?;
        }
        Commands::Batch { manifest } => {
            let summary = commands::batch(&manifest)
                .with_context(|| format!("cannot run batch {}", manifest.display()))?;
            if !summary.is_success() {
                bail!(
                    "{} of {} test cases did not pass",
                    summary.failed.len() + summary.errors.len(),
                    summary.passed.len() + summary.failed.len() + summary.errors.len()
                );
            }
        }
    }
    Ok(())
}
