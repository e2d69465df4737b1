//! CLI Module
//!
//! Command-line interface for filter-compare.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// filter-compare - audio comparison for echo cancellation and noise suppression tests
#[derive(Parser, Debug)]
#[command(name = "filter-compare")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compare a filtered recording with its reference
    #[command(name = "compare")]
    Compare {
        /// Recording produced by the filter under test
        #[arg(short, long)]
        tested: PathBuf,

        /// Reference recording; without it the whole tested signal is treated as silence
        #[arg(short, long)]
        reference: Option<PathBuf>,

        /// Another recording processed like the tested one (e.g. the unfiltered input)
        #[arg(short, long)]
        additional: Option<PathBuf>,

        /// Configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Sample rate of the recordings, overrides the configuration
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Analysis start in ms, overrides the configuration
        #[arg(long)]
        start_ms: Option<u32>,

        /// Window searched for the alignment, in ms
        #[arg(long, num_args = 2, value_names = ["FROM_MS", "TO_MS"])]
        interval: Option<Vec<u32>>,

        /// Test name used for output files (default: tested file stem)
        #[arg(short, long)]
        name: Option<String>,

        /// Directory receiving the MFCC files and metrics.jsonl
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Signal-to-noise ratio between two recordings
    #[command(name = "snr")]
    Snr {
        /// Recording containing the signal
        signal: PathBuf,

        /// Recording containing the noise
        noise: PathBuf,

        /// Window used for the measure, in ms
        #[arg(long, num_args = 2, value_names = ["FROM_MS", "TO_MS"])]
        interval: Option<Vec<u32>>,

        /// Gain applied to the noise
        #[arg(long, default_value_t = 1.0)]
        noise_gain: f64,
    },

    /// Read echo canceller convergence metrics from a tester log
    #[command(name = "aec-metrics")]
    AecMetrics {
        /// Log file
        log: PathBuf,

        /// Print every sample as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run every test case of a manifest
    #[command(name = "batch")]
    Batch {
        /// Manifest file (JSON)
        manifest: PathBuf,
    },
}

/// Convert a two-value `--interval` argument
pub fn interval_arg(values: Option<Vec<u32>>) -> Option<(u32, u32)> {
    match values.as_deref() {
        Some([from, to]) => Some((*from, *to)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compare() {
        let cli = Cli::try_parse_from([
            "filter-compare",
            "-v",
            "compare",
            "--tested",
            "out.wav",
            "--reference",
            "ref.wav",
            "--interval",
            "3500",
            "4500",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Compare {
                tested,
                reference,
                interval,
                ..
            } => {
                assert_eq!(tested, PathBuf::from("out.wav"));
                assert_eq!(reference, Some(PathBuf::from("ref.wav")));
                assert_eq!(interval_arg(interval), Some((3500, 4500)));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_snr_defaults() {
        let cli = Cli::try_parse_from(["filter-compare", "snr", "s.wav", "n.wav"]).unwrap();
        match cli.command {
            Commands::Snr {
                noise_gain,
                interval,
                ..
            } => {
                assert_eq!(noise_gain, 1.0);
                assert!(interval.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_command_required() {
        assert!(Cli::try_parse_from(["filter-compare"]).is_err());
    }
}
