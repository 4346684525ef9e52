//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::AnalyzerKind;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// ESS Batch - layer-wise evolutionary self-similarity across models
///
/// Runs every configured representation model over a fixed set of protein
/// families, stores one per-layer correlation sequence per model, family and
/// statistic, and aggregates them into depth-normalized comparisons.
///
/// Examples:
///   ess-batch run
///   ess-batch run --samples PF00158,PF01948 --analyzers esm2,msa
///   ess-batch compare PF00158
///   ess-batch aggregate --format json
///   ess-batch --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .essbatch.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory for result artifacts and reports
    #[arg(short, long, value_name = "DIR", env = "ESS_OUTPUT_DIR", global = true)]
    pub output_dir: Option<PathBuf>,

    /// Shuffle alignments before analysis (passed as Y to the analyzer)
    #[arg(long, global = true)]
    pub shuffle: bool,

    /// Use MSA column attention (passed as Y to the analyzer)
    #[arg(long, global = true)]
    pub column_attention: bool,

    /// Per-analyzer timeout in seconds
    ///
    /// A call exceeding it counts as a failed task. Default: no timeout.
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Output format for reports (markdown, json)
    #[arg(long, value_name = "FORMAT", global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Exit with code 2 when any batch task failed
    #[arg(long, global = true)]
    pub fail_on_error: bool,

    /// Generate a default .essbatch.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run every batch analyzer over every configured sample
    Run {
        /// Restrict the run to these samples (comma-separated)
        #[arg(long, value_name = "IDS", value_delimiter = ',')]
        samples: Option<Vec<String>>,

        /// Restrict the run to these analyzers (comma-separated)
        #[arg(long, value_name = "MODELS", value_delimiter = ',')]
        analyzers: Option<Vec<AnalyzerKind>>,
    },

    /// Compare analyzers on one sample's seed and full alignments
    Compare {
        /// Sample identifier, e.g. PF00158
        sample: String,
    },

    /// Aggregate stored artifacts across samples
    Aggregate,
}

/// Output format for reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.command.is_none() {
            return Err("A command is required: run, compare <SAMPLE> or aggregate".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        match &self.command {
            Some(Command::Compare { sample }) if sample.trim().is_empty() => {
                Err("Sample identifier must not be empty".to_string())
            }
            Some(Command::Run {
                samples: Some(samples),
                ..
            }) if samples.iter().any(|s| s.trim().is_empty()) => {
                Err("Sample identifiers must not be empty".to_string())
            }
            Some(Command::Run {
                analyzers: Some(analyzers),
                ..
            }) if analyzers.is_empty() => Err("At least one analyzer is required".to_string()),
            _ => Ok(()),
        }
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            command: Some(Command::Aggregate),
            config: None,
            output_dir: None,
            shuffle: false,
            column_attention: false,
            timeout: None,
            format: None,
            verbose: false,
            quiet: false,
            fail_on_error: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_run_filters() {
        let args = Args::try_parse_from([
            "ess-batch",
            "run",
            "--samples",
            "PF00158,PF01948",
            "--analyzers",
            "esm2,msa",
            "--shuffle",
        ])
        .unwrap();

        assert!(args.shuffle);
        match args.command {
            Some(Command::Run { samples, analyzers }) => {
                assert_eq!(samples.unwrap(), vec!["PF00158", "PF01948"]);
                assert_eq!(
                    analyzers.unwrap(),
                    vec![AnalyzerKind::Esm2, AnalyzerKind::Msa]
                );
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_compare_requires_sample() {
        assert!(Args::try_parse_from(["ess-batch", "compare"]).is_err());

        let args = Args::try_parse_from(["ess-batch", "compare", "PF00158"]).unwrap();
        assert!(matches!(args.command, Some(Command::Compare { ref sample }) if sample == "PF00158"));
    }

    #[test]
    fn test_validation_missing_command() {
        let mut args = make_args();
        args.command = None;
        assert!(args.validate().is_err());

        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_timeout() {
        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
