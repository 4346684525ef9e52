//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.essbatch.toml` files.

use crate::cli::OutputFormat;
use crate::models::AnalyzerKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".essbatch.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Sample registry settings.
    #[serde(default)]
    pub samples: SamplesConfig,

    /// Analyzer settings.
    #[serde(default)]
    pub analyzers: AnalyzersConfig,

    /// Alignment preparation settings.
    #[serde(default)]
    pub preparer: PreparerConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory holding the result artifacts and reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            verbose: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

/// The fixed sample list and where each sample's alignments live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplesConfig {
    /// Sample identifiers, processed in this order.
    #[serde(default = "default_sample_ids")]
    pub ids: Vec<String>,

    /// Seed alignment path template; `{sample}` is replaced by the id.
    #[serde(default = "default_seed_alignment")]
    pub seed_alignment: String,

    /// Full alignment path template used by `compare`.
    #[serde(default = "default_full_alignment")]
    pub full_alignment: String,
}

impl Default for SamplesConfig {
    fn default() -> Self {
        Self {
            ids: default_sample_ids(),
            seed_alignment: default_seed_alignment(),
            full_alignment: default_full_alignment(),
        }
    }
}

fn default_sample_ids() -> Vec<String> {
    vec![
        "PF04961", "PF01668", "PF05635", "PF00158", "PF12002", "PF01948", "PF01196", "PF20415",
        "PF03914", "PF01156", "PF11799", "PF13356",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_seed_alignment() -> String {
    "{sample}/{sample}.aln".to_string()
}

fn default_full_alignment() -> String {
    "{sample}_f/{sample}_f.aln".to_string()
}

/// Analyzer (representation model) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzersConfig {
    /// Analyzers run for every sample in batch mode.
    #[serde(default = "default_batch_analyzers")]
    pub batch: Vec<AnalyzerKind>,

    /// Analyzers compared in single-sample mode.
    #[serde(default = "default_compare_analyzers")]
    pub compare: Vec<AnalyzerKind>,

    /// Shuffle the alignment before computing representations.
    #[serde(default)]
    pub shuffle: bool,

    /// Use MSA column attention instead of embeddings.
    #[serde(default)]
    pub column_attention: bool,

    /// Program implementing the analyzer contract.
    #[serde(default = "default_analyzer_command")]
    pub command: String,

    /// Leading arguments passed before the per-call arguments.
    #[serde(default = "default_analyzer_args")]
    pub args: Vec<String>,

    /// Per-invocation timeout in seconds. Unset means wait indefinitely.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl Default for AnalyzersConfig {
    fn default() -> Self {
        Self {
            batch: default_batch_analyzers(),
            compare: default_compare_analyzers(),
            shuffle: false,
            column_attention: false,
            command: default_analyzer_command(),
            args: default_analyzer_args(),
            timeout_seconds: None,
        }
    }
}

fn default_batch_analyzers() -> Vec<AnalyzerKind> {
    AnalyzerKind::ALL.to_vec()
}

fn default_compare_analyzers() -> Vec<AnalyzerKind> {
    vec![
        AnalyzerKind::Esm2,
        AnalyzerKind::Esmc,
        AnalyzerKind::Pt,
        AnalyzerKind::Msa,
    ]
}

fn default_analyzer_command() -> String {
    "python".to_string()
}

fn default_analyzer_args() -> Vec<String> {
    vec!["../src/hm_correlation.py".to_string()]
}

/// External alignment preparation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparerConfig {
    #[serde(default = "default_preparer_command")]
    pub command: String,

    /// Arguments placed before the seed alignment path.
    #[serde(default = "default_preparer_args")]
    pub args: Vec<String>,
}

impl Default for PreparerConfig {
    fn default() -> Self {
        Self {
            command: default_preparer_command(),
            args: default_preparer_args(),
        }
    }
}

fn default_preparer_command() -> String {
    "python".to_string()
}

fn default_preparer_args() -> Vec<String> {
    vec!["../src/prep_data.py".to_string(), "-a".to_string()]
}

/// Report generation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref dir) = args.output_dir {
            self.general.output_dir = dir.clone();
        }

        // Toggles can only be switched on from the command line
        if args.shuffle {
            self.analyzers.shuffle = true;
        }
        if args.column_attention {
            self.analyzers.column_attention = true;
        }

        if let Some(timeout) = args.timeout {
            self.analyzers.timeout_seconds = Some(timeout);
        }

        if let Some(format) = args.format {
            self.report.format = format;
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

/// Substitute `{sample}` in a path template.
pub fn expand_template(template: &str, sample: &str) -> PathBuf {
    PathBuf::from(template.replace("{sample}", sample))
}
