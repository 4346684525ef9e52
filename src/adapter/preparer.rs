//! Per-sample alignment preparation.

use crate::config::PreparerConfig;
use crate::models::SampleId;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("preparer exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    /// Failure reported by an in-process implementation.
    #[allow(dead_code)]
    #[error("{0}")]
    Failed(String),
}

/// Turns a sample's seed alignment into the files analyzers consume.
///
/// Runs once per sample before any analyzer for that sample. Its outputs are
/// sample-scoped, so two samples are never prepared at the same time.
pub trait Preparer: Send + Sync {
    fn prepare(&self, sample: &SampleId, seed_alignment: &Path) -> Result<(), PrepareError>;
}

/// Preparer backed by a blocking external program.
#[derive(Debug, Clone)]
pub struct CommandPreparer {
    command: String,
    args: Vec<String>,
}

impl CommandPreparer {
    pub fn new(command: String, args: Vec<String>) -> Self {
        Self { command, args }
    }

    pub fn from_config(config: &PreparerConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }
}

impl Preparer for CommandPreparer {
    fn prepare(&self, sample: &SampleId, seed_alignment: &Path) -> Result<(), PrepareError> {
        debug!("Preparing {} from {}", sample, seed_alignment.display());

        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(seed_alignment)
            .output()
            .map_err(|source| PrepareError::Launch {
                command: self.command.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(PrepareError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
