//! Analyzer capability contract and dispatch.
//!
//! Every representation model is reached through the same [`Analyzer`]
//! trait. An [`AnalyzerSet`] maps each [`AnalyzerKind`] to its registered
//! implementation, so adding a model means registering one more entry.

use crate::config::AnalyzersConfig;
use crate::models::{AnalyzeOptions, AnalyzerKind, LayerCorrelations};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure of a single analyzer invocation.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("no analyzer registered for {0}")]
    NotRegistered(AnalyzerKind),

    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("analyzer exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("malformed analyzer output: {0}")]
    MalformedOutput(#[from] serde_json::Error),

    #[error("invalid analyzer output: {0}")]
    InvalidOutput(String),

    #[error("I/O error while waiting for analyzer: {0}")]
    Wait(#[source] std::io::Error),

    #[error("analyzer timed out after {0:?}")]
    TimedOut(Duration),

    #[error("analyzer call cancelled")]
    Cancelled,

    #[error("analyzer task panicked: {0}")]
    Panicked(String),

    /// Failure reported by an in-process implementation.
    #[allow(dead_code)]
    #[error("{0}")]
    Failed(String),
}

/// Stop request shared between a caller and one blocking analyzer call.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A representation model queried for per-layer correlations.
///
/// Implementations block until the model has produced its output. Long
/// running implementations should poll `cancel` and return
/// [`AnalyzerError::Cancelled`] once it is set, releasing everything they
/// started.
pub trait Analyzer: Send + Sync {
    fn analyze(
        &self,
        alignment: &Path,
        options: &AnalyzeOptions,
        cancel: &CancelFlag,
    ) -> Result<LayerCorrelations, AnalyzerError>;
}

/// Registered analyzer implementations, keyed by model.
#[derive(Clone, Default)]
pub struct AnalyzerSet {
    analyzers: HashMap<AnalyzerKind, Arc<dyn Analyzer>>,
}

impl AnalyzerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one [`CommandAnalyzer`] per known model.
    pub fn from_config(config: &AnalyzersConfig) -> Self {
        let mut set = Self::new();
        for kind in AnalyzerKind::ALL {
            set.register(
                kind,
                CommandAnalyzer::new(kind, config.command.clone(), config.args.clone()),
            );
        }
        set
    }

    pub fn register(&mut self, kind: AnalyzerKind, analyzer: impl Analyzer + 'static) {
        self.analyzers.insert(kind, Arc::new(analyzer));
    }

    pub fn get(&self, kind: AnalyzerKind) -> Result<Arc<dyn Analyzer>, AnalyzerError> {
        self.analyzers
            .get(&kind)
            .cloned()
            .ok_or(AnalyzerError::NotRegistered(kind))
    }
}

/// Run one analyzer call on the blocking pool, optionally bounded by a timeout.
///
/// On timeout the call is cancelled and still joined before this returns,
/// so nothing it started outlives the task. Whatever it produced is
/// discarded.
pub async fn run_analyzer(
    analyzers: &AnalyzerSet,
    kind: AnalyzerKind,
    alignment: PathBuf,
    options: AnalyzeOptions,
    timeout: Option<Duration>,
) -> Result<LayerCorrelations, AnalyzerError> {
    let analyzer = analyzers.get(kind)?;
    let cancel = CancelFlag::default();
    let worker_cancel = cancel.clone();
    let mut handle = tokio::task::spawn_blocking(move || {
        analyzer.analyze(&alignment, &options, &worker_cancel)
    });

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                cancel.cancel();
                let _ = handle.await;
                debug!("{} cancelled after {:?}", kind, limit);
                return Err(AnalyzerError::TimedOut(limit));
            }
        },
        None => handle.await,
    };

    let correlations = joined.map_err(|e| AnalyzerError::Panicked(e.to_string()))??;

    if correlations.layers() != kind.nominal_layers() {
        debug!(
            "{} returned {} layers (nominal {})",
            kind,
            correlations.layers(),
            kind.nominal_layers()
        );
    }

    Ok(correlations)
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// JSON document an external analyzer prints on stdout.
///
/// A layer whose correlation is undefined may be `null` or one of the bare
/// `NaN` / `Infinity` / `-Infinity` tokens Python's json module emits; it is
/// read as NaN.
#[derive(Debug, Deserialize)]
struct AnalyzerOutput {
    spearman: Vec<Option<f64>>,
    pearson: Vec<Option<f64>>,
}

fn undefined_as_nan(values: Vec<Option<f64>>) -> Vec<f64> {
    values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect()
}

/// Replace bare non-finite number tokens outside strings with `null`.
fn null_non_finite(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut in_string = false;

    while let Some(c) = rest.chars().next() {
        if in_string {
            if c == '\\' {
                let escaped: String = rest.chars().take(2).collect();
                out.push_str(&escaped);
                rest = &rest[escaped.len()..];
                continue;
            }
            if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if let Some(token) = ["-Infinity", "Infinity", "NaN"]
            .iter()
            .find(|token| rest.starts_with(**token))
        {
            out.push_str("null");
            rest = &rest[token.len()..];
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Read a child pipe to the end on its own thread so a chatty child never
/// blocks on a full pipe.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Analyzer backed by an external program.
///
/// The program is invoked as
/// `<command> <args..> <alignment> <model> <shuffle Y|N> <colattn Y|N>`
/// and must print `{"spearman": [...], "pearson": [...]}` on stdout.
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    kind: AnalyzerKind,
    command: String,
    args: Vec<String>,
}

impl CommandAnalyzer {
    pub fn new(kind: AnalyzerKind, command: String, args: Vec<String>) -> Self {
        Self {
            kind,
            command,
            args,
        }
    }

    fn parse_output(stdout: &[u8]) -> Result<LayerCorrelations, AnalyzerError> {
        let text = null_non_finite(&String::from_utf8_lossy(stdout));
        let output: AnalyzerOutput = serde_json::from_str(&text)?;
        LayerCorrelations::new(
            undefined_as_nan(output.spearman),
            undefined_as_nan(output.pearson),
        )
        .map_err(AnalyzerError::InvalidOutput)
    }
}

impl Analyzer for CommandAnalyzer {
    fn analyze(
        &self,
        alignment: &Path,
        options: &AnalyzeOptions,
        cancel: &CancelFlag,
    ) -> Result<LayerCorrelations, AnalyzerError> {
        debug!(
            "Running {} ({}) on {}",
            self.kind,
            self.kind.model_name(),
            alignment.display()
        );

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .arg(alignment)
            .arg(self.kind.id())
            .arg(options.shuffle.to_string())
            .arg(options.column_attention.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| AnalyzerError::Launch {
                command: self.command.clone(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            if let Some(status) = child.try_wait().map_err(AnalyzerError::Wait)? {
                break status;
            }
            if cancel.is_cancelled() {
                // Pipe readers are left to finish on their own
                let _ = child.kill();
                let _ = child.wait();
                debug!("Killed {} on {}", self.kind, alignment.display());
                return Err(AnalyzerError::Cancelled);
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(AnalyzerError::Exit {
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        Self::parse_output(&stdout)
    }
}
