//! Result store for per-layer statistic artifacts.
//!
//! One JSON file per (analyzer, sample, statistic), named
//! `<analyzer>_<sample>_<suffix>.json` in a flat output directory.
//! Writes replace any previous artifact with the same key; a missing
//! artifact is a normal state meaning the pair was skipped or failed.
//!
//! JSON has no NaN, so a non-finite layer value is stored as `null` and
//! read back as NaN. The layer keeps its position in the sequence.

use crate::models::{AnalyzerKind, LayerCorrelations, SampleId, StatisticKind};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

const ARTIFACT_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed artifact {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A stored sequence together with the sample it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub sample: SampleId,
    pub values: Vec<f64>,
}

/// Flat directory of statistic artifacts.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the output directory if needed.
    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    pub fn file_name(analyzer: AnalyzerKind, sample: &SampleId, statistic: StatisticKind) -> String {
        format!(
            "{}_{}_{}.{}",
            analyzer.id(),
            sample,
            statistic.suffix(),
            ARTIFACT_EXTENSION
        )
    }

    pub fn path(&self, analyzer: AnalyzerKind, sample: &SampleId, statistic: StatisticKind) -> PathBuf {
        self.dir.join(Self::file_name(analyzer, sample, statistic))
    }

    /// Persist one statistic sequence, replacing any earlier one.
    ///
    /// The file is written next to its final name and renamed into place, so
    /// readers never observe a half-written artifact.
    pub fn write(
        &self,
        analyzer: AnalyzerKind,
        sample: &SampleId,
        statistic: StatisticKind,
        values: &[f64],
    ) -> Result<PathBuf, StoreError> {
        let path = self.path(analyzer, sample, statistic);
        let tmp = path.with_extension("json.tmp");

        let encoded: Vec<Option<f64>> = values
            .iter()
            .map(|v| v.is_finite().then_some(*v))
            .collect();
        let content = serde_json::to_vec(&encoded).map_err(|source| StoreError::Malformed {
            path: path.clone(),
            source,
        })?;

        fs::write(&tmp, content).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        debug!("Wrote {} ({} layers)", path.display(), values.len());
        Ok(path)
    }

    /// Persist both statistics of one (sample, analyzer) result.
    pub fn write_pair(
        &self,
        analyzer: AnalyzerKind,
        sample: &SampleId,
        correlations: &LayerCorrelations,
    ) -> Result<(), StoreError> {
        for statistic in StatisticKind::ALL {
            self.write(analyzer, sample, statistic, correlations.get(statistic))?;
        }
        Ok(())
    }

    /// Read one artifact. `Ok(None)` when it does not exist.
    #[allow(dead_code)] // Point lookup; aggregation goes through load_all
    pub fn read(
        &self,
        analyzer: AnalyzerKind,
        sample: &SampleId,
        statistic: StatisticKind,
    ) -> Result<Option<Vec<f64>>, StoreError> {
        read_values(&self.path(analyzer, sample, statistic))
    }

    /// Remove both artifacts of a pair, if present.
    pub fn remove_pair(&self, analyzer: AnalyzerKind, sample: &SampleId) -> Result<(), StoreError> {
        for statistic in StatisticKind::ALL {
            let path = self.path(analyzer, sample, statistic);
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed stale {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(StoreError::Io { path, source }),
            }
        }
        Ok(())
    }

    /// Load every artifact for (analyzer, *, statistic), sorted by sample.
    ///
    /// Unreadable artifacts are logged and skipped. A missing directory
    /// yields an empty list.
    pub fn load_all(&self, analyzer: AnalyzerKind, statistic: StatisticKind) -> Vec<Artifact> {
        if !self.dir.is_dir() {
            debug!("Result directory {} does not exist", self.dir.display());
            return Vec::new();
        }

        let prefix = format!("{}_", analyzer.id());
        let suffix = format!("_{}.{}", statistic.suffix(), ARTIFACT_EXTENSION);

        let mut artifacts: Vec<Artifact> = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?;
                let sample = name.strip_prefix(&prefix)?.strip_suffix(&suffix)?;
                if sample.is_empty() {
                    return None;
                }
                match read_values(entry.path()) {
                    Ok(Some(values)) => {
                        debug!("Loaded {} ({} layers)", entry.path().display(), values.len());
                        Some(Artifact {
                            sample: SampleId::new(sample),
                            values,
                        })
                    }
                    Ok(None) => None,
                    Err(e) => {
                        warn!("Failed to load {}: {}", entry.path().display(), e);
                        None
                    }
                }
            })
            .collect();

        artifacts.sort_by(|a, b| a.sample.cmp(&b.sample));
        artifacts
    }
}

fn read_values(path: &Path) -> Result<Option<Vec<f64>>, StoreError> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let decoded: Vec<Option<f64>> =
        serde_json::from_slice(&content).map_err(|source| StoreError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(Some(
        decoded.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
    ))
}
