//! Data models for the batch runner.
//!
//! This module contains the identifiers, per-layer correlation results,
//! task outcomes and batch reports shared by every stage of the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of one protein family (e.g. `PF04961`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleId(String);

impl SampleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fixed set of representation models an analyzer can wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    Esmc,
    Esm2,
    Esm1,
    /// ProtT5
    Pt,
    /// MSA Transformer
    Msa,
}

impl AnalyzerKind {
    pub const ALL: [AnalyzerKind; 5] = [
        AnalyzerKind::Esmc,
        AnalyzerKind::Esm2,
        AnalyzerKind::Esm1,
        AnalyzerKind::Pt,
        AnalyzerKind::Msa,
    ];

    /// Short identifier used in artifact names and on the command line.
    pub fn id(&self) -> &'static str {
        match self {
            AnalyzerKind::Esmc => "esmc",
            AnalyzerKind::Esm2 => "esm2",
            AnalyzerKind::Esm1 => "esm1",
            AnalyzerKind::Pt => "pt",
            AnalyzerKind::Msa => "msa",
        }
    }

    /// Published name of the underlying model.
    pub fn model_name(&self) -> &'static str {
        match self {
            AnalyzerKind::Esmc => "ESMC",
            AnalyzerKind::Esm2 => "esm2_t30_150M_UR50D",
            AnalyzerKind::Esm1 => "esm1b_t33_650M_UR50",
            AnalyzerKind::Pt => "Rostlab/prot_t5_xl_uniref50",
            AnalyzerKind::Msa => "esm_msa1b_t12_100M_UR50S",
        }
    }

    /// Nominal number of representation layers (embedding layer included).
    ///
    /// Only informational: the length of the returned sequences is what
    /// the rest of the pipeline trusts.
    pub fn nominal_layers(&self) -> usize {
        match self {
            AnalyzerKind::Esmc => 31,
            AnalyzerKind::Esm2 => 31,
            AnalyzerKind::Esm1 => 34,
            AnalyzerKind::Pt => 25,
            AnalyzerKind::Msa => 13,
        }
    }
}

impl fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for AnalyzerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalyzerKind::ALL
            .into_iter()
            .find(|kind| kind.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown analyzer: {}", s))
    }
}

/// The two per-layer correlation statistics every analyzer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticKind {
    /// Spearman rank-order correlation.
    RankOrder,
    /// Pearson linear correlation.
    Linear,
}

impl StatisticKind {
    pub const ALL: [StatisticKind; 2] = [StatisticKind::RankOrder, StatisticKind::Linear];

    /// Suffix used in artifact file names.
    pub fn suffix(&self) -> &'static str {
        match self {
            StatisticKind::RankOrder => "spear",
            StatisticKind::Linear => "pear",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatisticKind::RankOrder => "ESSp (Spearman)",
            StatisticKind::Linear => "ESSr (Pearson)",
        }
    }
}

impl fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Y/N switch forwarded verbatim to the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Toggle {
    Y,
    #[default]
    N,
}

impl From<bool> for Toggle {
    fn from(on: bool) -> Self {
        if on {
            Toggle::Y
        } else {
            Toggle::N
        }
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Toggle::Y => write!(f, "Y"),
            Toggle::N => write!(f, "N"),
        }
    }
}

/// Options shared by every analyzer invocation of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeOptions {
    pub shuffle: Toggle,
    pub column_attention: Toggle,
}

/// One analyzer's output for one alignment: a value per layer and statistic.
///
/// Both sequences always have the same, non-zero length; index 0 is the
/// shallowest layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerCorrelations {
    rank_order: Vec<f64>,
    linear: Vec<f64>,
}

impl LayerCorrelations {
    /// Pair up the two statistic sequences, rejecting empty or mismatched ones.
    pub fn new(rank_order: Vec<f64>, linear: Vec<f64>) -> Result<Self, String> {
        if rank_order.is_empty() {
            return Err("analyzer returned no layers".to_string());
        }
        if rank_order.len() != linear.len() {
            return Err(format!(
                "statistic lengths differ: {} rank-order vs {} linear",
                rank_order.len(),
                linear.len()
            ));
        }
        Ok(Self { rank_order, linear })
    }

    pub fn layers(&self) -> usize {
        self.rank_order.len()
    }

    pub fn get(&self, statistic: StatisticKind) -> &[f64] {
        match statistic {
            StatisticKind::RankOrder => &self.rank_order,
            StatisticKind::Linear => &self.linear,
        }
    }
}

/// Outcome of one (sample, analyzer) pair in a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub sample: SampleId,
    pub analyzer: AnalyzerKind,
    pub success: bool,
    /// Observed layer count on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layers: Option<usize>,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn passed(sample: SampleId, analyzer: AnalyzerKind, layers: usize) -> Self {
        Self {
            sample,
            analyzer,
            success: true,
            layers: Some(layers),
            error: None,
        }
    }

    pub fn failed(sample: SampleId, analyzer: AnalyzerKind, error: impl Into<String>) -> Self {
        Self {
            sample,
            analyzer,
            success: false,
            layers: None,
            error: Some(error.into()),
        }
    }
}

/// Running pass/fail counters of a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl Tally {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, success: bool) {
        if success {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.passed + self.failed)
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Passed {} Failed {} Remaining {}",
            self.passed,
            self.failed,
            self.remaining()
        )
    }
}

/// Final report of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub tally: Tally,
    /// One entry per (sample, analyzer) pair, in sample order.
    pub outcomes: Vec<TaskOutcome>,
}

impl BatchReport {
    /// Outcome of a specific pair, if it was part of the run.
    #[allow(dead_code)] // Lookup for callers inspecting a single pair
    pub fn outcome(&self, sample: &SampleId, analyzer: AnalyzerKind) -> Option<&TaskOutcome> {
        self.outcomes
            .iter()
            .find(|o| &o.sample == sample && o.analyzer == analyzer)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }
}
