//! Cross-sample aggregation and statistics.
//!
//! This module lines up the per-layer sequences stored for one
//! (analyzer, statistic) pair across samples, summarizes each layer's
//! distribution and derives a mean curve against percentage depth.

use crate::analysis::depth::{depth_percent, AnalyzerCurve, CurvePoint};
use crate::models::{AnalyzerKind, SampleId, StatisticKind};
use crate::store::{Artifact, ResultStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Cell of an [`AlignedMatrix`]: a stored value, or right-padding and
/// undefined (non-finite) values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerValue {
    Present(f64),
    Missing,
}

impl LayerValue {
    pub fn from_value(value: f64) -> Self {
        if value.is_finite() {
            LayerValue::Present(value)
        } else {
            LayerValue::Missing
        }
    }

    pub fn present(self) -> Option<f64> {
        match self {
            LayerValue::Present(v) => Some(v),
            LayerValue::Missing => None,
        }
    }
}

/// Sequences of differing length, right-padded with [`LayerValue::Missing`]
/// to the longest one. One row per sample.
#[derive(Debug, Clone)]
pub struct AlignedMatrix {
    samples: Vec<SampleId>,
    rows: Vec<Vec<LayerValue>>,
    columns: usize,
}

impl AlignedMatrix {
    pub fn from_artifacts(artifacts: &[Artifact]) -> Self {
        let columns = artifacts.iter().map(|a| a.values.len()).max().unwrap_or(0);

        let rows = artifacts
            .iter()
            .map(|a| {
                let mut row: Vec<LayerValue> =
                    a.values.iter().copied().map(LayerValue::from_value).collect();
                row.resize(columns, LayerValue::Missing);
                row
            })
            .collect();

        Self {
            samples: artifacts.iter().map(|a| a.sample.clone()).collect(),
            rows,
            columns,
        }
    }

    pub fn samples(&self) -> &[SampleId] {
        &self.samples
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Present values of one column; missing cells are skipped.
    pub fn column_values(&self, column: usize) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column).and_then(|cell| cell.present()))
            .collect()
    }

    /// Mean of the present values of each column. `None` for a column
    /// without any present value.
    pub fn column_means(&self) -> Vec<Option<f64>> {
        (0..self.columns)
            .map(|c| {
                let values = self.column_values(c);
                if values.is_empty() {
                    None
                } else {
                    Some(values.iter().sum::<f64>() / values.len() as f64)
                }
            })
            .collect()
    }
}

/// Five-number summary of one layer, the input of a box plot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerSummary {
    pub layer: usize,
    pub n: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl LayerSummary {
    /// Summarize a layer's values. `None` for an empty layer; renderers
    /// draw a placeholder for it.
    pub fn from_values(layer: usize, values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        Some(Self {
            layer,
            n: sorted.len(),
            min: sorted[0],
            q1: quantile_sorted(&sorted, 0.25),
            median: quantile_sorted(&sorted, 0.5),
            q3: quantile_sorted(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
        })
    }
}

/// Linear-interpolated quantile of an ascending, non-empty slice.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Aggregate of one (analyzer, statistic) pair across samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregate {
    pub analyzer: AnalyzerKind,
    pub statistic: StatisticKind,
    /// Samples that contributed a sequence, in row order.
    pub samples: Vec<SampleId>,
    /// Present values per layer index. Trailing empty layers are dropped.
    pub per_layer_distribution: Vec<Vec<f64>>,
    /// Mean per layer against percentage depth.
    pub depth_curve: Vec<CurvePoint>,
}

impl Aggregate {
    pub fn from_artifacts(
        analyzer: AnalyzerKind,
        statistic: StatisticKind,
        artifacts: &[Artifact],
    ) -> Self {
        let matrix = AlignedMatrix::from_artifacts(artifacts);
        debug!(
            "Aligned {} - {}: {} rows x {} columns",
            analyzer,
            statistic.suffix(),
            matrix.rows(),
            matrix.columns()
        );

        let mut per_layer_distribution: Vec<Vec<f64>> =
            (0..matrix.columns()).map(|c| matrix.column_values(c)).collect();
        while per_layer_distribution
            .last()
            .is_some_and(|values| values.is_empty())
        {
            per_layer_distribution.pop();
        }

        let layers = per_layer_distribution.len();
        let depth_curve = matrix
            .column_means()
            .into_iter()
            .take(layers)
            .enumerate()
            .filter_map(|(i, mean)| {
                mean.map(|value| CurvePoint {
                    depth_percent: depth_percent(i, layers),
                    value,
                })
            })
            .collect();

        Self {
            analyzer,
            statistic,
            samples: matrix.samples().to_vec(),
            per_layer_distribution,
            depth_curve,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.per_layer_distribution.is_empty()
    }

    /// Number of layer positions L.
    pub fn layers(&self) -> usize {
        self.per_layer_distribution.len()
    }

    pub fn box_summaries(&self) -> Vec<Option<LayerSummary>> {
        self.per_layer_distribution
            .iter()
            .enumerate()
            .map(|(layer, values)| LayerSummary::from_values(layer, values))
            .collect()
    }

    pub fn curve(&self) -> AnalyzerCurve {
        AnalyzerCurve {
            analyzer: self.analyzer,
            points: self.depth_curve.clone(),
        }
    }
}

/// Mean curves of several analyzers for one statistic, on a shared depth axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanCurveOverlay {
    pub statistic: StatisticKind,
    pub curves: Vec<AnalyzerCurve>,
    /// Analyzers without any stored artifact.
    pub skipped: Vec<AnalyzerKind>,
}

/// Every aggregate of a store plus the per-statistic overlays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSummary {
    /// Non-empty aggregates, analyzer-major.
    pub aggregates: Vec<Aggregate>,
    pub overlays: Vec<MeanCurveOverlay>,
}

/// Reads artifacts from a [`ResultStore`] and aggregates them.
pub struct Aggregator<'a> {
    store: &'a ResultStore,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a ResultStore) -> Self {
        Self { store }
    }

    /// Aggregate one (analyzer, statistic) pair. Returns an empty aggregate
    /// when nothing is stored for it.
    pub fn aggregate(&self, analyzer: AnalyzerKind, statistic: StatisticKind) -> Aggregate {
        let artifacts = self.store.load_all(analyzer, statistic);
        debug!(
            "Loaded {} artifacts for {} - {}",
            artifacts.len(),
            analyzer,
            statistic.suffix()
        );
        Aggregate::from_artifacts(analyzer, statistic, &artifacts)
    }

    /// Aggregate every analyzer for every statistic. Analyzers without data
    /// are left out of the aggregates and listed as skipped in the overlays.
    pub fn aggregate_all(&self, analyzers: &[AnalyzerKind]) -> AggregateSummary {
        let mut aggregates = Vec::new();
        let mut overlays: Vec<MeanCurveOverlay> = StatisticKind::ALL
            .iter()
            .map(|&statistic| MeanCurveOverlay {
                statistic,
                curves: Vec::new(),
                skipped: Vec::new(),
            })
            .collect();

        for &analyzer in analyzers {
            for overlay in overlays.iter_mut() {
                let aggregate = self.aggregate(analyzer, overlay.statistic);
                if aggregate.is_empty() {
                    warn!(
                        "No artifacts for {} - {}, skipping.",
                        analyzer,
                        overlay.statistic.suffix()
                    );
                    overlay.skipped.push(analyzer);
                    continue;
                }
                overlay.curves.push(aggregate.curve());
                aggregates.push(aggregate);
            }
        }

        for overlay in &overlays {
            if overlay.curves.is_empty() {
                warn!(
                    "No data for {} across any analyzer, skipping mean curve.",
                    overlay.statistic.suffix()
                );
            }
        }

        AggregateSummary {
            aggregates,
            overlays,
        }
    }
}
