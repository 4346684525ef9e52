//! Multi-analyzer comparison on a single sample.
//!
//! Each alignment variant (seed, full) is run through every analyzer and the
//! results are kept in memory. Nothing is persisted.

use crate::adapter::{run_analyzer, AnalyzerSet};
use crate::analysis::depth::{ordinal_curve, AnalyzerCurve};
use crate::models::{AnalyzeOptions, AnalyzerKind, LayerCorrelations, SampleId, StatisticKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// A named alignment of the compared sample.
#[derive(Debug, Clone)]
pub struct AlignmentVariant {
    pub name: String,
    pub path: PathBuf,
}

impl AlignmentVariant {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Result of one (variant, analyzer) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonCell {
    pub analyzer: AnalyzerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlations: Option<LayerCorrelations>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantResults {
    pub variant: String,
    /// One cell per analyzer, in the requested analyzer order.
    pub cells: Vec<ComparisonCell>,
}

/// One chart: a statistic on one variant, one curve per successful analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonPanel {
    pub variant: String,
    pub statistic: StatisticKind,
    pub title: String,
    pub curves: Vec<AnalyzerCurve>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub sample: SampleId,
    pub variants: Vec<VariantResults>,
}

impl Comparison {
    #[allow(dead_code)] // Lookup for callers holding a comparison
    pub fn get(&self, variant: &str, analyzer: AnalyzerKind) -> Option<&LayerCorrelations> {
        self.cell(variant, analyzer)?.correlations.as_ref()
    }

    pub fn cell(&self, variant: &str, analyzer: AnalyzerKind) -> Option<&ComparisonCell> {
        self.variants
            .iter()
            .find(|v| v.variant == variant)?
            .cells
            .iter()
            .find(|c| c.analyzer == analyzer)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ComparisonCell)> {
        self.variants.iter().flat_map(|v| {
            v.cells
                .iter()
                .filter(|c| c.error.is_some())
                .map(move |c| (v.variant.as_str(), c))
        })
    }

    /// Variant-major panels, each statistic once per variant. With the seed
    /// and full variants this yields the four comparison charts.
    pub fn panels(&self) -> Vec<ComparisonPanel> {
        let mut panels = Vec::new();
        for variant in &self.variants {
            for statistic in StatisticKind::ALL {
                let curves = variant
                    .cells
                    .iter()
                    .filter_map(|cell| {
                        let correlations = cell.correlations.as_ref()?;
                        Some(AnalyzerCurve {
                            analyzer: cell.analyzer,
                            points: ordinal_curve(correlations.get(statistic)),
                        })
                    })
                    .collect();

                panels.push(ComparisonPanel {
                    variant: variant.variant.clone(),
                    statistic,
                    title: format!("{} - {} Alignment", statistic.label(), variant.variant),
                    curves,
                });
            }
        }
        panels
    }
}

/// Runs several analyzers over the alignment variants of one sample.
pub struct Comparator {
    analyzers: AnalyzerSet,
    options: AnalyzeOptions,
    timeout: Option<Duration>,
}

impl Comparator {
    pub fn new(analyzers: AnalyzerSet, options: AnalyzeOptions, timeout: Option<Duration>) -> Self {
        Self {
            analyzers,
            options,
            timeout,
        }
    }

    /// Run every (variant, analyzer) pair. Variants run one after another,
    /// the analyzers of a variant run concurrently. A failing pair leaves an
    /// error cell and does not affect the others.
    pub async fn compare(
        &self,
        sample: &SampleId,
        variants: &[AlignmentVariant],
        analyzers: &[AnalyzerKind],
    ) -> Comparison {
        let mut results = Vec::with_capacity(variants.len());

        for variant in variants {
            info!(
                "Running {} analyzers for {} on {} alignment ({})",
                analyzers.len(),
                sample,
                variant.name,
                variant.path.display()
            );

            let mut tasks = JoinSet::new();
            for &analyzer in analyzers {
                let set = self.analyzers.clone();
                let path = variant.path.clone();
                let options = self.options;
                let timeout = self.timeout;
                tasks.spawn(async move {
                    (analyzer, run_analyzer(&set, analyzer, path, options, timeout).await)
                });
            }

            let mut cells = Vec::with_capacity(analyzers.len());
            while let Some(joined) = tasks.join_next().await {
                let Ok((analyzer, result)) = joined else {
                    continue;
                };
                let cell = match result {
                    Ok(correlations) => ComparisonCell {
                        analyzer,
                        correlations: Some(correlations),
                        error: None,
                    },
                    Err(e) => {
                        warn!(
                            "{} on {} {} alignment failed: {}",
                            analyzer.id().to_uppercase(),
                            sample,
                            variant.name,
                            e
                        );
                        ComparisonCell {
                            analyzer,
                            correlations: None,
                            error: Some(e.to_string()),
                        }
                    }
                };
                cells.push(cell);
            }

            for &analyzer in analyzers {
                if !cells.iter().any(|c| c.analyzer == analyzer) {
                    cells.push(ComparisonCell {
                        analyzer,
                        correlations: None,
                        error: Some("analyzer task aborted".to_string()),
                    });
                }
            }
            cells.sort_by_key(|c| analyzers.iter().position(|a| *a == c.analyzer));

            results.push(VariantResults {
                variant: variant.name.clone(),
                cells,
            });
        }

        Comparison {
            sample: sample.clone(),
            variants: results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Analyzer, AnalyzerError, CancelFlag};
    use std::path::Path;

    /// Layer count depends on the variant so results are distinguishable.
    struct VariantAware {
        seed_layers: usize,
        full_layers: usize,
        fail_on_full: bool,
    }

    impl Analyzer for VariantAware {
        fn analyze(
            &self,
            alignment: &Path,
            _options: &AnalyzeOptions,
            _cancel: &CancelFlag,
        ) -> Result<LayerCorrelations, AnalyzerError> {
            let full = alignment.to_string_lossy().contains("_f");
            if full && self.fail_on_full {
                return Err(AnalyzerError::Failed("out of memory".to_string()));
            }
            let layers = if full { self.full_layers } else { self.seed_layers };
            let values: Vec<f64> = (0..layers).map(|i| i as f64).collect();
            LayerCorrelations::new(values.clone(), values).map_err(AnalyzerError::Failed)
        }
    }

    fn variants() -> Vec<AlignmentVariant> {
        vec![
            AlignmentVariant::new("Seed", "PF1/PF1.aln"),
            AlignmentVariant::new("Full", "PF1_f/PF1_f.aln"),
        ]
    }

    #[tokio::test]
    async fn test_compare_all_cells() {
        let mut set = AnalyzerSet::new();
        set.register(
            AnalyzerKind::Esm2,
            VariantAware {
                seed_layers: 31,
                full_layers: 31,
                fail_on_full: false,
            },
        );
        set.register(
            AnalyzerKind::Msa,
            VariantAware {
                seed_layers: 13,
                full_layers: 13,
                fail_on_full: true,
            },
        );

        let comparator = Comparator::new(set, AnalyzeOptions::default(), None);
        let comparison = comparator
            .compare(
                &SampleId::new("PF1"),
                &variants(),
                &[AnalyzerKind::Msa, AnalyzerKind::Esm2],
            )
            .await;

        assert_eq!(comparison.variants.len(), 2);
        assert_eq!(comparison.get("Seed", AnalyzerKind::Msa).map(|c| c.layers()), Some(13));
        assert_eq!(comparison.get("Full", AnalyzerKind::Esm2).map(|c| c.layers()), Some(31));
        assert!(comparison.get("Full", AnalyzerKind::Msa).is_none());

        let failures: Vec<_> = comparison.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "Full");
        assert_eq!(failures[0].1.analyzer, AnalyzerKind::Msa);

        // Requested order is kept
        let seed_order: Vec<_> = comparison.variants[0].cells.iter().map(|c| c.analyzer).collect();
        assert_eq!(seed_order, vec![AnalyzerKind::Msa, AnalyzerKind::Esm2]);
    }

    #[tokio::test]
    async fn test_panels() {
        let mut set = AnalyzerSet::new();
        set.register(
            AnalyzerKind::Pt,
            VariantAware {
                seed_layers: 4,
                full_layers: 5,
                fail_on_full: false,
            },
        );

        let comparison = Comparator::new(set, AnalyzeOptions::default(), None)
            .compare(&SampleId::new("PF1"), &variants(), &[AnalyzerKind::Pt])
            .await;
        let panels = comparison.panels();

        assert_eq!(panels.len(), 4);
        assert_eq!(panels[0].variant, "Seed");
        assert_eq!(panels[0].statistic, StatisticKind::RankOrder);
        assert_eq!(panels[3].variant, "Full");
        assert_eq!(panels[3].statistic, StatisticKind::Linear);

        let seed_curve = &panels[0].curves[0].points;
        assert_eq!(seed_curve.len(), 4);
        assert_eq!(seed_curve[0].depth_percent, 25.0);
        assert_eq!(seed_curve[3].depth_percent, 100.0);

        let full_curve = &panels[2].curves[0].points;
        assert_eq!(full_curve.len(), 5);
        assert_eq!(full_curve[0].depth_percent, 20.0);
    }
}
