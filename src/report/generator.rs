//! Markdown and JSON report generation.
//!
//! This module renders batch outcomes, cross-sample aggregates and
//! single-sample comparisons. The tables carry exactly the numbers a
//! plotting tool needs: per-layer box summaries and curves against
//! percentage depth.

use crate::analysis::{
    Aggregate, AggregateSummary, AnalyzerCurve, Comparison, ComparisonPanel, MeanCurveOverlay,
};
use crate::cli::OutputFormat;
use crate::models::BatchReport;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// Placeholder for a layer without any value.
const EMPTY_CELL: &str = "–";

/// Generate the batch run report.
pub fn generate_batch_markdown(report: &BatchReport) -> String {
    let mut output = String::new();

    output.push_str("# ESS Batch Run\n\n");
    output.push_str(&format!(
        "- **Started:** {}\n",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("- **Duration:** {:.1}s\n", report.duration_seconds));
    output.push_str(&format!(
        "- **Passed:** {} | **Failed:** {} | **Total:** {}\n\n",
        report.tally.passed, report.tally.failed, report.tally.total
    ));

    output.push_str("## Outcomes\n\n");
    output.push_str("| Sample | Analyzer | Status | Layers | Error |\n");
    output.push_str("|:---|:---|:---:|:---:|:---|\n");
    for outcome in &report.outcomes {
        output.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            outcome.sample,
            outcome.analyzer.id().to_uppercase(),
            if outcome.success { "✅" } else { "❌" },
            outcome
                .layers
                .map(|l| l.to_string())
                .unwrap_or_else(|| EMPTY_CELL.to_string()),
            outcome.error.as_deref().unwrap_or("")
        ));
    }
    output.push('\n');

    output
}

/// Generate the cross-sample aggregation report.
pub fn generate_aggregate_markdown(summary: &AggregateSummary) -> String {
    let mut output = String::new();

    output.push_str("# ESS Layer Aggregation\n\n");

    if summary.aggregates.is_empty() {
        output.push_str("No stored artifacts were found.\n\n");
        return output;
    }

    output.push_str("## Distribution Across Layers\n\n");
    for aggregate in &summary.aggregates {
        output.push_str(&generate_distribution_section(aggregate));
    }

    output.push_str("## Mean vs. Layer Depth (%)\n\n");
    for overlay in &summary.overlays {
        output.push_str(&generate_overlay_section(overlay));
    }

    output
}

/// One box-summary table for an (analyzer, statistic) aggregate.
fn generate_distribution_section(aggregate: &Aggregate) -> String {
    let mut section = String::new();

    section.push_str(&format!(
        "### {} - {}\n\n",
        aggregate.analyzer.id().to_uppercase(),
        aggregate.statistic.label()
    ));
    section.push_str(&format!(
        "*Samples: {} | Layers: {}*\n\n",
        aggregate.samples.len(),
        aggregate.layers()
    ));

    section.push_str("| Layer | n | Min | Q1 | Median | Q3 | Max |\n");
    section.push_str("|:---:|:---:|---:|---:|---:|---:|---:|\n");
    for (layer, summary) in aggregate.box_summaries().into_iter().enumerate() {
        match summary {
            Some(s) => section.push_str(&format!(
                "| {} | {} | {:.4} | {:.4} | {:.4} | {:.4} | {:.4} |\n",
                layer, s.n, s.min, s.q1, s.median, s.q3, s.max
            )),
            None => section.push_str(&format!(
                "| {} | 0 | {e} | {e} | {e} | {e} | {e} |\n",
                layer,
                e = EMPTY_CELL
            )),
        }
    }
    section.push('\n');

    section
}

fn generate_overlay_section(overlay: &MeanCurveOverlay) -> String {
    let mut section = String::new();

    section.push_str(&format!("### Mean {}\n\n", overlay.statistic.label()));

    if overlay.curves.is_empty() {
        section.push_str("No data for this statistic.\n\n");
        return section;
    }

    for curve in &overlay.curves {
        section.push_str(&generate_curve_table(curve, "Mean"));
    }

    if !overlay.skipped.is_empty() {
        let skipped: Vec<String> = overlay
            .skipped
            .iter()
            .map(|a| a.id().to_uppercase())
            .collect();
        section.push_str(&format!("*Skipped (no data): {}*\n\n", skipped.join(", ")));
    }

    section
}

fn generate_curve_table(curve: &AnalyzerCurve, value_header: &str) -> String {
    let mut table = String::new();

    table.push_str(&format!("**{}**\n\n", curve.analyzer.id().to_uppercase()));
    table.push_str(&format!("| Depth (%) | {} |\n", value_header));
    table.push_str("|---:|---:|\n");
    for point in &curve.points {
        table.push_str(&format!(
            "| {:.1} | {:.4} |\n",
            point.depth_percent, point.value
        ));
    }
    table.push('\n');

    table
}

/// Generate the single-sample comparison report.
pub fn generate_comparison_markdown(comparison: &Comparison) -> String {
    let mut output = String::new();

    output.push_str(&format!("# ESS Comparison: {}\n\n", comparison.sample));

    let failures: Vec<_> = comparison.failures().collect();
    if !failures.is_empty() {
        output.push_str("## Failed Runs\n\n");
        for (variant, cell) in failures {
            output.push_str(&format!(
                "- **{}** on {} alignment: {}\n",
                cell.analyzer.id().to_uppercase(),
                variant,
                cell.error.as_deref().unwrap_or("unknown error")
            ));
        }
        output.push('\n');
    }

    for panel in comparison.panels() {
        output.push_str(&generate_panel_section(&panel));
    }

    output
}

fn generate_panel_section(panel: &ComparisonPanel) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", panel.title));
    if panel.curves.is_empty() {
        section.push_str("No analyzer succeeded on this alignment.\n\n");
        return section;
    }
    for curve in &panel.curves {
        section.push_str(&generate_curve_table(curve, panel.statistic.suffix()));
    }

    section
}

/// Serialize any report structure as pretty JSON.
pub fn generate_json_report<T: Serialize>(report: &T) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Render `report` in `format` using `markdown` for the Markdown case.
pub fn render<T: Serialize>(
    report: &T,
    format: OutputFormat,
    markdown: impl FnOnce(&T) -> String,
) -> Result<String> {
    match format {
        OutputFormat::Markdown => Ok(markdown(report)),
        OutputFormat::Json => generate_json_report(report),
    }
}

/// Write rendered report content to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}
