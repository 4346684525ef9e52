//! ESS Batch - layer-wise evolutionary self-similarity across models
//!
//! A CLI tool that runs several protein representation models over a set of
//! Pfam families, stores one per-layer correlation sequence per model, family
//! and statistic, and aggregates them on a common percentage-of-depth axis.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, I/O, missing alignment in compare mode, etc.)
//!   2 - Batch tasks failed and --fail-on-error was set

mod adapter;
mod analysis;
mod cli;
mod config;
mod models;
mod orchestrator;
mod registry;
mod report;
mod store;

use adapter::{AnalyzerSet, CommandPreparer};
use analysis::{AlignmentVariant, Aggregator, Comparator};
use anyhow::{bail, Context, Result};
use cli::{Args, Command};
use config::{Config, CONFIG_FILE};
use models::{AnalyzeOptions, AnalyzerKind, SampleId};
use orchestrator::{BatchOptions, BatchOrchestrator};
use registry::SampleRegistry;
use std::time::Duration;
use store::ResultStore;
use tracing::{debug, error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration before logging so the config can raise verbosity
    let (mut config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, &config);

    info!("ESS Batch v{}", env!("CARGO_PKG_VERSION"));
    info!("{}", config_source);
    debug!("Arguments: {:?}", args);

    let result = match args.command.clone() {
        Some(Command::Run { samples, analyzers }) => {
            run_batch(&args, &config, samples, analyzers).await
        }
        Some(Command::Compare { sample }) => run_compare(&config, &sample).await,
        Some(Command::Aggregate) => run_aggregate(&config),
        None => Ok(0),
    };

    match result {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .essbatch.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set samples, analyzers, and the analyzer/preparer commands.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// `RUST_LOG` takes precedence over the flags when set.
fn init_logging(args: &Args, config: &Config) {
    let level = if !args.quiet && config.general.verbose {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Load configuration from file or use defaults.
///
/// Returns the configuration and a line describing where it came from.
fn load_config(args: &Args) -> Result<(Config, String)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, format!("Loaded config from {}", config_path.display())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, format!("Loaded default config from {}", CONFIG_FILE))),
        Ok(None) => Ok((Config::default(), "No config file found, using defaults".to_string())),
        Err(e) => Ok((
            Config::default(),
            format!("Failed to load config ({:#}), using defaults", e),
        )),
    }
}

fn analyze_options(config: &Config) -> AnalyzeOptions {
    AnalyzeOptions {
        shuffle: config.analyzers.shuffle.into(),
        column_attention: config.analyzers.column_attention.into(),
    }
}

fn analyzer_timeout(config: &Config) -> Option<Duration> {
    config.analyzers.timeout_seconds.map(Duration::from_secs)
}

/// Batch mode: every configured sample against every batch analyzer.
async fn run_batch(
    args: &Args,
    config: &Config,
    samples: Option<Vec<String>>,
    analyzers: Option<Vec<AnalyzerKind>>,
) -> Result<i32> {
    let mut registry = SampleRegistry::from_config(config, ".");
    if let Some(ref ids) = samples {
        registry.restrict_samples(ids);
    }
    if let Some(ref kinds) = analyzers {
        registry.restrict_analyzers(kinds);
    }

    let store = ResultStore::new(&config.general.output_dir);
    store
        .ensure_dir()
        .context("Failed to create the result directory")?;

    println!("🧬 Running batch analysis");
    println!("   Samples: {}", registry.samples().len());
    println!(
        "   Analyzers: {}",
        registry
            .batch_analyzers()
            .iter()
            .map(|a| a.id().to_uppercase())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("   Results: {}\n", store.dir().display());

    let options = BatchOptions {
        analyze: analyze_options(config),
        timeout: analyzer_timeout(config),
        show_progress: !args.quiet,
    };

    let orchestrator = BatchOrchestrator::new(
        registry,
        AnalyzerSet::from_config(&config.analyzers),
        CommandPreparer::from_config(&config.preparer),
        store.clone(),
        options,
    );

    let batch = orchestrator.run().await;

    let json_path = store.dir().join("batch_report.json");
    report::write_report(&report::generate_json_report(&batch)?, &json_path)?;
    if config.report.format == cli::OutputFormat::Markdown {
        let md_path = store.dir().join("batch_report.md");
        report::write_report(&report::generate_batch_markdown(&batch), &md_path)?;
    }

    for failure in batch.failures() {
        debug!(
            "Failed: {} - {}: {}",
            failure.analyzer,
            failure.sample,
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }

    println!("\n🎯 All analyses complete!");
    println!(
        "Summary → Passed {} | Failed {} | Total {}",
        batch.tally.passed, batch.tally.failed, batch.tally.total
    );
    println!("Results saved in {}", store.dir().display());

    if args.fail_on_error && batch.tally.failed > 0 {
        eprintln!(
            "\n⛔ {} task(s) failed. Failing (exit code 2).",
            batch.tally.failed
        );
        return Ok(2);
    }

    Ok(0)
}

/// Single-sample mode: seed and full alignments through every compare analyzer.
async fn run_compare(config: &Config, sample: &str) -> Result<i32> {
    let registry = SampleRegistry::from_config(config, ".");
    let sample = SampleId::new(sample.trim());

    let variants = vec![
        AlignmentVariant::new("Seed", registry.seed_alignment(&sample)),
        AlignmentVariant::new("Full", registry.full_alignment(&sample)),
    ];
    for variant in &variants {
        if !variant.path.exists() {
            bail!(
                "{} alignment not found at {}",
                variant.name,
                variant.path.display()
            );
        }
    }

    println!("🔬 Comparing analyzers on {}", sample);
    let comparator = Comparator::new(
        AnalyzerSet::from_config(&config.analyzers),
        analyze_options(config),
        analyzer_timeout(config),
    );
    let comparison = comparator
        .compare(&sample, &variants, registry.compare_analyzers())
        .await;

    let failed = comparison.failures().count();
    if failed == 0 {
        println!("\nAll models and alignments processed successfully.\n");
    } else {
        println!("\n⚠️  {} model/alignment pair(s) failed.\n", failed);
    }

    let store = ResultStore::new(&config.general.output_dir);
    store
        .ensure_dir()
        .context("Failed to create the result directory")?;

    let format = config.report.format;
    let content = report::render(&comparison, format, report::generate_comparison_markdown)?;
    let path = store
        .dir()
        .join(format!("compare_{}.{}", sample, format.extension()));
    report::write_report(&content, &path)?;

    println!("📈 Saved {}", path.display());
    Ok(0)
}

/// Aggregate every stored artifact across samples.
fn run_aggregate(config: &Config) -> Result<i32> {
    let store = ResultStore::new(&config.general.output_dir);
    let registry = SampleRegistry::from_config(config, ".");

    println!("📦 Aggregating results in {}", store.dir().display());
    let summary = Aggregator::new(&store).aggregate_all(registry.batch_analyzers());

    for aggregate in &summary.aggregates {
        println!(
            "   {} - {}: {} samples, {} layers",
            aggregate.analyzer.id().to_uppercase(),
            aggregate.statistic.suffix(),
            aggregate.samples.len(),
            aggregate.layers()
        );
    }

    store
        .ensure_dir()
        .context("Failed to create the result directory")?;

    let format = config.report.format;
    let content = report::render(&summary, format, report::generate_aggregate_markdown)?;
    let path = store
        .dir()
        .join(format!("aggregate_report.{}", format.extension()));
    report::write_report(&content, &path)?;

    println!("\n✅ Done. Aggregate report saved to {}", path.display());
    Ok(0)
}
