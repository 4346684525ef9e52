//! Batch orchestrator.
//!
//! Samples are processed one at a time: the preparer runs once, then one
//! task per analyzer is spawned and the whole group is joined before the
//! next sample starts. Completions are collected by a single loop that owns
//! the pass/fail tally, so counters are only ever touched from one place.

use crate::adapter::{run_analyzer, AnalyzerSet, Preparer};
use crate::models::{
    AnalyzeOptions, AnalyzerKind, BatchReport, SampleId, Tally, TaskOutcome,
};
use crate::registry::SampleRegistry;
use crate::store::ResultStore;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Settings for a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub analyze: AnalyzeOptions,
    /// Per-analyzer timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Show a progress bar.
    pub show_progress: bool,
}

/// Runs every analyzer over every sample and persists the results.
pub struct BatchOrchestrator {
    registry: SampleRegistry,
    analyzers: AnalyzerSet,
    preparer: Arc<dyn Preparer>,
    store: ResultStore,
    options: BatchOptions,
}

impl BatchOrchestrator {
    pub fn new(
        registry: SampleRegistry,
        analyzers: AnalyzerSet,
        preparer: impl Preparer + 'static,
        store: ResultStore,
        options: BatchOptions,
    ) -> Self {
        Self {
            registry,
            analyzers,
            preparer: Arc::new(preparer),
            store,
            options,
        }
    }

    /// Run the configured samples against the configured batch analyzers.
    pub async fn run(&self) -> BatchReport {
        self.run_all(self.registry.samples(), self.registry.batch_analyzers())
            .await
    }

    /// Run `samples` × `analyzers`. Never fails: every pair ends up in the
    /// report as passed or failed.
    pub async fn run_all(&self, samples: &[SampleId], analyzers: &[AnalyzerKind]) -> BatchReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut tally = Tally::new(samples.len() * analyzers.len());
        let mut outcomes = Vec::with_capacity(tally.total);

        info!(
            "Batch run: {} samples x {} analyzers = {} tasks",
            samples.len(),
            analyzers.len(),
            tally.total
        );

        if let Err(e) = self.store.ensure_dir() {
            error!("Cannot create result directory: {}", e);
        }

        let progress = self.progress_bar(tally.total as u64);

        for sample in samples {
            let sample_outcomes = self
                .process_sample(sample, analyzers, &mut tally, &progress)
                .await;
            outcomes.extend(sample_outcomes);
        }

        progress.finish_and_clear();
        info!("Batch complete: {}", tally);

        BatchReport {
            started_at,
            duration_seconds: start.elapsed().as_secs_f64(),
            tally,
            outcomes,
        }
    }

    /// Prepare one sample and run its analyzer group to completion.
    async fn process_sample(
        &self,
        sample: &SampleId,
        analyzers: &[AnalyzerKind],
        tally: &mut Tally,
        progress: &ProgressBar,
    ) -> Vec<TaskOutcome> {
        let seed_alignment = self.registry.seed_alignment(sample);

        let prepared = if !seed_alignment.exists() {
            Err(format!(
                "missing alignment file {}",
                seed_alignment.display()
            ))
        } else {
            let preparer = Arc::clone(&self.preparer);
            let prep_sample = sample.clone();
            let prep_path = seed_alignment.clone();
            match tokio::task::spawn_blocking(move || preparer.prepare(&prep_sample, &prep_path))
                .await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(format!("preparation failed: {}", e)),
                Err(e) => Err(format!("preparation panicked: {}", e)),
            }
        };

        if let Err(reason) = prepared {
            warn!("⚠️ Skipping {}: {}", sample, reason);
            progress.println(format!("⚠️  {} skipped: {}", sample, reason));

            let mut outcomes = Vec::with_capacity(analyzers.len());
            for &analyzer in analyzers {
                self.discard_stale(analyzer, sample);
                tally.record(false);
                progress.inc(1);
                outcomes.push(TaskOutcome::failed(sample.clone(), analyzer, reason.clone()));
            }
            progress.set_message(tally.to_string());
            return outcomes;
        }

        debug!("Prep done for {}", sample);
        progress.println(format!("✅ Prep done for {}", sample));

        let mut tasks = JoinSet::new();
        for &analyzer in analyzers {
            let analyzers = self.analyzers.clone();
            let store = self.store.clone();
            let sample = sample.clone();
            let alignment = seed_alignment.clone();
            let options = self.options.analyze;
            let timeout = self.options.timeout;

            tasks.spawn(async move {
                let result = run_analyzer(&analyzers, analyzer, alignment, options, timeout).await;
                match result {
                    Ok(correlations) => match store.write_pair(analyzer, &sample, &correlations) {
                        Ok(()) => TaskOutcome::passed(sample, analyzer, correlations.layers()),
                        Err(e) => {
                            // Do not leave one statistic behind without the other
                            let _ = store.remove_pair(analyzer, &sample);
                            TaskOutcome::failed(sample, analyzer, e.to_string())
                        }
                    },
                    Err(e) => TaskOutcome::failed(sample, analyzer, e.to_string()),
                }
            });
        }

        let mut outcomes = Vec::with_capacity(analyzers.len());
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    // The task body never panics on its own; a join error
                    // means the runtime cancelled it. The pair is settled
                    // below once every task has been joined.
                    error!("An analyzer task for {} aborted: {}", sample, e);
                    continue;
                }
            };

            if !outcome.success {
                self.discard_stale(outcome.analyzer, &outcome.sample);
            }
            tally.record(outcome.success);
            progress.inc(1);
            progress.set_message(tally.to_string());

            let line = if outcome.success {
                format!(
                    "✅ {} - {} | {}",
                    outcome.analyzer.id().to_uppercase(),
                    outcome.sample,
                    tally
                )
            } else {
                let reason = outcome.error.as_deref().unwrap_or("unknown error");
                warn!(
                    "{} - {} failed: {}",
                    outcome.analyzer.id().to_uppercase(),
                    outcome.sample,
                    reason
                );
                format!(
                    "❌ {} - {} | {}",
                    outcome.analyzer.id().to_uppercase(),
                    outcome.sample,
                    tally
                )
            };
            progress.println(line);
            outcomes.push(outcome);
        }

        self.settle_vanished(sample, analyzers, &mut outcomes, tally, progress);

        // Report in analyzer order regardless of completion order
        outcomes.sort_by_key(|o| analyzers.iter().position(|a| *a == o.analyzer));
        outcomes
    }

    /// Record a failure for every pair of `sample` without an outcome, i.e.
    /// whose task vanished, and drop what an earlier run stored for it.
    fn settle_vanished(
        &self,
        sample: &SampleId,
        analyzers: &[AnalyzerKind],
        outcomes: &mut Vec<TaskOutcome>,
        tally: &mut Tally,
        progress: &ProgressBar,
    ) {
        for &analyzer in analyzers {
            if outcomes.iter().any(|o| o.analyzer == analyzer) {
                continue;
            }
            warn!(
                "{} - {} failed: analyzer task aborted",
                analyzer.id().to_uppercase(),
                sample
            );
            self.discard_stale(analyzer, sample);
            tally.record(false);
            progress.inc(1);
            outcomes.push(TaskOutcome::failed(
                sample.clone(),
                analyzer,
                "analyzer task aborted",
            ));
        }
    }

    /// Remove artifacts a previous run left for a pair that failed now.
    fn discard_stale(&self, analyzer: AnalyzerKind, sample: &SampleId) {
        if let Err(e) = self.store.remove_pair(analyzer, sample) {
            warn!("Could not remove stale artifacts for {} - {}: {}", analyzer, sample, e);
        }
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Analyzer, AnalyzerError, CancelFlag, PrepareError};
    use crate::config::Config;
    use crate::models::{LayerCorrelations, StatisticKind};
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Returns `layers` values derived from the alignment path, or fails for
    /// the listed samples.
    struct FakeAnalyzer {
        layers: usize,
        fail_for: HashSet<String>,
    }

    impl FakeAnalyzer {
        fn new(layers: usize) -> Self {
            Self {
                layers,
                fail_for: HashSet::new(),
            }
        }

        fn failing_for(mut self, sample: &str) -> Self {
            self.fail_for.insert(sample.to_string());
            self
        }
    }

    impl Analyzer for FakeAnalyzer {
        fn analyze(
            &self,
            alignment: &Path,
            _options: &AnalyzeOptions,
            _cancel: &CancelFlag,
        ) -> Result<LayerCorrelations, AnalyzerError> {
            let name = alignment
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            if self.fail_for.contains(&name) {
                return Err(AnalyzerError::Failed(format!("forced failure on {}", name)));
            }
            let rank: Vec<f64> = (0..self.layers).map(|i| i as f64 / self.layers as f64).collect();
            let linear: Vec<f64> = rank.iter().map(|v| -v).collect();
            LayerCorrelations::new(rank, linear).map_err(AnalyzerError::Failed)
        }
    }

    /// Fails for listed samples and records every sample it prepared.
    #[derive(Default)]
    struct FakePreparer {
        fail_for: HashSet<String>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Preparer for FakePreparer {
        fn prepare(&self, sample: &SampleId, _seed: &Path) -> Result<(), PrepareError> {
            self.calls.lock().unwrap().push(sample.to_string());
            if self.fail_for.contains(sample.as_str()) {
                Err(PrepareError::Failed("prep exploded".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Prepare(String),
        Start(String),
        End(String),
    }

    /// Shared record of preparer and analyzer activity across a run.
    #[derive(Clone, Default)]
    struct Timeline {
        events: Arc<Mutex<Vec<Event>>>,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Timeline {
        fn push(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }

        fn position(&self, event: &Event) -> Option<usize> {
            self.events.lock().unwrap().iter().position(|e| e == event)
        }

        fn last_position(&self, event: &Event) -> Option<usize> {
            self.events.lock().unwrap().iter().rposition(|e| e == event)
        }

        fn count(&self, event: &Event) -> usize {
            self.events.lock().unwrap().iter().filter(|e| *e == event).count()
        }
    }

    struct RecordingAnalyzer(Timeline);

    impl Analyzer for RecordingAnalyzer {
        fn analyze(
            &self,
            alignment: &Path,
            _options: &AnalyzeOptions,
            _cancel: &CancelFlag,
        ) -> Result<LayerCorrelations, AnalyzerError> {
            let sample = alignment
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();

            self.0.push(Event::Start(sample.clone()));
            let now = self.0.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.0.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(100));
            self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.0.push(Event::End(sample));

            LayerCorrelations::new(vec![0.5; 3], vec![0.5; 3]).map_err(AnalyzerError::Failed)
        }
    }

    struct RecordingPreparer(Timeline);

    impl Preparer for RecordingPreparer {
        fn prepare(&self, sample: &SampleId, _seed: &Path) -> Result<(), PrepareError> {
            self.0.push(Event::Prepare(sample.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        _tmp: TempDir,
        registry: SampleRegistry,
        store: ResultStore,
    }

    fn fixture(samples: &[&str]) -> Fixture {
        let tmp = TempDir::new().unwrap();
        for sample in samples {
            let dir = tmp.path().join(sample);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(format!("{}.aln", sample)), ">seq\nMKV\n").unwrap();
        }

        let mut config = Config::default();
        config.samples.ids = samples.iter().map(|s| s.to_string()).collect();
        let registry = SampleRegistry::from_config(&config, tmp.path());
        let store = ResultStore::new(tmp.path().join("results"));

        Fixture {
            _tmp: tmp,
            registry,
            store,
        }
    }

    fn samples(ids: &[&str]) -> Vec<SampleId> {
        ids.iter().map(|s| SampleId::new(*s)).collect()
    }

    #[tokio::test]
    async fn test_preparation_failure_skips_sample() {
        let fx = fixture(&["F1", "F2"]);
        let mut analyzers = AnalyzerSet::new();
        analyzers.register(AnalyzerKind::Esm2, FakeAnalyzer::new(3));
        analyzers.register(AnalyzerKind::Msa, FakeAnalyzer::new(5));

        let preparer = FakePreparer {
            fail_for: ["F2".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let calls = Arc::clone(&preparer.calls);

        let orchestrator = BatchOrchestrator::new(
            fx.registry.clone(),
            analyzers,
            preparer,
            fx.store.clone(),
            BatchOptions::default(),
        );
        let kinds = [AnalyzerKind::Esm2, AnalyzerKind::Msa];
        let report = orchestrator.run_all(&samples(&["F1", "F2"]), &kinds).await;

        assert_eq!(report.tally.passed, 2);
        assert_eq!(report.tally.failed, 2);
        assert_eq!(report.tally.remaining(), 0);
        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(*calls.lock().unwrap(), vec!["F1", "F2"]);

        let f1 = SampleId::new("F1");
        let f2 = SampleId::new("F2");
        let esm2 = fx.store.read(AnalyzerKind::Esm2, &f1, StatisticKind::RankOrder).unwrap();
        let msa = fx.store.read(AnalyzerKind::Msa, &f1, StatisticKind::Linear).unwrap();
        assert_eq!(esm2.map(|v| v.len()), Some(3));
        assert_eq!(msa.map(|v| v.len()), Some(5));

        for kind in kinds {
            for statistic in StatisticKind::ALL {
                assert!(fx.store.read(kind, &f2, statistic).unwrap().is_none());
            }
            let outcome = report.outcome(&f2, kind).unwrap();
            assert!(!outcome.success);
            assert!(outcome.error.as_deref().unwrap().contains("preparation failed"));
        }
    }

    #[tokio::test]
    async fn test_missing_alignment_skips_preparer() {
        let fx = fixture(&["F1"]);
        let mut analyzers = AnalyzerSet::new();
        analyzers.register(AnalyzerKind::Pt, FakeAnalyzer::new(4));

        let preparer = FakePreparer::default();
        let calls = Arc::clone(&preparer.calls);
        let orchestrator = BatchOrchestrator::new(
            fx.registry.clone(),
            analyzers,
            preparer,
            fx.store.clone(),
            BatchOptions::default(),
        );

        let report = orchestrator
            .run_all(&samples(&["F1", "GHOST"]), &[AnalyzerKind::Pt])
            .await;

        assert_eq!(report.tally.passed, 1);
        assert_eq!(report.tally.failed, 1);
        assert_eq!(*calls.lock().unwrap(), vec!["F1"]);
        let ghost = report.outcome(&SampleId::new("GHOST"), AnalyzerKind::Pt).unwrap();
        assert!(ghost.error.as_deref().unwrap().contains("missing alignment"));
    }

    #[tokio::test]
    async fn test_single_analyzer_failure_is_isolated() {
        let fx = fixture(&["F1", "F2"]);
        let mut analyzers = AnalyzerSet::new();
        analyzers.register(AnalyzerKind::Esmc, FakeAnalyzer::new(31).failing_for("F1"));
        analyzers.register(AnalyzerKind::Esm1, FakeAnalyzer::new(34));

        let orchestrator = BatchOrchestrator::new(
            fx.registry.clone(),
            analyzers,
            FakePreparer::default(),
            fx.store.clone(),
            BatchOptions::default(),
        );
        let kinds = [AnalyzerKind::Esmc, AnalyzerKind::Esm1];
        let report = orchestrator.run_all(&samples(&["F1", "F2"]), &kinds).await;

        assert_eq!(report.tally.passed, 3);
        assert_eq!(report.tally.failed, 1);

        let f1 = SampleId::new("F1");
        let f2 = SampleId::new("F2");
        assert!(fx.store.read(AnalyzerKind::Esmc, &f1, StatisticKind::RankOrder).unwrap().is_none());
        assert!(fx.store.read(AnalyzerKind::Esmc, &f1, StatisticKind::Linear).unwrap().is_none());
        assert!(fx.store.read(AnalyzerKind::Esm1, &f1, StatisticKind::Linear).unwrap().is_some());
        assert!(fx.store.read(AnalyzerKind::Esmc, &f2, StatisticKind::Linear).unwrap().is_some());
        assert!(fx.store.read(AnalyzerKind::Esm1, &f2, StatisticKind::RankOrder).unwrap().is_some());

        // Outcomes follow analyzer order, not completion order
        let order: Vec<_> = report.outcomes.iter().map(|o| (o.sample.to_string(), o.analyzer)).collect();
        assert_eq!(
            order,
            vec![
                ("F1".to_string(), AnalyzerKind::Esmc),
                ("F1".to_string(), AnalyzerKind::Esm1),
                ("F2".to_string(), AnalyzerKind::Esmc),
                ("F2".to_string(), AnalyzerKind::Esm1),
            ]
        );
    }

    #[tokio::test]
    async fn test_unregistered_analyzer_counts_as_failure() {
        let fx = fixture(&["F1"]);
        let orchestrator = BatchOrchestrator::new(
            fx.registry.clone(),
            AnalyzerSet::new(),
            FakePreparer::default(),
            fx.store.clone(),
            BatchOptions::default(),
        );

        let report = orchestrator.run_all(&samples(&["F1"]), &[AnalyzerKind::Msa]).await;
        assert_eq!(report.tally.failed, 1);
        assert_eq!(report.failures().count(), 1);
    }

    #[tokio::test]
    async fn test_rerun_overwrites_and_failure_clears_stale() {
        let fx = fixture(&["F1"]);
        let f1 = SampleId::new("F1");

        let mut first = AnalyzerSet::new();
        first.register(AnalyzerKind::Pt, FakeAnalyzer::new(25));
        let run = BatchOrchestrator::new(
            fx.registry.clone(),
            first,
            FakePreparer::default(),
            fx.store.clone(),
            BatchOptions::default(),
        );
        run.run().await;
        let before = fx.store.read(AnalyzerKind::Pt, &f1, StatisticKind::RankOrder).unwrap();
        run.run().await;
        let again = fx.store.read(AnalyzerKind::Pt, &f1, StatisticKind::RankOrder).unwrap();
        assert_eq!(before, again);

        let mut second = AnalyzerSet::new();
        second.register(AnalyzerKind::Pt, FakeAnalyzer::new(25).failing_for("F1"));
        let rerun = BatchOrchestrator::new(
            fx.registry.clone(),
            second,
            FakePreparer::default(),
            fx.store.clone(),
            BatchOptions::default(),
        );
        let report = rerun.run_all(&samples(&["F1"]), &[AnalyzerKind::Pt]).await;

        assert_eq!(report.tally.failed, 1);
        assert!(fx.store.read(AnalyzerKind::Pt, &f1, StatisticKind::RankOrder).unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_analyzers_overlap_within_a_sample_but_not_across_samples() {
        let fx = fixture(&["F1", "F2"]);
        let timeline = Timeline::default();
        let kinds = [AnalyzerKind::Esm2, AnalyzerKind::Msa, AnalyzerKind::Pt];

        let mut analyzers = AnalyzerSet::new();
        for kind in kinds {
            analyzers.register(kind, RecordingAnalyzer(timeline.clone()));
        }

        let orchestrator = BatchOrchestrator::new(
            fx.registry.clone(),
            analyzers,
            RecordingPreparer(timeline.clone()),
            fx.store.clone(),
            BatchOptions::default(),
        );
        let report = orchestrator.run_all(&samples(&["F1", "F2"]), &kinds).await;
        assert_eq!(report.tally.passed, 6);

        let f1_end = Event::End("F1".to_string());
        assert_eq!(timeline.count(&f1_end), 3);
        assert_eq!(timeline.count(&Event::End("F2".to_string())), 3);

        // Every F1 call ended before F2 was prepared, and F2 calls start after that
        let last_f1_end = timeline.last_position(&f1_end).unwrap();
        let f2_prepared = timeline.position(&Event::Prepare("F2".to_string())).unwrap();
        let first_f2_start = timeline.position(&Event::Start("F2".to_string())).unwrap();
        assert!(last_f1_end < f2_prepared);
        assert!(f2_prepared < first_f2_start);

        let f1_prepared = timeline.position(&Event::Prepare("F1".to_string())).unwrap();
        assert!(f1_prepared < timeline.position(&Event::Start("F1".to_string())).unwrap());

        // The analyzers of one sample were in flight together
        assert!(timeline.peak.load(Ordering::SeqCst) >= 2);
        assert!(timeline.peak.load(Ordering::SeqCst) <= kinds.len());
    }

    #[tokio::test]
    async fn test_vanished_task_is_failed_and_clears_stale() {
        let fx = fixture(&["F1"]);
        let f1 = SampleId::new("F1");
        fx.store.ensure_dir().unwrap();
        let stale = LayerCorrelations::new(vec![0.1, 0.2], vec![0.3, 0.4]).unwrap();
        fx.store.write_pair(AnalyzerKind::Esm1, &f1, &stale).unwrap();

        let orchestrator = BatchOrchestrator::new(
            fx.registry.clone(),
            AnalyzerSet::new(),
            FakePreparer::default(),
            fx.store.clone(),
            BatchOptions::default(),
        );

        let mut outcomes = vec![TaskOutcome::passed(f1.clone(), AnalyzerKind::Msa, 13)];
        let mut tally = Tally::new(2);
        tally.record(true);
        orchestrator.settle_vanished(
            &f1,
            &[AnalyzerKind::Msa, AnalyzerKind::Esm1],
            &mut outcomes,
            &mut tally,
            &ProgressBar::hidden(),
        );

        assert_eq!(outcomes.len(), 2);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.remaining(), 0);
        let vanished = &outcomes[1];
        assert_eq!(vanished.analyzer, AnalyzerKind::Esm1);
        assert!(!vanished.success);
        for statistic in StatisticKind::ALL {
            assert!(fx.store.read(AnalyzerKind::Esm1, &f1, statistic).unwrap().is_none());
        }
    }
}
