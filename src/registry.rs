//! Sample registry.
//!
//! The fixed list of samples and analyzers a run covers, plus the lookup of
//! each sample's alignment files.

use crate::config::{expand_template, Config};
use crate::models::{AnalyzerKind, SampleId};
use std::path::PathBuf;

/// Static description of what a run covers.
#[derive(Debug, Clone)]
pub struct SampleRegistry {
    samples: Vec<SampleId>,
    batch_analyzers: Vec<AnalyzerKind>,
    compare_analyzers: Vec<AnalyzerKind>,
    seed_template: String,
    full_template: String,
    root: PathBuf,
}

impl SampleRegistry {
    /// Build the registry from configuration, resolving alignment
    /// templates relative to `root`.
    pub fn from_config(config: &Config, root: impl Into<PathBuf>) -> Self {
        Self {
            samples: dedup(config.samples.ids.iter().map(|id| SampleId::new(id.trim()))),
            batch_analyzers: dedup(config.analyzers.batch.iter().copied()),
            compare_analyzers: dedup(config.analyzers.compare.iter().copied()),
            seed_template: config.samples.seed_alignment.clone(),
            full_template: config.samples.full_alignment.clone(),
            root: root.into(),
        }
    }

    pub fn samples(&self) -> &[SampleId] {
        &self.samples
    }

    pub fn batch_analyzers(&self) -> &[AnalyzerKind] {
        &self.batch_analyzers
    }

    pub fn compare_analyzers(&self) -> &[AnalyzerKind] {
        &self.compare_analyzers
    }

    /// Keep only the given samples (in registry order). Unknown ids are
    /// appended so an ad hoc family can still be run.
    pub fn restrict_samples(&mut self, ids: &[String]) {
        let wanted: Vec<SampleId> = dedup(ids.iter().map(|id| SampleId::new(id.trim())));
        let mut kept: Vec<SampleId> = self
            .samples
            .iter()
            .filter(|s| wanted.contains(s))
            .cloned()
            .collect();
        for id in wanted {
            if !kept.contains(&id) {
                kept.push(id);
            }
        }
        self.samples = kept;
    }

    pub fn restrict_analyzers(&mut self, analyzers: &[AnalyzerKind]) {
        self.batch_analyzers = dedup(analyzers.iter().copied());
    }

    /// Seed alignment consumed by the preparer and every batch analyzer.
    pub fn seed_alignment(&self, sample: &SampleId) -> PathBuf {
        self.resolve(&self.seed_template, sample)
    }

    /// Full alignment, used only in single-sample comparisons.
    pub fn full_alignment(&self, sample: &SampleId) -> PathBuf {
        self.resolve(&self.full_template, sample)
    }

    fn resolve(&self, template: &str, sample: &SampleId) -> PathBuf {
        let path = expand_template(template, sample.as_str());
        if path.is_absolute() {
            path
        } else {
            self.root.join(path)
        }
    }
}

fn dedup<T: PartialEq>(items: impl Iterator<Item = T>) -> Vec<T> {
    let mut out = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SampleRegistry {
        let mut config = Config::default();
        config.samples.ids = vec!["F1".into(), "F2".into(), "F1".into(), "F3".into()];
        SampleRegistry::from_config(&config, "/data")
    }

    #[test]
    fn test_from_config_dedups_in_order() {
        let reg = registry();
        let ids: Vec<_> = reg.samples().iter().map(|s| s.as_str()).collect();
        assert_eq!(ids, vec!["F1", "F2", "F3"]);
        assert_eq!(reg.batch_analyzers().len(), 5);
    }

    #[test]
    fn test_alignment_paths() {
        let reg = registry();
        let sample = SampleId::new("F2");
        assert_eq!(reg.seed_alignment(&sample), PathBuf::from("/data/F2/F2.aln"));
        assert_eq!(reg.full_alignment(&sample), PathBuf::from("/data/F2_f/F2_f.aln"));
    }

    #[test]
    fn test_restrict_samples_keeps_registry_order() {
        let mut reg = registry();
        reg.restrict_samples(&["F3".to_string(), "F1".to_string(), "F9".to_string()]);
        let ids: Vec<_> = reg.samples().iter().map(|s| s.as_str()).collect();
        assert_eq!(ids, vec!["F1", "F3", "F9"]);
    }

    #[test]
    fn test_restrict_analyzers() {
        let mut reg = registry();
        reg.restrict_analyzers(&[AnalyzerKind::Msa, AnalyzerKind::Msa, AnalyzerKind::Pt]);
        assert_eq!(reg.batch_analyzers(), &[AnalyzerKind::Msa, AnalyzerKind::Pt]);
    }
}
