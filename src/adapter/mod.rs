//! Adapters for the external collaborators.
//!
//! This module provides the analyzer capability contract with its per-model
//! dispatch set, and the per-sample alignment preparer.

pub mod analyzer;
pub mod preparer;

pub use analyzer::{
    run_analyzer, Analyzer, AnalyzerError, AnalyzerSet, CancelFlag, CommandAnalyzer,
};
pub use preparer::{CommandPreparer, PrepareError, Preparer};
