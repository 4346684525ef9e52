//! Analysis modules.
//!
//! Cross-sample aggregation of stored artifacts and the in-memory
//! single-sample comparison across analyzers.

pub mod aggregator;
pub mod comparator;
pub mod depth;

pub use aggregator::*;
pub use comparator::*;
pub use depth::*;
