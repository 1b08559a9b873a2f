//! Minimal statistics for the Quorum routing and experimentation engine.
//!
//! This crate deliberately implements only what the engine needs:
//! Welford running aggregates for incremental metric caches, min-max
//! normalization for composite routing scores, and two significance
//! tests (Welch's t-test, two-proportion z-test) for experiment
//! analysis. Everything is pure and deterministic.

pub mod descriptive;
pub mod inference;

pub use descriptive::{min_max_normalize, RunningStats};
pub use inference::{two_proportion_z_test, welch_t_test, SampleSummary, Significance};
