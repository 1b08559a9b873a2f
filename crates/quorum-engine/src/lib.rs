//! Model routing and experimentation engine for Quorum.
//!
//! Combines a model catalog, an append-only performance tracker,
//! deterministic quality scoring, strategy-based routing and A/B
//! experiments into one synchronous, thread-safe engine. All state is
//! in-memory; callers own persistence and scheduling.

pub mod catalog;
pub mod error;
pub mod experiment;
pub mod registry;
pub mod routing;
pub mod scoring;
pub mod tracker;
pub mod types;

pub use catalog::{CatalogError, CatalogLoader, EngineConfig};
pub use error::{EngineError, Result};
pub use experiment::{
    AbTest, AbTestManager, AnalysisConfig, TargetMetric, TestAnalysis, TestConfig, TestStatus,
    Variant, VariantStats, Winner,
};
pub use registry::{Model, ModelRegistry};
pub use routing::{CouncilDiversity, ModelRouter, RouterConfig};
pub use scoring::{QualityScorer, ScoreContext};
pub use tracker::{PerformanceTracker, TrackerConfig};
pub use types::{
    CostAnalysis, ExecutionMetric, ExecutionRecord, Feedback, ModelCost, ModelStats,
    RouteConstraints, RoutingStrategy, TaskType,
};
