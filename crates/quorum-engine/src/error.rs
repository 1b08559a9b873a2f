// Error types for the routing and experimentation engine

use crate::experiment::TestStatus;
use thiserror::Error;
use uuid::Uuid;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Catalog lookup miss. Fatal to the calling request, never retried
    /// internally.
    #[error("Unknown model: '{0}'")]
    UnknownModel(String),

    /// Routing constraints unsatisfiable. Recoverable via
    /// `route_with_fallback` or by the caller relaxing constraints.
    #[error("No eligible model for task '{task}' under strategy '{strategy}'")]
    NoEligibleModel {
        /// Task type that was being routed
        task: String,
        /// Strategy that produced no candidates
        strategy: String,
    },

    /// Council routing cannot satisfy the requested diversity
    #[error("Insufficient diversity: requested {needed} distinct providers, only {available} available")]
    InsufficientDiversity {
        /// Number of distinct providers requested
        needed: usize,
        /// Number of distinct providers in the catalog
        available: usize,
    },

    /// Experiment-state misuse by the caller
    #[error("Test '{name}' is not running (status: {status})")]
    TestNotRunning {
        /// Test name
        name: String,
        /// Current status of the test
        status: TestStatus,
    },

    /// Invalid experiment state transition
    #[error("Test '{name}': cannot transition from {from} to {to}")]
    InvalidTransition {
        /// Test name
        name: String,
        /// Current status
        from: TestStatus,
        /// Requested status
        to: TestStatus,
    },

    /// A test with this name already exists
    #[error("Test '{0}' already exists")]
    TestExists(String),

    /// No test with this name
    #[error("Unknown test: '{0}'")]
    UnknownTest(String),

    /// Variant name not part of the test
    #[error("Test '{test}' has no variant '{variant}'")]
    UnknownVariant {
        /// Test name
        test: String,
        /// Variant name
        variant: String,
    },

    /// Feedback referencing an unknown metric id
    #[error("No execution metric with id {0}")]
    NotFound(Uuid),

    /// Malformed execution record rejected at validation
    #[error("Invalid execution metric: {0}")]
    InvalidMetric(String),

    /// Malformed A/B test configuration rejected at `create_test`
    #[error("Invalid test configuration: {0}")]
    InvalidTestConfig(String),
}
