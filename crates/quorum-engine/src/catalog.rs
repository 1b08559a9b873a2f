//! TOML configuration file support for the model catalog and engine
//! tunables.

use crate::experiment::AnalysisConfig;
use crate::registry::Model;
use crate::routing::RouterConfig;
use crate::tracker::TrackerConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during catalog loading.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// I/O error reading the file.
    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("Failed to parse TOML catalog: {0}")]
    Toml(#[from] toml::de::Error),

    /// Catalog validation error.
    #[error("Invalid catalog: {0}")]
    Validation(String),
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Engine configuration loaded from TOML: the model catalog plus
/// optional tunables for the router, tracker and experiment analysis.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Catalog entries.
    pub models: Vec<Model>,

    /// Router tunables.
    #[serde(default)]
    pub router: RouterConfig,

    /// Tracker tunables.
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Experiment analysis tunables.
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Configuration loader for the engine catalog.
pub struct CatalogLoader;

impl CatalogLoader {
    /// Loads engine configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<EngineConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;

        Self::validate(&config)?;

        Ok(config)
    }

    /// Validates an engine configuration.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid.
    pub fn validate(config: &EngineConfig) -> Result<()> {
        if config.models.is_empty() {
            return Err(CatalogError::Validation(
                "Catalog must contain at least one model".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for model in &config.models {
            if model.id.is_empty() {
                return Err(CatalogError::Validation(
                    "Model id must not be empty".to_string(),
                ));
            }
            if !seen.insert(model.id.as_str()) {
                return Err(CatalogError::Validation(format!(
                    "Duplicate model id: '{}'",
                    model.id
                )));
            }
            if model.cost_per_1k_input < 0.0 || model.cost_per_1k_output < 0.0 {
                return Err(CatalogError::Validation(format!(
                    "Model '{}': costs must be >= 0",
                    model.id
                )));
            }
            if !(0.0..=100.0).contains(&model.baseline_quality) {
                return Err(CatalogError::Validation(format!(
                    "Model '{}': baseline_quality must be between 0 and 100, got {}",
                    model.id, model.baseline_quality
                )));
            }
        }

        if config.router.lambda_cost < 0.0 || config.router.lambda_latency < 0.0 {
            return Err(CatalogError::Validation(
                "Router lambdas must be >= 0".to_string(),
            ));
        }
        if config.tracker.quality_tolerance < 0.0 {
            return Err(CatalogError::Validation(
                "Tracker quality_tolerance must be >= 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&config.analysis.confidence_threshold) {
            return Err(CatalogError::Validation(format!(
                "Analysis confidence_threshold must be between 0 and 1, got {}",
                config.analysis.confidence_threshold
            )));
        }

        Ok(())
    }
}
