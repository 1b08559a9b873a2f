//! Static model catalog: pricing, capabilities, context limits.
//!
//! Pure lookups over an immutable in-memory table built at process
//! start. The registry owns `Model` definitions exclusively; nothing
//! mutates them at runtime.

use crate::error::{EngineError, Result};
use crate::types::{RoutingStrategy, TaskType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Immutable catalog entry for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Globally unique model id.
    pub id: String,
    /// Provider name (e.g. "claude", "openai", "gemini").
    pub provider: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Capability tags such as "code-generation", "vision", "reasoning".
    pub capabilities: BTreeSet<String>,
    /// Cost per 1K input tokens in USD.
    pub cost_per_1k_input: f64,
    /// Cost per 1K output tokens in USD.
    pub cost_per_1k_output: f64,
    /// Maximum context size in tokens.
    pub max_context_tokens: u32,
    /// Published average latency in milliseconds.
    pub avg_latency_ms: u64,
    /// Published baseline quality score (0-100), used when a model has
    /// no recorded history yet.
    pub baseline_quality: f64,
}

impl Model {
    /// Published cost estimate for a nominal 1K-token request
    /// (half input, half output).
    #[must_use]
    pub fn nominal_request_cost(&self) -> f64 {
        0.5 * self.cost_per_1k_input + 0.5 * self.cost_per_1k_output
    }

    /// Derived cost-efficiency score: baseline quality per blended
    /// dollar. Higher is better.
    #[must_use]
    pub fn cost_efficiency(&self) -> f64 {
        self.baseline_quality / self.nominal_request_cost().max(f64::EPSILON)
    }
}

/// In-memory model catalog.
pub struct ModelRegistry {
    /// Catalog keyed by model id.
    models: HashMap<String, Model>,
}

impl ModelRegistry {
    /// Creates a registry over the given catalog entries.
    #[must_use]
    pub fn new(models: Vec<Model>) -> Self {
        Self {
            models: models.into_iter().map(|m| (m.id.clone(), m)).collect(),
        }
    }

    /// Creates a registry seeded with the builtin default catalog.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(builtin_catalog())
    }

    /// Looks up a model by id.
    ///
    /// # Errors
    /// Returns `UnknownModel` if the id is not in the catalog.
    pub fn get(&self, id: &str) -> Result<&Model> {
        self.models
            .get(id)
            .ok_or_else(|| EngineError::UnknownModel(id.to_string()))
    }

    /// Lists catalog models, optionally filtered by capability tag.
    /// Ordered by id for determinism.
    #[must_use]
    pub fn list(&self, capability: Option<&str>) -> Vec<&Model> {
        let mut models: Vec<&Model> = self
            .models
            .values()
            .filter(|m| capability.is_none_or(|cap| m.capabilities.contains(cap)))
            .collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        models
    }

    /// The cheapest model by nominal request cost, None on an empty
    /// catalog. Ties broken by id.
    #[must_use]
    pub fn cheapest(&self) -> Option<&Model> {
        self.list(None).into_iter().min_by(|a, b| {
            a.nominal_request_cost()
                .total_cmp(&b.nominal_request_cost())
                .then_with(|| a.id.cmp(&b.id))
        })
    }

    /// The fastest model by published latency, None on an empty catalog.
    #[must_use]
    pub fn fastest(&self) -> Option<&Model> {
        self.list(None)
            .into_iter()
            .min_by(|a, b| a.avg_latency_ms.cmp(&b.avg_latency_ms).then_with(|| a.id.cmp(&b.id)))
    }

    /// Distinct provider names in the catalog.
    #[must_use]
    pub fn providers(&self) -> BTreeSet<&str> {
        self.models.values().map(|m| m.provider.as_str()).collect()
    }

    /// Recommends models for a task, ordered by published fitness for
    /// the strategy (best first).
    ///
    /// Filters by the capability the task type implies; if no catalog
    /// model carries that capability, the whole catalog is considered
    /// so recommendations are never empty for a non-empty catalog.
    #[must_use]
    pub fn recommend(&self, task: TaskType, strategy: RoutingStrategy) -> Vec<&Model> {
        let mut candidates = match task_capability(task) {
            Some(cap) => {
                let filtered = self.list(Some(cap));
                if filtered.is_empty() {
                    self.list(None)
                } else {
                    filtered
                }
            }
            None => self.list(None),
        };

        candidates.sort_by(|a, b| {
            let ordering = match strategy {
                RoutingStrategy::BestQuality => b.baseline_quality.total_cmp(&a.baseline_quality),
                RoutingStrategy::BestCost => {
                    a.nominal_request_cost().total_cmp(&b.nominal_request_cost())
                }
                RoutingStrategy::Fastest => a.avg_latency_ms.cmp(&b.avg_latency_ms),
                RoutingStrategy::Balanced => b.cost_efficiency().total_cmp(&a.cost_efficiency()),
            };
            ordering.then_with(|| a.id.cmp(&b.id))
        });
        candidates
    }

    /// Number of catalog entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Capability tag a task type implies, if any.
fn task_capability(task: TaskType) -> Option<&'static str> {
    match task {
        TaskType::WebsiteAnalysis | TaskType::SentimentAnalysis | TaskType::LeadScoring => {
            Some("structured-output")
        }
        TaskType::CodeGeneration => Some("code-generation"),
        TaskType::EmailWriting | TaskType::Conversation => Some("conversation"),
        TaskType::Generic => None,
    }
}

fn caps(tags: &[&str]) -> BTreeSet<String> {
    tags.iter().map(|t| (*t).to_string()).collect()
}

/// Builtin default catalog with published metadata for common models.
#[must_use]
pub fn builtin_catalog() -> Vec<Model> {
    vec![
        Model {
            id: "claude-sonnet-4.5".to_string(),
            provider: "claude".to_string(),
            display_name: "Claude Sonnet 4.5".to_string(),
            capabilities: caps(&[
                "code-generation",
                "reasoning",
                "structured-output",
                "conversation",
                "vision",
            ]),
            cost_per_1k_input: 0.003,
            cost_per_1k_output: 0.015,
            max_context_tokens: 200_000,
            avg_latency_ms: 2000,
            baseline_quality: 92.0,
        },
        Model {
            id: "claude-haiku-4.5".to_string(),
            provider: "claude".to_string(),
            display_name: "Claude Haiku 4.5".to_string(),
            capabilities: caps(&["code-generation", "structured-output", "conversation"]),
            cost_per_1k_input: 0.000_25,
            cost_per_1k_output: 0.001_25,
            max_context_tokens: 200_000,
            avg_latency_ms: 500,
            baseline_quality: 80.0,
        },
        Model {
            id: "gpt-4-turbo".to_string(),
            provider: "openai".to_string(),
            display_name: "GPT-4 Turbo".to_string(),
            capabilities: caps(&[
                "code-generation",
                "reasoning",
                "structured-output",
                "conversation",
                "vision",
            ]),
            cost_per_1k_input: 0.01,
            cost_per_1k_output: 0.03,
            max_context_tokens: 128_000,
            avg_latency_ms: 2500,
            baseline_quality: 90.0,
        },
        Model {
            id: "gpt-3.5-turbo".to_string(),
            provider: "openai".to_string(),
            display_name: "GPT-3.5 Turbo".to_string(),
            capabilities: caps(&["structured-output", "conversation"]),
            cost_per_1k_input: 0.0015,
            cost_per_1k_output: 0.002,
            max_context_tokens: 16_000,
            avg_latency_ms: 800,
            baseline_quality: 74.0,
        },
        Model {
            id: "gemini-pro".to_string(),
            provider: "gemini".to_string(),
            display_name: "Gemini Pro".to_string(),
            capabilities: caps(&["reasoning", "structured-output", "conversation", "vision"]),
            cost_per_1k_input: 0.000_5,
            cost_per_1k_output: 0.001_5,
            max_context_tokens: 1_000_000,
            avg_latency_ms: 1200,
            baseline_quality: 85.0,
        },
        Model {
            id: "gemini-flash".to_string(),
            provider: "gemini".to_string(),
            display_name: "Gemini Flash".to_string(),
            capabilities: caps(&["structured-output", "conversation"]),
            cost_per_1k_input: 0.000_2,
            cost_per_1k_output: 0.000_8,
            max_context_tokens: 1_000_000,
            avg_latency_ms: 400,
            baseline_quality: 76.0,
        },
    ]
}
