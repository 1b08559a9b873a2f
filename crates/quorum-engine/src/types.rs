//! Core types shared across the routing and experimentation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Task type a model invocation belongs to.
///
/// Closed enumeration: every aggregate and experiment is scoped by task
/// type, and performance for one model is never averaged across types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    /// Structured analysis of a website.
    WebsiteAnalysis,
    /// Outbound email drafting.
    EmailWriting,
    /// Code generation and refactoring.
    CodeGeneration,
    /// Sentiment classification.
    SentimentAnalysis,
    /// Lead scoring and qualification.
    LeadScoring,
    /// Free-form conversation.
    Conversation,
    /// Anything without a specialized rubric.
    Generic,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskType::WebsiteAnalysis => "website-analysis",
            TaskType::EmailWriting => "email-writing",
            TaskType::CodeGeneration => "code-generation",
            TaskType::SentimentAnalysis => "sentiment-analysis",
            TaskType::LeadScoring => "lead-scoring",
            TaskType::Conversation => "conversation",
            TaskType::Generic => "generic",
        };
        write!(f, "{name}")
    }
}

impl TaskType {
    /// Converts a string to a TaskType.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "website-analysis" => Some(TaskType::WebsiteAnalysis),
            "email-writing" => Some(TaskType::EmailWriting),
            "code-generation" => Some(TaskType::CodeGeneration),
            "sentiment-analysis" => Some(TaskType::SentimentAnalysis),
            "lead-scoring" => Some(TaskType::LeadScoring),
            "conversation" => Some(TaskType::Conversation),
            "generic" => Some(TaskType::Generic),
            _ => None,
        }
    }
}

/// Routing strategy for model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Rank by mean quality descending.
    BestQuality,
    /// Rank by mean cost ascending among models meeting the quality floor.
    BestCost,
    /// Rank by mean latency ascending among models meeting the quality floor.
    Fastest,
    /// Composite of normalized quality, cost and latency.
    Balanced,
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoutingStrategy::BestQuality => "best_quality",
            RoutingStrategy::BestCost => "best_cost",
            RoutingStrategy::Fastest => "fastest",
            RoutingStrategy::Balanced => "balanced",
        };
        write!(f, "{name}")
    }
}

impl RoutingStrategy {
    /// Converts a string to a RoutingStrategy.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "best_quality" => Some(RoutingStrategy::BestQuality),
            "best_cost" => Some(RoutingStrategy::BestCost),
            "fastest" => Some(RoutingStrategy::Fastest),
            "balanced" => Some(RoutingStrategy::Balanced),
            _ => None,
        }
    }
}

/// Optional constraints applied while routing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteConstraints {
    /// Minimum acceptable quality score (0-100).
    pub min_quality_score: Option<f64>,
    /// Maximum acceptable cost per request in USD.
    pub max_cost_per_request: Option<f64>,
}

/// One model invocation as submitted by the caller.
///
/// The tracker derives the stored cost from token counts and catalog
/// rates unless `cost_usd` is supplied explicitly (experiment results
/// arrive with their cost already computed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Model that served the request.
    pub model_id: String,
    /// Task type the request belonged to.
    pub task_type: TaskType,
    /// Input token count.
    pub tokens_in: u32,
    /// Output token count.
    pub tokens_out: u32,
    /// Explicit cost override in USD; derived from tokens when absent.
    pub cost_usd: Option<f64>,
    /// Wall-clock latency in milliseconds.
    pub latency_ms: u64,
    /// Quality score in [0, 100], if already scored.
    pub quality_score: Option<f64>,
    /// Whether the invocation errored.
    pub error: bool,
    /// Experiment tag (`"{test}:{variant}"`) for A/B result rows.
    pub experiment_tag: Option<String>,
}

impl ExecutionRecord {
    /// Creates a record for a plain (non-experiment) invocation.
    #[must_use]
    pub fn new(model_id: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            model_id: model_id.into(),
            task_type,
            tokens_in: 0,
            tokens_out: 0,
            cost_usd: None,
            latency_ms: 0,
            quality_score: None,
            error: false,
            experiment_tag: None,
        }
    }
}

/// User feedback attached to a metric after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    /// Whether the user approved the output.
    pub approved: bool,
    /// Levenshtein-style edit distance of the user's correction.
    pub edit_distance: Option<u32>,
    /// Star rating, 1-5.
    pub rating: Option<u8>,
}

/// One persisted execution metric. Core fields are immutable after
/// recording; only `feedback` may be appended later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetric {
    /// Opaque metric id.
    pub id: Uuid,
    /// Model that served the request.
    pub model_id: String,
    /// Task type the request belonged to.
    pub task_type: TaskType,
    /// Input token count.
    pub tokens_in: u32,
    /// Output token count.
    pub tokens_out: u32,
    /// Cost in USD.
    pub cost_usd: f64,
    /// Wall-clock latency in milliseconds.
    pub latency_ms: u64,
    /// Quality score in [0, 100], if scored.
    pub quality_score: Option<f64>,
    /// Append-only user feedback.
    pub feedback: Option<Feedback>,
    /// Whether the invocation errored.
    pub error: bool,
    /// Experiment tag for A/B result rows.
    pub experiment_tag: Option<String>,
    /// Recording timestamp.
    pub created_at: DateTime<Utc>,
}

/// Windowed per-(model, task) statistics.
///
/// Returned only when at least one record falls inside the window, so
/// "no data" is an explicit `None` at the call site and never reads as
/// zero quality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    /// Records inside the window.
    pub count: u64,
    /// Mean quality over scored records, None if nothing was scored.
    pub mean_quality: Option<f64>,
    /// Mean cost in USD.
    pub mean_cost: f64,
    /// Mean latency in milliseconds.
    pub mean_latency_ms: f64,
    /// Share of approved feedback, None without any feedback.
    pub approval_rate: Option<f64>,
}

/// Per-model slice of a cost analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCost {
    /// Model id.
    pub model_id: String,
    /// Requests inside the window.
    pub request_count: u64,
    /// Total cost in USD.
    pub total_cost: f64,
}

/// Cost analysis over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostAnalysis {
    /// Total cost across all models in the window.
    pub total_cost: f64,
    /// Cost broken down by model, most expensive first.
    pub cost_by_model: Vec<ModelCost>,
    /// Cost that could have been avoided by using a cheaper model of
    /// comparable quality (see tracker quality tolerance).
    pub potential_savings: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_round_trip() {
        for task in [
            TaskType::WebsiteAnalysis,
            TaskType::EmailWriting,
            TaskType::CodeGeneration,
            TaskType::SentimentAnalysis,
            TaskType::LeadScoring,
            TaskType::Conversation,
            TaskType::Generic,
        ] {
            assert_eq!(TaskType::from_str(&task.to_string()), Some(task));
        }
        assert_eq!(TaskType::from_str("unknown"), None);
    }

    #[test]
    fn test_strategy_round_trip() {
        for strategy in [
            RoutingStrategy::BestQuality,
            RoutingStrategy::BestCost,
            RoutingStrategy::Fastest,
            RoutingStrategy::Balanced,
        ] {
            assert_eq!(RoutingStrategy::from_str(&strategy.to_string()), Some(strategy));
        }
        assert_eq!(RoutingStrategy::from_str("cheapest"), None);
    }

    #[test]
    fn test_task_type_serde_kebab_case() {
        let json = serde_json::to_string(&TaskType::WebsiteAnalysis).unwrap();
        assert_eq!(json, "\"website-analysis\"");
    }
}
