//! Strategy-based model selection.

use crate::error::{EngineError, Result};
use crate::registry::{Model, ModelRegistry};
use crate::tracker::PerformanceTracker;
use crate::types::{RouteConstraints, RoutingStrategy, TaskType};
use quorum_stats::min_max_normalize;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Router tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Cost weight in the balanced composite score.
    #[serde(default = "default_lambda_cost")]
    pub lambda_cost: f64,
    /// Latency weight in the balanced composite score.
    #[serde(default = "default_lambda_latency")]
    pub lambda_latency: f64,
    /// Quality floor applied when the caller supplies no constraint.
    #[serde(default)]
    pub default_min_quality: f64,
}

fn default_lambda_cost() -> f64 {
    0.3
}

fn default_lambda_latency() -> f64 {
    0.2
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            lambda_cost: default_lambda_cost(),
            lambda_latency: default_lambda_latency(),
            default_min_quality: 0.0,
        }
    }
}

/// Diversity requirement for council selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouncilDiversity {
    /// No diversity constraint; take the top of the ranking.
    Any,
    /// At most one model per provider.
    Providers,
}

/// One model's routing view: historical aggregates where they exist,
/// published catalog numbers where they do not.
#[derive(Debug, Clone)]
struct Candidate {
    model: Model,
    quality: f64,
    cost: f64,
    latency_ms: f64,
    samples: u64,
}

/// Selects models for tasks under a strategy and constraints.
pub struct ModelRouter {
    /// Catalog for published baselines.
    registry: Arc<ModelRegistry>,
    /// Tracker for historical aggregates.
    tracker: Arc<PerformanceTracker>,
    /// Tunables.
    config: RouterConfig,
}

impl ModelRouter {
    /// Creates a router with default tunables.
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>, tracker: Arc<PerformanceTracker>) -> Self {
        Self::with_config(registry, tracker, RouterConfig::default())
    }

    /// Creates a router with explicit tunables.
    #[must_use]
    pub fn with_config(
        registry: Arc<ModelRegistry>,
        tracker: Arc<PerformanceTracker>,
        config: RouterConfig,
    ) -> Self {
        Self {
            registry,
            tracker,
            config,
        }
    }

    /// Selects a model for a task.
    ///
    /// Models without history fall back to the catalog's published
    /// baseline quality, nominal request cost and published latency.
    /// Ties break by higher sample count, then lexicographic model id,
    /// so repeated calls with unchanged inputs are deterministic.
    ///
    /// # Errors
    /// `NoEligibleModel` when no model satisfies the constraints.
    pub fn route(
        &self,
        task: TaskType,
        strategy: RoutingStrategy,
        constraints: Option<RouteConstraints>,
    ) -> Result<Model> {
        let ranked = self.ranked(task, strategy, constraints)?;
        let selected = ranked[0].model.clone();

        info!(
            task = %task,
            strategy = %strategy,
            model_id = %selected.id,
            samples = ranked[0].samples,
            "Routing decision made"
        );
        Ok(selected)
    }

    /// Routes with the preferred strategy, falling back to a second
    /// strategy (with constraints relaxed to defaults) when the
    /// preferred one has no eligible model.
    ///
    /// # Errors
    /// Propagates the fallback strategy's error if it also fails.
    pub fn route_with_fallback(
        &self,
        task: TaskType,
        preferred: RoutingStrategy,
        fallback: RoutingStrategy,
        constraints: Option<RouteConstraints>,
    ) -> Result<Model> {
        match self.route(task, preferred, constraints) {
            Ok(model) => Ok(model),
            Err(EngineError::NoEligibleModel { .. }) => {
                warn!(
                    task = %task,
                    preferred = %preferred,
                    fallback = %fallback,
                    "Preferred strategy had no eligible model, retrying with fallback"
                );
                self.route(task, fallback, None)
            }
            Err(other) => Err(other),
        }
    }

    /// Selects `n` distinct models for a council.
    ///
    /// With `CouncilDiversity::Providers` at most one model per
    /// provider is chosen, slots filled in strategy-ranking order.
    ///
    /// # Errors
    /// `InsufficientDiversity` when fewer than `n` providers exist in
    /// provider mode; `NoEligibleModel` when the catalog cannot supply
    /// `n` models at all.
    pub fn route_council(
        &self,
        task: TaskType,
        n: usize,
        strategy: RoutingStrategy,
        diversity: CouncilDiversity,
    ) -> Result<Vec<Model>> {
        let ranked = self.ranked(task, strategy, None)?;

        let council: Vec<Model> = match diversity {
            CouncilDiversity::Any => ranked.iter().take(n).map(|c| c.model.clone()).collect(),
            CouncilDiversity::Providers => {
                let available = self.registry.providers().len();
                if available < n {
                    return Err(EngineError::InsufficientDiversity {
                        needed: n,
                        available,
                    });
                }
                let mut seen = std::collections::BTreeSet::new();
                ranked
                    .iter()
                    .filter(|c| seen.insert(c.model.provider.clone()))
                    .take(n)
                    .map(|c| c.model.clone())
                    .collect()
            }
        };

        if council.len() < n {
            return Err(EngineError::NoEligibleModel {
                task: task.to_string(),
                strategy: strategy.to_string(),
            });
        }

        debug!(
            task = %task,
            n = n,
            diversity = ?diversity,
            members = ?council.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            "Council selected"
        );
        Ok(council)
    }

    /// Builds the eligible candidate list for a task and ranks it for
    /// the strategy, best first.
    fn ranked(
        &self,
        task: TaskType,
        strategy: RoutingStrategy,
        constraints: Option<RouteConstraints>,
    ) -> Result<Vec<Candidate>> {
        let constraints = constraints.unwrap_or_default();
        let min_quality = constraints
            .min_quality_score
            .unwrap_or(self.config.default_min_quality);

        let mut candidates: Vec<Candidate> = self
            .registry
            .list(None)
            .into_iter()
            .map(|model| self.candidate(model, task))
            .filter(|c| c.quality >= min_quality)
            .filter(|c| {
                constraints
                    .max_cost_per_request
                    .is_none_or(|max| c.cost <= max)
            })
            .collect();

        if candidates.is_empty() {
            debug!(
                task = %task,
                strategy = %strategy,
                min_quality = min_quality,
                "No candidate survived the constraints"
            );
            return Err(EngineError::NoEligibleModel {
                task: task.to_string(),
                strategy: strategy.to_string(),
            });
        }

        match strategy {
            RoutingStrategy::BestQuality => candidates.sort_by(|a, b| {
                b.quality
                    .total_cmp(&a.quality)
                    .then_with(|| b.samples.cmp(&a.samples))
                    .then_with(|| a.model.id.cmp(&b.model.id))
            }),
            RoutingStrategy::BestCost => candidates.sort_by(|a, b| {
                a.cost
                    .total_cmp(&b.cost)
                    .then_with(|| b.samples.cmp(&a.samples))
                    .then_with(|| a.model.id.cmp(&b.model.id))
            }),
            RoutingStrategy::Fastest => candidates.sort_by(|a, b| {
                a.latency_ms
                    .total_cmp(&b.latency_ms)
                    .then_with(|| b.samples.cmp(&a.samples))
                    .then_with(|| a.model.id.cmp(&b.model.id))
            }),
            RoutingStrategy::Balanced => {
                let composites = self.balanced_scores(&candidates);
                let mut order: Vec<usize> = (0..candidates.len()).collect();
                order.sort_by(|&i, &j| {
                    composites[j]
                        .total_cmp(&composites[i])
                        .then_with(|| candidates[i].model.id.cmp(&candidates[j].model.id))
                });
                candidates = order.into_iter().map(|i| candidates[i].clone()).collect();
            }
        }

        Ok(candidates)
    }

    /// Composite balanced score per candidate:
    /// normalized(quality) - lambda_cost * normalized(cost)
    /// - lambda_latency * normalized(latency), min-max normalized
    /// across the eligible set.
    fn balanced_scores(&self, candidates: &[Candidate]) -> Vec<f64> {
        let quality = min_max_normalize(&candidates.iter().map(|c| c.quality).collect::<Vec<_>>());
        let cost = min_max_normalize(&candidates.iter().map(|c| c.cost).collect::<Vec<_>>());
        let latency =
            min_max_normalize(&candidates.iter().map(|c| c.latency_ms).collect::<Vec<_>>());

        (0..candidates.len())
            .map(|i| {
                quality[i] - self.config.lambda_cost * cost[i]
                    - self.config.lambda_latency * latency[i]
            })
            .collect()
    }

    fn candidate(&self, model: &Model, task: TaskType) -> Candidate {
        let aggregate = self.tracker.aggregate(&model.id, task);
        let quality = aggregate
            .and_then(|agg| agg.mean_quality())
            .unwrap_or(model.baseline_quality);
        let (cost, latency_ms, samples) = aggregate.map_or_else(
            || {
                (
                    model.nominal_request_cost(),
                    model.avg_latency_ms as f64,
                    0,
                )
            },
            |agg| (agg.cost.mean(), agg.latency_ms.mean(), agg.count),
        );

        Candidate {
            model: model.clone(),
            quality,
            cost,
            latency_ms,
            samples,
        }
    }
}
