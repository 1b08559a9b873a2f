//! Performance tracker: append-only execution metrics plus an
//! incrementally maintained per-(model, task) aggregate cache.
//!
//! The write path is O(1): every recorded execution updates a Welford
//! running aggregate under the store lock, so routing reads never
//! rescan history. Windowed queries (`model_stats`, `cost_analysis`)
//! scan the append-only log on read.

use crate::error::{EngineError, Result};
use crate::registry::ModelRegistry;
use crate::types::{
    CostAnalysis, ExecutionMetric, ExecutionRecord, Feedback, ModelCost, ModelStats, TaskType,
};
use chrono::{DateTime, Duration, Utc};
use quorum_stats::RunningStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Tracker tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Quality tolerance (in score points) when searching for a cheaper
    /// alternative during cost analysis.
    #[serde(default = "default_quality_tolerance")]
    pub quality_tolerance: f64,
}

fn default_quality_tolerance() -> f64 {
    2.0
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            quality_tolerance: default_quality_tolerance(),
        }
    }
}

/// Cached all-time aggregate for one (model, task) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    /// Total recorded executions.
    pub count: u64,
    /// Running quality stats over scored executions only.
    pub quality: RunningStats,
    /// Running cost stats in USD.
    pub cost: RunningStats,
    /// Running latency stats in milliseconds.
    pub latency_ms: RunningStats,
    /// Approved feedback entries.
    pub approvals: u64,
    /// Total feedback entries.
    pub feedback_count: u64,
}

impl AggregateSnapshot {
    /// Mean quality over scored executions, None if nothing was scored.
    #[must_use]
    pub fn mean_quality(&self) -> Option<f64> {
        (self.quality.count() > 0).then(|| self.quality.mean())
    }

    /// Approval rate over feedback entries, None without feedback.
    #[must_use]
    pub fn approval_rate(&self) -> Option<f64> {
        (self.feedback_count > 0).then(|| self.approvals as f64 / self.feedback_count as f64)
    }
}

/// Append-only metric log with an id index.
#[derive(Default)]
struct MetricLog {
    rows: Vec<ExecutionMetric>,
    index: HashMap<Uuid, usize>,
}

/// Persists per-execution metrics and serves aggregates to the router
/// and the experiment manager.
pub struct PerformanceTracker {
    /// Catalog for cost derivation and model validation.
    registry: Arc<ModelRegistry>,
    /// Tunables.
    config: TrackerConfig,
    /// Metric store. The single lock serializes the read-modify-write
    /// of the aggregate cache with the append.
    log: RwLock<MetricLog>,
    /// Rolling per-(model, task) aggregates.
    aggregates: RwLock<HashMap<(String, TaskType), AggregateSnapshot>>,
}

impl PerformanceTracker {
    /// Creates a tracker with default tunables.
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self::with_config(registry, TrackerConfig::default())
    }

    /// Creates a tracker with explicit tunables.
    #[must_use]
    pub fn with_config(registry: Arc<ModelRegistry>, config: TrackerConfig) -> Self {
        Self {
            registry,
            config,
            log: RwLock::new(MetricLog::default()),
            aggregates: RwLock::new(HashMap::new()),
        }
    }

    /// Records one model invocation.
    ///
    /// Validates the record, derives cost from token counts and catalog
    /// rates unless an explicit cost is supplied, appends the metric and
    /// updates the rolling aggregate for its (model, task) key.
    ///
    /// # Errors
    /// `UnknownModel` for ids missing from the catalog,
    /// `InvalidMetric` for out-of-range quality or negative cost.
    pub fn record_execution(&self, record: ExecutionRecord) -> Result<Uuid> {
        let model = self.registry.get(&record.model_id)?;

        if let Some(quality) = record.quality_score {
            if !(0.0..=100.0).contains(&quality) {
                return Err(EngineError::InvalidMetric(format!(
                    "quality_score must be between 0 and 100, got {quality}"
                )));
            }
        }
        if let Some(cost) = record.cost_usd {
            if !cost.is_finite() || cost < 0.0 {
                return Err(EngineError::InvalidMetric(format!(
                    "cost_usd must be finite and >= 0, got {cost}"
                )));
            }
        }

        let cost_usd = record.cost_usd.unwrap_or_else(|| {
            f64::from(record.tokens_in) / 1000.0 * model.cost_per_1k_input
                + f64::from(record.tokens_out) / 1000.0 * model.cost_per_1k_output
        });

        let metric = ExecutionMetric {
            id: Uuid::new_v4(),
            model_id: record.model_id,
            task_type: record.task_type,
            tokens_in: record.tokens_in,
            tokens_out: record.tokens_out,
            cost_usd,
            latency_ms: record.latency_ms,
            quality_score: record.quality_score,
            feedback: None,
            error: record.error,
            experiment_tag: record.experiment_tag,
            created_at: Utc::now(),
        };
        let id = metric.id;

        {
            let mut log = self.log.write().unwrap();
            let mut aggregates = self.aggregates.write().unwrap();
            let entry = aggregates
                .entry((metric.model_id.clone(), metric.task_type))
                .or_default();
            entry.count += 1;
            if let Some(quality) = metric.quality_score {
                entry.quality.push(quality);
            }
            entry.cost.push(metric.cost_usd);
            entry.latency_ms.push(metric.latency_ms as f64);

            let row_idx = log.rows.len();
            log.index.insert(id, row_idx);
            log.rows.push(metric.clone());
        }

        debug!(
            metric_id = %id,
            model_id = %metric.model_id,
            task_type = %metric.task_type,
            cost_usd = metric.cost_usd,
            latency_ms = metric.latency_ms,
            "Recorded execution"
        );

        Ok(id)
    }

    /// Appends user feedback to an existing metric.
    ///
    /// Core metric fields are never touched; the feedback slot can be
    /// written exactly once.
    ///
    /// # Errors
    /// `NotFound` for unknown metric ids, `InvalidMetric` for an
    /// out-of-range rating or duplicate feedback.
    pub fn record_feedback(
        &self,
        metric_id: Uuid,
        approved: bool,
        edit_distance: Option<u32>,
        rating: Option<u8>,
    ) -> Result<()> {
        if let Some(r) = rating {
            if !(1..=5).contains(&r) {
                return Err(EngineError::InvalidMetric(format!(
                    "rating must be between 1 and 5, got {r}"
                )));
            }
        }

        let mut log = self.log.write().unwrap();
        let idx = *log
            .index
            .get(&metric_id)
            .ok_or(EngineError::NotFound(metric_id))?;
        let row = &mut log.rows[idx];
        if row.feedback.is_some() {
            return Err(EngineError::InvalidMetric(format!(
                "feedback already recorded for metric {metric_id}"
            )));
        }
        row.feedback = Some(Feedback {
            approved,
            edit_distance,
            rating,
        });
        let key = (row.model_id.clone(), row.task_type);
        drop(log);

        let mut aggregates = self.aggregates.write().unwrap();
        let entry = aggregates.entry(key).or_default();
        entry.feedback_count += 1;
        if approved {
            entry.approvals += 1;
        }
        drop(aggregates);

        debug!(metric_id = %metric_id, approved = approved, "Recorded feedback");
        Ok(())
    }

    /// Cached all-time aggregate for a (model, task) pair, None if the
    /// pair has never recorded an execution. O(1).
    #[must_use]
    pub fn aggregate(&self, model_id: &str, task: TaskType) -> Option<AggregateSnapshot> {
        self.aggregates
            .read()
            .unwrap()
            .get(&(model_id.to_string(), task))
            .copied()
    }

    /// Windowed statistics for a (model, task) pair.
    ///
    /// Returns None when no record falls inside the window; callers
    /// must treat that distinctly from zero quality.
    #[must_use]
    pub fn model_stats(
        &self,
        model_id: &str,
        task: TaskType,
        window_days: u32,
    ) -> Option<ModelStats> {
        let cutoff = window_cutoff(window_days);
        let log = self.log.read().unwrap();

        let mut count = 0u64;
        let mut quality = RunningStats::new();
        let mut cost = RunningStats::new();
        let mut latency = RunningStats::new();
        let mut approvals = 0u64;
        let mut feedback_count = 0u64;

        for row in log
            .rows
            .iter()
            .filter(|r| r.model_id == model_id && r.task_type == task && r.created_at >= cutoff)
        {
            count += 1;
            if let Some(q) = row.quality_score {
                quality.push(q);
            }
            cost.push(row.cost_usd);
            latency.push(row.latency_ms as f64);
            if let Some(fb) = row.feedback {
                feedback_count += 1;
                if fb.approved {
                    approvals += 1;
                }
            }
        }

        (count > 0).then(|| ModelStats {
            count,
            mean_quality: (quality.count() > 0).then(|| quality.mean()),
            mean_cost: cost.mean(),
            mean_latency_ms: latency.mean(),
            approval_rate: (feedback_count > 0).then(|| approvals as f64 / feedback_count as f64),
        })
    }

    /// Cost analysis over a trailing window.
    ///
    /// Potential savings: for every scored execution, if a cheaper
    /// model in the same task type kept its window mean quality within
    /// `quality_tolerance` points of the observed quality, the delta to
    /// that alternative's mean cost is summed.
    #[must_use]
    pub fn cost_analysis(&self, window_days: u32) -> CostAnalysis {
        let cutoff = window_cutoff(window_days);
        let log = self.log.read().unwrap();
        let window: Vec<&ExecutionMetric> =
            log.rows.iter().filter(|r| r.created_at >= cutoff).collect();

        let mut total_cost = 0.0;
        let mut by_model: HashMap<&str, ModelCost> = HashMap::new();
        for row in &window {
            total_cost += row.cost_usd;
            let entry = by_model
                .entry(row.model_id.as_str())
                .or_insert_with(|| ModelCost {
                    model_id: row.model_id.clone(),
                    request_count: 0,
                    total_cost: 0.0,
                });
            entry.request_count += 1;
            entry.total_cost += row.cost_usd;
        }

        // Window means per (model, task) drive the alternative search.
        let mut window_stats: HashMap<(&str, TaskType), (RunningStats, RunningStats)> =
            HashMap::new();
        for row in &window {
            let entry = window_stats
                .entry((row.model_id.as_str(), row.task_type))
                .or_default();
            if let Some(q) = row.quality_score {
                entry.0.push(q);
            }
            entry.1.push(row.cost_usd);
        }

        let mut potential_savings = 0.0;
        for row in &window {
            let Some(observed_quality) = row.quality_score else {
                continue;
            };
            let cheapest_alternative = window_stats
                .iter()
                .filter(|((model_id, task), (quality, _))| {
                    *task == row.task_type
                        && *model_id != row.model_id
                        && quality.count() > 0
                        && quality.mean() >= observed_quality - self.config.quality_tolerance
                })
                .map(|(_, (_, cost))| cost.mean())
                .filter(|alt_cost| *alt_cost < row.cost_usd)
                .fold(f64::INFINITY, f64::min);
            if cheapest_alternative.is_finite() {
                potential_savings += row.cost_usd - cheapest_alternative;
            }
        }

        let mut cost_by_model: Vec<ModelCost> = by_model.into_values().collect();
        cost_by_model.sort_by(|a, b| {
            b.total_cost
                .total_cmp(&a.total_cost)
                .then_with(|| a.model_id.cmp(&b.model_id))
        });

        debug!(
            window_days = window_days,
            total_cost = total_cost,
            potential_savings = potential_savings,
            "Computed cost analysis"
        );

        CostAnalysis {
            total_cost,
            cost_by_model,
            potential_savings,
        }
    }

    /// Clones all metrics carrying the given experiment tag.
    #[must_use]
    pub fn metrics_tagged(&self, tag: &str) -> Vec<ExecutionMetric> {
        let log = self.log.read().unwrap();
        log.rows
            .iter()
            .filter(|r| r.experiment_tag.as_deref() == Some(tag))
            .cloned()
            .collect()
    }

    /// Total recorded metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.read().unwrap().rows.len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn window_cutoff(window_days: u32) -> DateTime<Utc> {
    Utc::now() - Duration::days(i64::from(window_days))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_tracker() -> PerformanceTracker {
        PerformanceTracker::new(Arc::new(ModelRegistry::builtin()))
    }

    fn scored_record(model_id: &str, task: TaskType, quality: f64, cost: f64) -> ExecutionRecord {
        ExecutionRecord {
            quality_score: Some(quality),
            cost_usd: Some(cost),
            latency_ms: 100,
            ..ExecutionRecord::new(model_id, task)
        }
    }

    #[test]
    fn test_round_trip_count_and_mean_cost() {
        let tracker = create_test_tracker();
        let costs = [0.01, 0.02, 0.03, 0.06];
        for cost in costs {
            tracker
                .record_execution(scored_record(
                    "gemini-flash",
                    TaskType::Conversation,
                    80.0,
                    cost,
                ))
                .unwrap();
        }

        let stats = tracker
            .model_stats("gemini-flash", TaskType::Conversation, 30)
            .unwrap();
        assert_eq!(stats.count, 4);
        assert!((stats.mean_cost - 0.03).abs() < 1e-12);
        assert_eq!(stats.mean_quality, Some(80.0));
    }

    #[test]
    fn test_no_data_is_none_not_zero() {
        let tracker = create_test_tracker();
        assert!(tracker
            .model_stats("gemini-flash", TaskType::Conversation, 30)
            .is_none());
        assert!(tracker.aggregate("gemini-flash", TaskType::Conversation).is_none());
    }

    #[test]
    fn test_stats_scoped_by_task_type() {
        let tracker = create_test_tracker();
        tracker
            .record_execution(scored_record(
                "gemini-flash",
                TaskType::Conversation,
                90.0,
                0.01,
            ))
            .unwrap();

        assert!(tracker
            .model_stats("gemini-flash", TaskType::CodeGeneration, 30)
            .is_none());
    }

    #[test]
    fn test_cost_derived_from_tokens() {
        let tracker = create_test_tracker();
        // gemini-flash: $0.0002 in / $0.0008 out per 1K tokens.
        let record = ExecutionRecord {
            tokens_in: 2000,
            tokens_out: 1000,
            ..ExecutionRecord::new("gemini-flash", TaskType::Generic)
        };
        tracker.record_execution(record).unwrap();

        let stats = tracker.model_stats("gemini-flash", TaskType::Generic, 30).unwrap();
        assert!((stats.mean_cost - 0.0012).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_rejected() {
        let tracker = create_test_tracker();
        let err = tracker
            .record_execution(ExecutionRecord::new("nope", TaskType::Generic))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownModel(_)));
    }

    #[test]
    fn test_out_of_range_quality_rejected() {
        let tracker = create_test_tracker();
        let record = ExecutionRecord {
            quality_score: Some(150.0),
            ..ExecutionRecord::new("gemini-flash", TaskType::Generic)
        };
        assert!(matches!(
            tracker.record_execution(record),
            Err(EngineError::InvalidMetric(_))
        ));
    }

    #[test]
    fn test_feedback_round_trip() {
        let tracker = create_test_tracker();
        let id = tracker
            .record_execution(scored_record("gemini-flash", TaskType::Generic, 70.0, 0.01))
            .unwrap();
        tracker
            .record_execution(scored_record("gemini-flash", TaskType::Generic, 70.0, 0.01))
            .and_then(|other| tracker.record_feedback(other, false, Some(42), Some(2)))
            .unwrap();
        tracker.record_feedback(id, true, None, Some(5)).unwrap();

        let stats = tracker.model_stats("gemini-flash", TaskType::Generic, 30).unwrap();
        assert_eq!(stats.approval_rate, Some(0.5));

        let agg = tracker.aggregate("gemini-flash", TaskType::Generic).unwrap();
        assert_eq!(agg.feedback_count, 2);
        assert_eq!(agg.approvals, 1);
    }

    #[test]
    fn test_feedback_unknown_metric() {
        let tracker = create_test_tracker();
        let err = tracker
            .record_feedback(Uuid::new_v4(), true, None, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_feedback_is_append_only() {
        let tracker = create_test_tracker();
        let id = tracker
            .record_execution(scored_record("gemini-flash", TaskType::Generic, 70.0, 0.01))
            .unwrap();
        tracker.record_feedback(id, true, None, None).unwrap();

        assert!(matches!(
            tracker.record_feedback(id, false, None, None),
            Err(EngineError::InvalidMetric(_))
        ));
    }

    #[test]
    fn test_invalid_rating_rejected() {
        let tracker = create_test_tracker();
        let id = tracker
            .record_execution(scored_record("gemini-flash", TaskType::Generic, 70.0, 0.01))
            .unwrap();
        assert!(matches!(
            tracker.record_feedback(id, true, None, Some(9)),
            Err(EngineError::InvalidMetric(_))
        ));
    }

    #[test]
    fn test_aggregate_updates_incrementally() {
        let tracker = create_test_tracker();
        for quality in [60.0, 70.0, 80.0] {
            tracker
                .record_execution(scored_record(
                    "claude-haiku-4.5",
                    TaskType::EmailWriting,
                    quality,
                    0.001,
                ))
                .unwrap();
        }

        let agg = tracker
            .aggregate("claude-haiku-4.5", TaskType::EmailWriting)
            .unwrap();
        assert_eq!(agg.count, 3);
        assert_eq!(agg.mean_quality(), Some(70.0));
    }

    #[test]
    fn test_potential_savings_scenario() {
        // Model A at $0.01/req and model B at $0.05/req, both scoring
        // quality 90 over 50 executions each: every B execution had a
        // cheaper equal-quality alternative.
        let tracker = create_test_tracker();
        for _ in 0..50 {
            tracker
                .record_execution(scored_record(
                    "gemini-flash",
                    TaskType::LeadScoring,
                    90.0,
                    0.01,
                ))
                .unwrap();
            tracker
                .record_execution(scored_record(
                    "gpt-4-turbo",
                    TaskType::LeadScoring,
                    90.0,
                    0.05,
                ))
                .unwrap();
        }

        let analysis = tracker.cost_analysis(30);
        assert!((analysis.total_cost - 3.0).abs() < 1e-9);
        assert!(
            analysis.potential_savings > 1.9,
            "expected ~2.0 savings, got {}",
            analysis.potential_savings
        );
        assert_eq!(analysis.cost_by_model[0].model_id, "gpt-4-turbo");
    }

    #[test]
    fn test_cost_analysis_empty_window() {
        let tracker = create_test_tracker();
        let analysis = tracker.cost_analysis(7);
        assert_eq!(analysis.total_cost, 0.0);
        assert_eq!(analysis.potential_savings, 0.0);
        assert!(analysis.cost_by_model.is_empty());
    }
}
