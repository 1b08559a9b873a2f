//! A/B test lifecycle, deterministic variant assignment and winner
//! determination.
//!
//! Assignment is a pure function of (test name, assignment key, traffic
//! split), so concurrent callers with the same key always land on the
//! same variant. Variant weights are immutable once a test starts.

use crate::error::{EngineError, Result};
use crate::registry::ModelRegistry;
use crate::tracker::PerformanceTracker;
use crate::types::{ExecutionRecord, TaskType};
use chrono::{DateTime, Duration, Utc};
use quorum_stats::{two_proportion_z_test, welch_t_test, RunningStats, SampleSummary};
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash as _, Hasher as _};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Experiment lifecycle state.
///
/// `Draft` is initial, `Completed` is terminal; a finished test is
/// never reactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Created but not yet serving traffic.
    Draft,
    /// Actively assigning variants.
    Running,
    /// Temporarily not assigning variants.
    Paused,
    /// Stopped for good.
    Completed,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestStatus::Draft => "draft",
            TestStatus::Running => "running",
            TestStatus::Paused => "paused",
            TestStatus::Completed => "completed",
        };
        write!(f, "{name}")
    }
}

/// Metric an experiment optimizes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMetric {
    /// Mean quality score; higher is better.
    Quality,
    /// Mean cost per request; lower is better.
    Cost,
    /// Quality per dollar; higher is better.
    Efficiency,
    /// Share of approved feedback; higher is better.
    ApprovalRate,
}

impl fmt::Display for TargetMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetMetric::Quality => "quality",
            TargetMetric::Cost => "cost",
            TargetMetric::Efficiency => "efficiency",
            TargetMetric::ApprovalRate => "approval_rate",
        };
        write!(f, "{name}")
    }
}

/// One arm of an A/B test, bound to a specific model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Variant name, unique within the test.
    pub name: String,
    /// Model serving this variant.
    pub model_id: String,
}

/// Configuration submitted to `create_test`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    /// Unique test name.
    pub name: String,
    /// Task type the experiment is scoped to.
    pub task_type: TaskType,
    /// Ordered variants (2 or more).
    pub variants: Vec<Variant>,
    /// Traffic split, one weight per variant, summing to 1.0.
    pub weights: Vec<f64>,
    /// Metric the experiment optimizes for.
    pub target_metric: TargetMetric,
    /// Minimum samples per variant before a winner can be declared.
    pub min_sample_size: u64,
    /// Maximum experiment duration in days.
    pub max_duration_days: u32,
}

/// A configured experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbTest {
    /// Configuration, frozen at creation.
    pub config: TestConfig,
    /// Lifecycle state.
    pub status: TestStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// First start timestamp; survives pause/resume cycles.
    pub started_at: Option<DateTime<Utc>>,
    /// Completion timestamp.
    pub stopped_at: Option<DateTime<Utc>>,
}

impl AbTest {
    /// Whether the test has outlived its configured duration.
    ///
    /// The external scheduler polls this together with `analyze_test`
    /// to decide when to call `stop_test`; the manager never
    /// self-schedules.
    #[must_use]
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.started_at.is_some_and(|started| {
            now - started > Duration::days(i64::from(self.config.max_duration_days))
        })
    }
}

/// Experiment analysis tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Confidence required to declare a winner.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Minimum absolute difference of variant means required to declare
    /// a winner; 0 disables the check.
    #[serde(default)]
    pub min_effect_size: f64,
}

fn default_confidence_threshold() -> f64 {
    0.95
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            min_effect_size: 0.0,
        }
    }
}

/// Derived statistics for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantStats {
    /// Variant name.
    pub variant: String,
    /// Model bound to the variant.
    pub model_id: String,
    /// Samples contributing to the target metric.
    pub samples: u64,
    /// Mean of the target metric.
    pub mean: f64,
    /// Sample variance of the target metric.
    pub variance: f64,
}

/// Experiment outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    /// A variant won at the configured confidence.
    Variant(String),
    /// Evidence does not meet the confidence/sample-size bar.
    Inconclusive,
}

/// Result of `analyze_test`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestAnalysis {
    /// Test name.
    pub test: String,
    /// Test status at analysis time.
    pub status: TestStatus,
    /// Metric the analysis compared.
    pub target_metric: TargetMetric,
    /// Per-variant sample size, mean and variance.
    pub variant_stats: Vec<VariantStats>,
    /// Declared winner, if any.
    pub winner: Winner,
    /// Confidence from the significance test comparing the two leading
    /// variants (1 - p-value).
    pub confidence: f64,
    /// Human-readable next step.
    pub recommendation: String,
}

/// Manages experiment lifecycle, assignment and analysis.
pub struct AbTestManager {
    /// Catalog used to validate variant models.
    registry: Arc<ModelRegistry>,
    /// Tracker owning the tagged result metrics.
    tracker: Arc<PerformanceTracker>,
    /// Analysis tunables.
    config: AnalysisConfig,
    /// Experiments keyed by name.
    tests: RwLock<HashMap<String, AbTest>>,
}

impl AbTestManager {
    /// Creates a manager with default analysis tunables.
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>, tracker: Arc<PerformanceTracker>) -> Self {
        Self::with_config(registry, tracker, AnalysisConfig::default())
    }

    /// Creates a manager with explicit analysis tunables.
    #[must_use]
    pub fn with_config(
        registry: Arc<ModelRegistry>,
        tracker: Arc<PerformanceTracker>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            registry,
            tracker,
            config,
            tests: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a new experiment in `Draft`.
    ///
    /// Validation is all-or-nothing: a rejected configuration leaves no
    /// trace.
    ///
    /// # Errors
    /// `InvalidTestConfig` for structural problems, `UnknownModel` for
    /// variants referencing models missing from the catalog,
    /// `TestExists` for duplicate names.
    pub fn create_test(&self, config: TestConfig) -> Result<()> {
        if config.variants.len() < 2 {
            return Err(EngineError::InvalidTestConfig(format!(
                "need at least 2 variants, got {}",
                config.variants.len()
            )));
        }
        if config.weights.len() != config.variants.len() {
            return Err(EngineError::InvalidTestConfig(format!(
                "{} weights for {} variants",
                config.weights.len(),
                config.variants.len()
            )));
        }
        if config.weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(EngineError::InvalidTestConfig(
                "weights must be finite and >= 0".to_string(),
            ));
        }
        let sum: f64 = config.weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(EngineError::InvalidTestConfig(format!(
                "variant weights must sum to 1.0, got {sum}"
            )));
        }
        let mut names = HashSet::new();
        for variant in &config.variants {
            if !names.insert(variant.name.as_str()) {
                return Err(EngineError::InvalidTestConfig(format!(
                    "duplicate variant name '{}'",
                    variant.name
                )));
            }
            self.registry.get(&variant.model_id)?;
        }
        if config.min_sample_size == 0 {
            return Err(EngineError::InvalidTestConfig(
                "min_sample_size must be at least 1".to_string(),
            ));
        }

        let mut tests = self.tests.write().unwrap();
        if tests.contains_key(&config.name) {
            return Err(EngineError::TestExists(config.name));
        }

        let name = config.name.clone();
        info!(
            test = %name,
            task_type = %config.task_type,
            variants = config.variants.len(),
            target_metric = %config.target_metric,
            "Created A/B test"
        );
        tests.insert(
            name,
            AbTest {
                config,
                status: TestStatus::Draft,
                created_at: Utc::now(),
                started_at: None,
                stopped_at: None,
            },
        );
        Ok(())
    }

    /// Starts (or resumes) a test.
    ///
    /// The start timestamp is recorded once; resuming from `Paused`
    /// keeps the original.
    pub fn start_test(&self, name: &str) -> Result<()> {
        self.transition(name, TestStatus::Running)
    }

    /// Pauses a running test.
    pub fn pause_test(&self, name: &str) -> Result<()> {
        self.transition(name, TestStatus::Paused)
    }

    /// Completes a test. Terminal: a completed test cannot be restarted.
    pub fn stop_test(&self, name: &str) -> Result<()> {
        self.transition(name, TestStatus::Completed)
    }

    fn transition(&self, name: &str, to: TestStatus) -> Result<()> {
        let mut tests = self.tests.write().unwrap();
        let test = tests
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownTest(name.to_string()))?;

        let allowed = matches!(
            (test.status, to),
            (TestStatus::Draft | TestStatus::Paused, TestStatus::Running)
                | (TestStatus::Running, TestStatus::Paused)
                | (TestStatus::Running | TestStatus::Paused, TestStatus::Completed)
        );
        if !allowed {
            return Err(EngineError::InvalidTransition {
                name: name.to_string(),
                from: test.status,
                to,
            });
        }

        match to {
            TestStatus::Running => {
                test.started_at.get_or_insert_with(Utc::now);
            }
            TestStatus::Completed => test.stopped_at = Some(Utc::now()),
            _ => {}
        }
        info!(test = %name, from = %test.status, to = %to, "A/B test transition");
        test.status = to;
        Ok(())
    }

    /// Assigns a variant for one request.
    ///
    /// With an `assignment_key` the variant is derived by hashing
    /// `(test_name, key)` into [0, 1) and mapping into the cumulative
    /// traffic-split intervals: the same key yields the same variant
    /// for the life of the test. Without a key, a fresh uniform draw is
    /// made per call.
    ///
    /// # Returns
    /// `(variant_name, model_id)`.
    ///
    /// # Errors
    /// `TestNotRunning` unless the test is in `Running`.
    pub fn assign_variant(
        &self,
        test_name: &str,
        assignment_key: Option<&str>,
    ) -> Result<(String, String)> {
        let tests = self.tests.read().unwrap();
        let test = tests
            .get(test_name)
            .ok_or_else(|| EngineError::UnknownTest(test_name.to_string()))?;
        if test.status != TestStatus::Running {
            return Err(EngineError::TestNotRunning {
                name: test_name.to_string(),
                status: test.status,
            });
        }

        let unit = match assignment_key {
            Some(key) => sticky_unit(test_name, key),
            None => rand::thread_rng().r#gen::<f64>(),
        };

        let mut cumulative = 0.0;
        let mut selected = test.config.variants.len() - 1;
        for (idx, weight) in test.config.weights.iter().enumerate() {
            cumulative += weight;
            if unit < cumulative {
                selected = idx;
                break;
            }
        }
        let variant = &test.config.variants[selected];

        debug!(
            test = %test_name,
            variant = %variant.name,
            sticky = assignment_key.is_some(),
            unit = unit,
            "Assigned variant"
        );
        Ok((variant.name.clone(), variant.model_id.clone()))
    }

    /// Records one experiment result through the tracker, tagged with
    /// the test and variant.
    ///
    /// # Errors
    /// `TestNotRunning` for draft or completed tests, `UnknownVariant`
    /// for variant names not part of the test.
    pub fn record_variant_result(
        &self,
        test_name: &str,
        variant_name: &str,
        quality_score: f64,
        cost_usd: f64,
    ) -> Result<Uuid> {
        let (model_id, task_type) = {
            let tests = self.tests.read().unwrap();
            let test = tests
                .get(test_name)
                .ok_or_else(|| EngineError::UnknownTest(test_name.to_string()))?;
            // Paused tests still accept in-flight results.
            if matches!(test.status, TestStatus::Draft | TestStatus::Completed) {
                return Err(EngineError::TestNotRunning {
                    name: test_name.to_string(),
                    status: test.status,
                });
            }
            let variant = test
                .config
                .variants
                .iter()
                .find(|v| v.name == variant_name)
                .ok_or_else(|| EngineError::UnknownVariant {
                    test: test_name.to_string(),
                    variant: variant_name.to_string(),
                })?;
            (variant.model_id.clone(), test.config.task_type)
        };

        self.tracker.record_execution(ExecutionRecord {
            quality_score: Some(quality_score),
            cost_usd: Some(cost_usd),
            experiment_tag: Some(experiment_tag(test_name, variant_name)),
            ..ExecutionRecord::new(model_id, task_type)
        })
    }

    /// Analyzes an experiment.
    ///
    /// Computes per-variant sample size, mean and variance of the
    /// target metric, compares the two leading variants with Welch's
    /// t-test (continuous metrics) or a two-proportion z-test (approval
    /// rate), and declares a winner only when both leaders reached
    /// `min_sample_size` and the confidence meets the configured
    /// threshold. "Not enough data" is a normal outcome, never an
    /// error.
    pub fn analyze_test(&self, test_name: &str) -> Result<TestAnalysis> {
        let test = {
            let tests = self.tests.read().unwrap();
            tests
                .get(test_name)
                .cloned()
                .ok_or_else(|| EngineError::UnknownTest(test_name.to_string()))?
        };
        let target = test.config.target_metric;

        let mut stats = Vec::new();
        let mut proportions = Vec::new();
        for variant in &test.config.variants {
            let rows = self
                .tracker
                .metrics_tagged(&experiment_tag(test_name, &variant.name));

            let (summary, successes_trials) = match target {
                TargetMetric::ApprovalRate => {
                    let trials = rows.iter().filter(|r| r.feedback.is_some()).count() as u64;
                    let successes = rows
                        .iter()
                        .filter(|r| r.feedback.is_some_and(|fb| fb.approved))
                        .count() as u64;
                    let mean = if trials > 0 {
                        successes as f64 / trials as f64
                    } else {
                        0.0
                    };
                    (
                        SampleSummary {
                            count: trials,
                            mean,
                            variance: mean * (1.0 - mean),
                        },
                        (successes, trials),
                    )
                }
                _ => {
                    let mut running = RunningStats::new();
                    for row in &rows {
                        match target {
                            TargetMetric::Quality => {
                                if let Some(q) = row.quality_score {
                                    running.push(q);
                                }
                            }
                            TargetMetric::Cost => running.push(row.cost_usd),
                            TargetMetric::Efficiency => {
                                if let Some(q) = row.quality_score {
                                    if row.cost_usd > 0.0 {
                                        running.push(q / row.cost_usd);
                                    }
                                }
                            }
                            TargetMetric::ApprovalRate => unreachable!(),
                        }
                    }
                    (
                        SampleSummary {
                            count: running.count(),
                            mean: running.mean(),
                            variance: running.variance(),
                        },
                        (0, 0),
                    )
                }
            };

            stats.push(VariantStats {
                variant: variant.name.clone(),
                model_id: variant.model_id.clone(),
                samples: summary.count,
                mean: summary.mean,
                variance: summary.variance,
            });
            proportions.push(successes_trials);
        }

        // Rank variants best first; for cost, lower means win.
        let mut order: Vec<usize> = (0..stats.len()).collect();
        order.sort_by(|&i, &j| {
            let ordering = match target {
                TargetMetric::Cost => stats[i].mean.total_cmp(&stats[j].mean),
                _ => stats[j].mean.total_cmp(&stats[i].mean),
            };
            ordering.then_with(|| stats[i].variant.cmp(&stats[j].variant))
        });
        let (best, runner) = (order[0], order[1]);

        let significance = match target {
            TargetMetric::ApprovalRate => two_proportion_z_test(
                proportions[best].0,
                proportions[best].1,
                proportions[runner].0,
                proportions[runner].1,
            ),
            _ => welch_t_test(
                &SampleSummary {
                    count: stats[best].samples,
                    mean: stats[best].mean,
                    variance: stats[best].variance,
                },
                &SampleSummary {
                    count: stats[runner].samples,
                    mean: stats[runner].mean,
                    variance: stats[runner].variance,
                },
            ),
        };
        let confidence = significance.confidence;

        let min_samples = test.config.min_sample_size;
        let effect = (stats[best].mean - stats[runner].mean).abs();
        let undersampled: Vec<&VariantStats> = [best, runner]
            .iter()
            .map(|&i| &stats[i])
            .filter(|s| s.samples < min_samples)
            .collect();

        let (winner, recommendation) = if !undersampled.is_empty() {
            let short = undersampled[0];
            (
                Winner::Inconclusive,
                format!(
                    "continue collecting data: variant '{}' has {} of {} required samples",
                    short.variant, short.samples, min_samples
                ),
            )
        } else if confidence < self.config.confidence_threshold {
            (
                Winner::Inconclusive,
                format!(
                    "confidence {:.1}% is below the {:.1}% threshold; keep the test running or extend its duration",
                    confidence * 100.0,
                    self.config.confidence_threshold * 100.0
                ),
            )
        } else if effect < self.config.min_effect_size {
            (
                Winner::Inconclusive,
                format!(
                    "observed effect {effect:.3} is below the minimum effect size {:.3}",
                    self.config.min_effect_size
                ),
            )
        } else {
            let name = stats[best].variant.clone();
            let rec = format!(
                "stop the test: variant '{name}' leads on {target} at {:.1}% confidence",
                confidence * 100.0
            );
            (Winner::Variant(name), rec)
        };

        info!(
            test = %test_name,
            target_metric = %target,
            winner = ?winner,
            confidence = confidence,
            "Analyzed A/B test"
        );

        Ok(TestAnalysis {
            test: test_name.to_string(),
            status: test.status,
            target_metric: target,
            variant_stats: stats,
            winner,
            confidence,
            recommendation,
        })
    }

    /// Clones a test by name.
    pub fn get_test(&self, name: &str) -> Result<AbTest> {
        self.tests
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownTest(name.to_string()))
    }

    /// Clones all tests, ordered by name.
    #[must_use]
    pub fn list_tests(&self) -> Vec<AbTest> {
        let tests = self.tests.read().unwrap();
        let mut all: Vec<AbTest> = tests.values().cloned().collect();
        all.sort_by(|a, b| a.config.name.cmp(&b.config.name));
        all
    }
}

/// Experiment tag carried on tracked metrics: `"{test}:{variant}"`.
#[must_use]
pub fn experiment_tag(test: &str, variant: &str) -> String {
    format!("{test}:{variant}")
}

/// Hashes (test name, assignment key) into [0, 1).
fn sticky_unit(test_name: &str, key: &str) -> f64 {
    let mut hasher = DefaultHasher::new();
    test_name.hash(&mut hasher);
    key.hash(&mut hasher);
    (hasher.finish() % 10_000) as f64 / 10_000.0
}
