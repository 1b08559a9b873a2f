//! End-to-end tests wiring the registry, tracker, scorer, router and
//! experiment manager together through the public API.

use quorum_engine::{
    AbTestManager, AnalysisConfig, CatalogLoader, CouncilDiversity, ExecutionRecord, ModelRegistry,
    ModelRouter, PerformanceTracker, QualityScorer, RoutingStrategy, ScoreContext, TargetMetric,
    TaskType, TestConfig, TestStatus, Variant, Winner,
};
use std::io::Write as _;
use std::sync::Arc;
use tempfile::NamedTempFile;

struct Engine {
    tracker: Arc<PerformanceTracker>,
    scorer: QualityScorer,
    router: ModelRouter,
    experiments: AbTestManager,
}

fn build_engine() -> Engine {
    // Best effort; only the first test in the process wins the init.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let registry = Arc::new(ModelRegistry::builtin());
    let tracker = Arc::new(PerformanceTracker::new(Arc::clone(&registry)));
    Engine {
        tracker: Arc::clone(&tracker),
        scorer: QualityScorer::new(),
        router: ModelRouter::new(Arc::clone(&registry), Arc::clone(&tracker)),
        experiments: AbTestManager::new(registry, tracker),
    }
}

#[test]
fn test_route_score_record_feedback_loop() {
    let engine = build_engine();

    // Route, pretend to execute, score the output and feed the result
    // back into the tracker.
    let model = engine
        .router
        .route(TaskType::EmailWriting, RoutingStrategy::Balanced, None)
        .unwrap();

    let output = "Hi Dana,\n\nThanks for taking a look at the proposal. \
                  I have attached the updated pricing sheet. Could we schedule \
                  a call this week to walk through it?\n\nBest,\nSam";
    let context = ScoreContext {
        personalization: vec!["Dana".to_string()],
        ..ScoreContext::default()
    };
    let quality = engine.scorer.score(TaskType::EmailWriting, output, &context);
    assert!((0.0..=100.0).contains(&quality));

    let metric_id = engine
        .tracker
        .record_execution(ExecutionRecord {
            tokens_in: 420,
            tokens_out: 180,
            latency_ms: 1_800,
            quality_score: Some(quality),
            ..ExecutionRecord::new(model.id.clone(), TaskType::EmailWriting)
        })
        .unwrap();
    engine
        .tracker
        .record_feedback(metric_id, true, None, Some(5))
        .unwrap();

    let stats = engine
        .tracker
        .model_stats(&model.id, TaskType::EmailWriting, 30)
        .unwrap();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.mean_quality, Some(quality));
    assert_eq!(stats.approval_rate, Some(1.0));
}

#[test]
fn test_recorded_history_redirects_routing() {
    let engine = build_engine();

    // Published baselines favor claude-sonnet-4.5 for quality. Feed in
    // observations that contradict the baseline.
    for i in 0..20 {
        let jitter = f64::from(i % 4) * 0.2;
        engine
            .tracker
            .record_execution(ExecutionRecord {
                quality_score: Some(96.0 + jitter),
                cost_usd: Some(0.02),
                latency_ms: 2_400,
                ..ExecutionRecord::new("gpt-4-turbo", TaskType::WebsiteAnalysis)
            })
            .unwrap();
        engine
            .tracker
            .record_execution(ExecutionRecord {
                quality_score: Some(70.0 + jitter),
                cost_usd: Some(0.01),
                latency_ms: 1_900,
                ..ExecutionRecord::new("claude-sonnet-4.5", TaskType::WebsiteAnalysis)
            })
            .unwrap();
    }

    let model = engine
        .router
        .route(TaskType::WebsiteAnalysis, RoutingStrategy::BestQuality, None)
        .unwrap();
    assert_eq!(model.id, "gpt-4-turbo");

    // Other tasks still route on baselines.
    let model = engine
        .router
        .route(TaskType::EmailWriting, RoutingStrategy::BestQuality, None)
        .unwrap();
    assert_eq!(model.id, "claude-sonnet-4.5");
}

#[test]
fn test_council_and_fallback_share_one_engine() {
    let engine = build_engine();

    let council = engine
        .router
        .route_council(
            TaskType::Conversation,
            3,
            RoutingStrategy::Balanced,
            CouncilDiversity::Providers,
        )
        .unwrap();
    assert_eq!(council.len(), 3);

    // Impossible floor, so the preferred strategy fails and the
    // fallback answers unconstrained.
    let constraints = quorum_engine::RouteConstraints {
        min_quality_score: Some(99.9),
        max_cost_per_request: None,
    };
    let model = engine
        .router
        .route_with_fallback(
            TaskType::Conversation,
            RoutingStrategy::BestQuality,
            RoutingStrategy::BestCost,
            Some(constraints),
        )
        .unwrap();
    assert_eq!(model.id, "gemini-flash");
}

#[test]
fn test_experiment_end_to_end() {
    let engine = build_engine();

    engine
        .experiments
        .create_test(TestConfig {
            name: "sonnet-vs-haiku".to_string(),
            task_type: TaskType::EmailWriting,
            variants: vec![
                Variant {
                    name: "control".to_string(),
                    model_id: "claude-sonnet-4.5".to_string(),
                },
                Variant {
                    name: "challenger".to_string(),
                    model_id: "claude-haiku-4.5".to_string(),
                },
            ],
            weights: vec![0.5, 0.5],
            target_metric: TargetMetric::Quality,
            min_sample_size: 15,
            max_duration_days: 14,
        })
        .unwrap();
    engine.experiments.start_test("sonnet-vs-haiku").unwrap();

    // Drive traffic through sticky assignment and record outcomes with
    // a clear quality gap.
    for i in 0..60 {
        let key = format!("lead-{i}");
        let (variant, _model_id) = engine
            .experiments
            .assign_variant("sonnet-vs-haiku", Some(&key))
            .unwrap();

        let jitter = f64::from(i % 6) * 0.5;
        let (quality, cost) = match variant.as_str() {
            "control" => (90.0 + jitter, 0.012),
            _ => (74.0 + jitter, 0.001),
        };
        engine
            .experiments
            .record_variant_result("sonnet-vs-haiku", &variant, quality, cost)
            .unwrap();
    }

    let analysis = engine.experiments.analyze_test("sonnet-vs-haiku").unwrap();
    assert_eq!(analysis.winner, Winner::Variant("control".to_string()));
    assert!(analysis.confidence >= 0.95);

    // Experiment traffic lands in the shared tracker.
    assert_eq!(engine.tracker.len(), 60);
    let report = engine.tracker.cost_analysis(30);
    assert!(report.total_cost > 0.0);

    engine.experiments.stop_test("sonnet-vs-haiku").unwrap();
    let test = engine.experiments.get_test("sonnet-vs-haiku").unwrap();
    assert_eq!(test.status, TestStatus::Completed);
}

#[test]
fn test_engine_built_from_toml_config() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[analysis]
confidence_threshold = 0.90

[[models]]
id = "budget"
provider = "acme"
display_name = "Budget"
capabilities = ["conversation", "email"]
cost_per_1k_input = 0.0001
cost_per_1k_output = 0.0004
max_context_tokens = 16000
avg_latency_ms = 250
baseline_quality = 70.0

[[models]]
id = "premium"
provider = "acme"
display_name = "Premium"
capabilities = ["conversation", "email", "reasoning"]
cost_per_1k_input = 0.005
cost_per_1k_output = 0.02
max_context_tokens = 200000
avg_latency_ms = 1800
baseline_quality = 93.0
"#
    )
    .unwrap();

    let config = CatalogLoader::load(file.path()).unwrap();
    assert_eq!(config.analysis.confidence_threshold, 0.90);

    let registry = Arc::new(ModelRegistry::new(config.models));
    let tracker = Arc::new(PerformanceTracker::with_config(
        Arc::clone(&registry),
        config.tracker,
    ));
    let router = ModelRouter::with_config(
        Arc::clone(&registry),
        Arc::clone(&tracker),
        config.router,
    );
    let _experiments = AbTestManager::with_config(
        registry,
        tracker,
        AnalysisConfig {
            confidence_threshold: config.analysis.confidence_threshold,
            min_effect_size: config.analysis.min_effect_size,
        },
    );

    let model = router
        .route(TaskType::Conversation, RoutingStrategy::BestQuality, None)
        .unwrap();
    assert_eq!(model.id, "premium");

    let model = router
        .route(TaskType::Conversation, RoutingStrategy::BestCost, None)
        .unwrap();
    assert_eq!(model.id, "budget");
}
