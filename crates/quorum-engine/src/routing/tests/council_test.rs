//! Tests for council (multi-model) selection.

use crate::error::EngineError;
use crate::registry::ModelRegistry;
use crate::routing::{CouncilDiversity, ModelRouter};
use crate::tracker::PerformanceTracker;
use crate::types::{RoutingStrategy, TaskType};
use std::collections::BTreeSet;
use std::sync::Arc;

fn create_test_router() -> ModelRouter {
    let registry = Arc::new(ModelRegistry::builtin());
    let tracker = Arc::new(PerformanceTracker::new(Arc::clone(&registry)));
    ModelRouter::new(registry, tracker)
}

#[test]
fn test_provider_diversity_one_model_per_provider() {
    let router = create_test_router();

    let council = router
        .route_council(
            TaskType::Generic,
            3,
            RoutingStrategy::BestQuality,
            CouncilDiversity::Providers,
        )
        .unwrap();

    assert_eq!(council.len(), 3);
    let providers: BTreeSet<&str> = council.iter().map(|m| m.provider.as_str()).collect();
    assert_eq!(providers.len(), 3);
    // Ranking order still applies: the best model leads the council.
    assert_eq!(council[0].id, "claude-sonnet-4.5");
}

#[test]
fn test_provider_diversity_insufficient_providers() {
    let router = create_test_router();

    // The builtin catalog has three providers.
    let err = router
        .route_council(
            TaskType::Generic,
            4,
            RoutingStrategy::BestQuality,
            CouncilDiversity::Providers,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientDiversity {
            needed: 4,
            available: 3
        }
    ));
}

#[test]
fn test_any_diversity_takes_top_of_ranking() {
    let router = create_test_router();

    let council = router
        .route_council(
            TaskType::Generic,
            2,
            RoutingStrategy::BestQuality,
            CouncilDiversity::Any,
        )
        .unwrap();

    assert_eq!(council.len(), 2);
    assert_eq!(council[0].id, "claude-sonnet-4.5");
    assert_eq!(council[1].id, "gpt-4-turbo");
    assert_ne!(council[0].id, council[1].id);
}

#[test]
fn test_council_larger_than_catalog_fails() {
    let router = create_test_router();

    let err = router
        .route_council(
            TaskType::Generic,
            50,
            RoutingStrategy::BestQuality,
            CouncilDiversity::Any,
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::NoEligibleModel { .. }));
}
