//! The shared limiter bounds stages across keys and categories.

use super::fakes::{engine, metadata, test_settings, ConcurrencyGauge, FakeProvider, Fakes};
use std::sync::Arc;
use std::time::Duration;
use tapestry::concurrency::ConcurrencyLimiter;
use tapestry::generation::{CategoryPipeline, CategoryPlan, EngineSettings};
use tapestry::orchestrator::Orchestrator;
use tapestry::profile::UserMetadata;
use tapestry::store::MemoryStore;
use tapestry::types::Category;

fn gauged_text(gauge: &Arc<ConcurrencyGauge>) -> Arc<FakeProvider> {
    Arc::new(
        FakeProvider::new("text")
            .delay(Duration::from_millis(20))
            .gauge(Arc::clone(gauge)),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stages_never_exceed_capacity() {
    let gauge = Arc::new(ConcurrencyGauge::default());
    let fakes = Fakes {
        topics: Arc::new(FakeProvider::new("topics").topics(&["a", "b", "c", "d", "e"])),
        text: gauged_text(&gauge),
        ..Fakes::default()
    };
    let store = Arc::new(MemoryStore::new());
    let settings = EngineSettings {
        max_topics_per_key: 5,
        ..test_settings()
    };
    let limiter = ConcurrencyLimiter::new(2);
    let plan = CategoryPlan::for_metadata(Category::Interest, &metadata(&["FUN"], &[]));

    let outcome = CategoryPipeline::new(
        Arc::new(engine(&fakes, &store, settings)),
        plan,
        limiter.clone(),
    )
    .run()
    .await
    .into_result()
    .unwrap();

    assert_eq!(outcome.stages_succeeded, 5);
    assert!(gauge.peak() <= 2, "peak {} over capacity", gauge.peak());
    assert!(gauge.peak() >= 1);
    assert!(limiter.peak() <= 2);
    assert_eq!(limiter.available(), 2);
}

#[tokio::test]
async fn test_panicking_stages_return_their_slots() {
    let fakes = Fakes {
        topics: Arc::new(FakeProvider::new("topics").topics(&["a", "b", "c"])),
        audio: Arc::new(FakeProvider::new("audio").panic_topic("a").panic_topic("b")),
        ..Fakes::default()
    };
    let store = Arc::new(MemoryStore::new());
    let settings = EngineSettings {
        max_topics_per_key: 3,
        ..test_settings()
    };
    let limiter = ConcurrencyLimiter::new(1);
    let plan = CategoryPlan::for_metadata(Category::Interest, &metadata(&["FUN"], &[]));

    let outcome = CategoryPipeline::new(
        Arc::new(engine(&fakes, &store, settings)),
        plan,
        limiter.clone(),
    )
    .run()
    .await
    .into_result()
    .unwrap();

    assert_eq!(outcome.stages_failed, 2);
    assert_eq!(outcome.stages_succeeded, 1);
    assert_eq!(store.batches()[0].topics, vec!["c"]);
    assert_eq!(limiter.available(), 1);
    assert_eq!(limiter.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_limiter_spans_all_categories() {
    let gauge = Arc::new(ConcurrencyGauge::default());
    let fakes = Fakes {
        text: gauged_text(&gauge),
        ..Fakes::default()
    };
    let store = Arc::new(MemoryStore::new());
    let settings = EngineSettings {
        concurrency_override: Some(3),
        ..test_settings()
    };
    let orchestrator = Orchestrator::new(engine(&fakes, &store, settings));

    let summary = orchestrator
        .submit(UserMetadata {
            email: "kai@example.com".to_string(),
            country: "JP".to_string(),
            city: "Osaka".to_string(),
            religions: vec!["Shinto".to_string(), "Buddhism".to_string()],
            preferences: vec!["FUN".to_string(), "CHILL".to_string()],
            language: "ja".to_string(),
        })
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.items_generated(), 12);
    assert!(summary.peak_concurrency <= 3);
    assert!(gauge.peak() <= 3, "peak {} over capacity", gauge.peak());
}
