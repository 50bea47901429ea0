//! Budget gate against the sled backend.

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tapestry::budget::{BudgetGate, BudgetPolicy};
use tapestry::store::{BudgetStore, SledStore};
use tempfile::TempDir;

fn policies() -> HashMap<String, BudgetPolicy> {
    let mut policies = HashMap::new();
    policies.insert("openai".to_string(), BudgetPolicy::text_default());
    policies.insert("openai-tts-hd".to_string(), BudgetPolicy::audio_default());
    policies
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
}

#[tokio::test]
async fn test_usage_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let gate = BudgetGate::new(Arc::clone(&store) as Arc<dyn BudgetStore>, policies());
        gate.record_usage("openai-tts-hd", 900_000).await.unwrap();
        store.flush().unwrap();
    }

    let store = Arc::new(SledStore::open(dir.path()).unwrap());
    let budget = store.read("openai-tts-hd").await.unwrap().unwrap();
    assert_eq!(budget.usage_units, 900_000);

    let gate = BudgetGate::new(store as Arc<dyn BudgetStore>, policies());
    let decision = gate.should_fallback("openai-tts-hd").await.unwrap();
    assert!(decision.fallback);
    assert_eq!(decision.tag, "audio-fallback");
    assert!(!gate.should_fallback("openai").await.unwrap().fallback);
}

#[tokio::test]
async fn test_suspension_lifts_when_period_elapses() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SledStore::open(dir.path()).unwrap());
    let now = Arc::new(Mutex::new(start()));
    let clock = {
        let now = Arc::clone(&now);
        move || *now.lock()
    };
    let gate = BudgetGate::with_clock(Arc::clone(&store) as Arc<dyn BudgetStore>, policies(), clock);

    // 40M tokens at the default unit cost is 80 of a 100 budget.
    gate.record_usage("openai", 40_000_000).await.unwrap();
    assert!(gate.should_fallback("openai").await.unwrap().fallback);

    *now.lock() = start() + Duration::days(31);
    let decision = gate.should_fallback("openai").await.unwrap();
    assert!(!decision.fallback);
    assert_eq!(decision.ratio, 0.0);

    let budget = store.read("openai").await.unwrap().unwrap();
    assert_eq!(budget.cost_amount, 0.0);
    assert_eq!(budget.budget_amount, 100.0);
    assert!(budget.reset_at > start() + Duration::days(31));
}

#[tokio::test]
async fn test_snapshot_lists_every_policy() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SledStore::open(dir.path()).unwrap());
    let gate = BudgetGate::new(store as Arc<dyn BudgetStore>, policies());
    gate.record_usage("openai", 1_000).await.unwrap();

    let snapshot = gate.snapshot().await.unwrap();
    let names: Vec<_> = snapshot.iter().map(|b| b.provider.as_str()).collect();
    assert_eq!(names, vec!["openai", "openai-tts-hd"]);
    assert_eq!(snapshot[0].usage_units, 1_000);
    assert_eq!(snapshot[1].usage_units, 0);
}
