//! Content Generation
//!
//! Everything between a user's category plans and persisted content: topic prompts,
//! the per-topic content stage, the per-category pipeline, and the aggregator that
//! turns a category's result stream into batch records.

pub mod aggregator;
pub mod pipeline;
pub mod prompt;
pub mod stage;

pub use aggregator::{group_reports, Aggregator, KeyGroup};
pub use pipeline::{
    normalize_topics, CategoryPipeline, CategoryPlan, PipelineOutcome, PipelineReport, PlannedKey,
};
pub use prompt::{sample_themes, theme_vocabulary, TopicPrompt};
pub use stage::ContentStage;

use crate::budget::BudgetGate;
use crate::concurrency::ConcurrencyLimiter;
use crate::provider::ProviderSet;
use crate::store::{ContentStore, ProfileStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Engine tunables (the `[engine]` config section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Limiter capacity is available parallelism times this
    #[serde(default = "default_concurrency_multiplier")]
    pub concurrency_multiplier: usize,

    /// Fixed limiter capacity, replacing the parallelism-derived one
    #[serde(default)]
    pub concurrency_override: Option<usize>,

    /// Deadline for the joint image and audio step of one stage
    #[serde(default = "default_asset_deadline_secs")]
    pub asset_deadline_secs: u64,

    /// A key whose persisted topic count reaches this is skipped
    #[serde(default = "default_target_topic_count")]
    pub target_topic_count: usize,

    /// Most topics requested for one key in one run
    #[serde(default = "default_max_topics_per_key")]
    pub max_topics_per_key: usize,

    /// Themes drawn into each topic prompt
    #[serde(default = "default_theme_sample_size")]
    pub theme_sample_size: usize,

    /// Language that always uses primary providers, even over budget
    #[serde(default)]
    pub premium_only_language: Option<String>,
}

fn default_concurrency_multiplier() -> usize {
    ConcurrencyLimiter::DEFAULT_MULTIPLIER
}

fn default_asset_deadline_secs() -> u64 {
    180
}

fn default_target_topic_count() -> usize {
    12
}

fn default_max_topics_per_key() -> usize {
    4
}

fn default_theme_sample_size() -> usize {
    3
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            concurrency_multiplier: default_concurrency_multiplier(),
            concurrency_override: None,
            asset_deadline_secs: default_asset_deadline_secs(),
            target_topic_count: default_target_topic_count(),
            max_topics_per_key: default_max_topics_per_key(),
            theme_sample_size: default_theme_sample_size(),
            premium_only_language: None,
        }
    }
}

impl EngineSettings {
    pub fn asset_deadline(&self) -> Duration {
        Duration::from_secs(self.asset_deadline_secs)
    }

    /// A fresh limiter for one run.
    pub fn limiter(&self) -> ConcurrencyLimiter {
        match self.concurrency_override {
            Some(capacity) => ConcurrencyLimiter::new(capacity),
            None => ConcurrencyLimiter::from_available_parallelism(self.concurrency_multiplier),
        }
    }

    /// Whether requests in `language` must stay on primary providers.
    pub fn is_premium_only(&self, language: &str) -> bool {
        self.premium_only_language
            .as_deref()
            .is_some_and(|premium| premium.eq_ignore_ascii_case(language))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency_multiplier == 0 {
            return Err("concurrency_multiplier must be at least 1".to_string());
        }
        if self.concurrency_override == Some(0) {
            return Err("concurrency_override must be at least 1".to_string());
        }
        if self.asset_deadline_secs == 0 {
            return Err("asset_deadline_secs must be at least 1".to_string());
        }
        if self.target_topic_count == 0 || self.max_topics_per_key == 0 {
            return Err("target_topic_count and max_topics_per_key must be at least 1".to_string());
        }
        if self.theme_sample_size == 0 {
            return Err("theme_sample_size must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Shared collaborators for one engine instance.
pub struct EngineContext {
    pub providers: ProviderSet,
    pub content: Arc<dyn ContentStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub gate: Arc<BudgetGate>,
    pub settings: EngineSettings,
}
