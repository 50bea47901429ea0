//! Category Pipeline
//!
//! One pipeline per category per run. Each key is an independent, panic-isolated
//! branch: an idempotency check, a topic request, then one stage per topic. All stages
//! of the category report into a single result stream owned by the aggregator, and the
//! stream closes only after every branch (and therefore every stage) has been joined.

use super::aggregator::Aggregator;
use super::prompt::TopicPrompt;
use super::stage::ContentStage;
use super::EngineContext;
use crate::concurrency::{isolate, ConcurrencyLimiter};
use crate::error::ApiError;
use crate::profile::UserMetadata;
use crate::provider::{Provider, ProviderPair, TopicGenerator};
use crate::types::{
    Category, GenerationRequest, LocaleContext, StageReport, ThemeGroupId, TopicScope,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// A key and the locale its content is grounded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedKey {
    pub key: String,
    pub locale: LocaleContext,
}

/// Keys and locales one category will process for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPlan {
    pub category: Category,
    pub language: String,
    pub keys: Vec<PlannedKey>,
}

fn clean_keys(raw: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty() && seen.insert(k.to_string()))
        .map(str::to_string)
        .collect()
}

impl CategoryPlan {
    pub fn for_metadata(category: Category, metadata: &UserMetadata) -> Self {
        let country = metadata.country.trim().to_string();
        let keys = match category {
            // Local content needs somewhere to be local to.
            Category::Local if country.is_empty() => Vec::new(),
            Category::Local => clean_keys(&metadata.preferences)
                .into_iter()
                .map(|key| PlannedKey {
                    key,
                    locale: LocaleContext::City {
                        country: country.clone(),
                        city: metadata.city.trim().to_string(),
                    },
                })
                .collect(),
            Category::Faith => {
                let preferences = clean_keys(&metadata.preferences);
                clean_keys(&metadata.religions)
                    .into_iter()
                    .map(|religion| PlannedKey {
                        locale: LocaleContext::Faith {
                            country: country.clone(),
                            religion: religion.clone(),
                            preferences: preferences.clone(),
                        },
                        key: religion,
                    })
                    .collect()
            }
            Category::Interest => clean_keys(&metadata.preferences)
                .into_iter()
                .map(|key| PlannedKey {
                    key,
                    locale: LocaleContext::Global,
                })
                .collect(),
        };

        Self {
            category,
            language: metadata.language.trim().to_string(),
            keys,
        }
    }

    /// Plans for every category, in category order.
    pub fn all(metadata: &UserMetadata) -> Vec<Self> {
        Category::ALL
            .iter()
            .map(|category| Self::for_metadata(*category, metadata))
            .collect()
    }
}

/// Trim, de-duplicate (case-insensitively, first spelling wins) and truncate topics.
pub fn normalize_topics(raw: Vec<String>, bound: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|topic| topic.trim().to_string())
        .filter(|topic| !topic.is_empty() && seen.insert(topic.to_lowercase()))
        .take(bound)
        .collect()
}

/// Statistics for one finished category pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    pub keys_skipped: usize,
    pub keys_failed: Vec<String>,
    pub stages_succeeded: usize,
    pub stages_failed: usize,
    pub batches: usize,
}

/// A finished pipeline: statistics always, plus the category failure when any key failed.
///
/// Batches of the keys that succeeded are persisted either way, so the statistics stay
/// meaningful when `error` is set.
#[derive(Debug)]
pub struct PipelineReport {
    pub outcome: PipelineOutcome,
    pub error: Option<ApiError>,
}

impl PipelineReport {
    pub fn into_result(self) -> Result<PipelineOutcome, ApiError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.outcome),
        }
    }
}

enum KeyOutcome {
    Skipped,
    Generated { succeeded: usize, failed: usize },
}

pub struct CategoryPipeline {
    ctx: Arc<EngineContext>,
    plan: CategoryPlan,
    limiter: ConcurrencyLimiter,
}

impl CategoryPipeline {
    pub fn new(ctx: Arc<EngineContext>, plan: CategoryPlan, limiter: ConcurrencyLimiter) -> Self {
        Self {
            ctx,
            plan,
            limiter,
        }
    }

    pub fn category(&self) -> Category {
        self.plan.category
    }

    /// Process every key, flush batches, and report.
    ///
    /// The report carries [`ApiError::CategoryFailed`] when any key failed, after the
    /// batches of the remaining keys have been persisted.
    pub async fn run(self) -> PipelineReport {
        let category = self.plan.category;
        info!(
            category = %category,
            key_count = self.plan.keys.len(),
            language = %self.plan.language,
            "Category pipeline started"
        );

        let (sender, receiver) = mpsc::unbounded_channel::<StageReport>();
        let locales: HashMap<String, LocaleContext> = self
            .plan
            .keys
            .iter()
            .map(|planned| (planned.key.clone(), planned.locale.clone()))
            .collect();
        let aggregator = Aggregator::new(
            category,
            self.plan.language.clone(),
            locales,
            Arc::clone(&self.ctx.content),
        )
        .spawn(receiver);

        let mut branches = JoinSet::new();
        for planned in &self.plan.keys {
            let branch = KeyBranch {
                ctx: Arc::clone(&self.ctx),
                category,
                language: self.plan.language.clone(),
                planned: planned.clone(),
                limiter: self.limiter.clone(),
                reports: sender.clone(),
            };
            let key = planned.key.clone();
            let task = format!("{}:{}", category, key);
            branches.spawn(async move { (key, isolate(task, branch.run()).await) });
        }

        let mut outcome = PipelineOutcome::default();
        while let Some(joined) = branches.join_next().await {
            match joined {
                Ok((_, Ok(KeyOutcome::Skipped))) => outcome.keys_skipped += 1,
                Ok((_, Ok(KeyOutcome::Generated { succeeded, failed }))) => {
                    outcome.stages_succeeded += succeeded;
                    outcome.stages_failed += failed;
                }
                Ok((key, Err(err))) => {
                    warn!(category = %category, key = %key, error = %err, "Key failed, skipping");
                    outcome.keys_failed.push(key);
                }
                Err(err) => {
                    error!(category = %category, error = %err, "Key branch aborted");
                    outcome.keys_failed.push("<unknown>".to_string());
                }
            }
        }

        // Last sender: the aggregator flushes once this is gone.
        drop(sender);
        outcome.batches = match aggregator.await {
            Ok(Ok(batches)) => batches,
            Ok(Err(err)) => {
                error!(category = %category, error = %err, "Aggregator failed");
                0
            }
            Err(err) => {
                error!(category = %category, error = %err, "Aggregator task aborted");
                0
            }
        };

        info!(
            category = %category,
            keys_skipped = outcome.keys_skipped,
            keys_failed = outcome.keys_failed.len(),
            stages_succeeded = outcome.stages_succeeded,
            stages_failed = outcome.stages_failed,
            batches = outcome.batches,
            "Category pipeline finished"
        );

        let error = if outcome.keys_failed.is_empty() {
            None
        } else {
            outcome.keys_failed.sort();
            Some(ApiError::CategoryFailed {
                category: category.to_string(),
                keys: outcome.keys_failed.clone(),
            })
        };
        PipelineReport { outcome, error }
    }
}

/// Work for a single key, moved into its own task.
struct KeyBranch {
    ctx: Arc<EngineContext>,
    category: Category,
    language: String,
    planned: PlannedKey,
    limiter: ConcurrencyLimiter,
    reports: UnboundedSender<StageReport>,
}

impl KeyBranch {
    async fn run(self) -> Result<KeyOutcome, ApiError> {
        let settings = &self.ctx.settings;
        let key = &self.planned.key;
        let scope = TopicScope::new(self.category, &self.planned.locale, key, &self.language);

        let existing = self.ctx.profiles.existing_topic_count(&scope).await?;
        if existing >= settings.target_topic_count {
            debug!(
                category = %self.category,
                key = %key,
                existing,
                target = settings.target_topic_count,
                "Key already has enough topics"
            );
            return Ok(KeyOutcome::Skipped);
        }

        let bound = settings
            .max_topics_per_key
            .min(settings.target_topic_count - existing);
        let prompt = TopicPrompt::new(
            self.category,
            key,
            &self.planned.locale,
            &self.language,
            bound,
            settings.theme_sample_size,
        )
        .render();
        let topics = request_topics(&self.ctx.providers.topics, &prompt, bound).await?;
        if topics.is_empty() {
            return Err(ApiError::GenerationFailed(format!(
                "no topics generated for {} key '{}'",
                self.category, key
            )));
        }

        let theme_group_id = ThemeGroupId::new();
        info!(
            category = %self.category,
            key = %key,
            theme_group_id = %theme_group_id,
            topic_count = topics.len(),
            "Spawning content stages"
        );

        let mut stages = JoinSet::new();
        for topic in topics {
            let request = GenerationRequest {
                category: self.category,
                key: key.clone(),
                topic: topic.clone(),
                language: self.language.clone(),
                locale: self.planned.locale.clone(),
                theme_group_id,
            };
            let stage = ContentStage::new(Arc::clone(&self.ctx));
            let run = stage.run(request, self.limiter.clone(), self.reports.clone());
            let task = format!("stage:{}", topic);
            stages.spawn(async move { (topic, isolate(task, run).await) });
        }

        let mut succeeded = 0;
        let mut failed = 0;
        while let Some(joined) = stages.join_next().await {
            match joined {
                Ok((_, Ok(()))) => succeeded += 1,
                Ok((topic, Err(err))) => {
                    failed += 1;
                    warn!(
                        category = %self.category,
                        key = %key,
                        topic = %topic,
                        error = %err,
                        "Stage failed, topic dropped"
                    );
                }
                Err(err) => {
                    failed += 1;
                    error!(category = %self.category, key = %key, error = %err, "Stage task aborted");
                }
            }
        }

        Ok(KeyOutcome::Generated { succeeded, failed })
    }
}

/// Ask the primary for topics, and the fallback once if the primary came back empty.
async fn request_topics(
    topics: &ProviderPair<dyn TopicGenerator>,
    prompt: &str,
    bound: usize,
) -> Result<Vec<String>, ApiError> {
    let primary = normalize_topics(topics.primary.generate_topics(prompt).await?, bound);
    if !primary.is_empty() {
        return Ok(primary);
    }
    warn!(
        primary = %topics.primary.provider_name(),
        fallback = %topics.fallback.provider_name(),
        "Primary topic generator returned no topics, asking fallback"
    );
    Ok(normalize_topics(
        topics.fallback.generate_topics(prompt).await?,
        bound,
    ))
}
