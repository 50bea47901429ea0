//! Orchestrator
//!
//! Entry point for a submission. `submit` validates the metadata, marks the profile
//! in progress and hands the run to a detached task; the run fans out to the three
//! category pipelines, joins them, and records the final processing status.

use crate::budget::BudgetGate;
use crate::concurrency::{flatten_join, isolate, spawn_isolated};
use crate::config::TapestryConfig;
use crate::error::ApiError;
use crate::generation::{
    CategoryPipeline, CategoryPlan, EngineContext, PipelineOutcome, PipelineReport,
};
use crate::profile::{ProcessingStatus, UserMetadata};
use crate::provider::ProviderFactory;
use crate::types::Category;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

/// Result of one category within a run.
///
/// `outcome` is filled in even when `error` is set; a panicking pipeline leaves it at
/// its default.
#[derive(Debug, Clone)]
pub struct CategoryReport {
    pub category: Category,
    pub outcome: PipelineOutcome,
    pub error: Option<ApiError>,
}

impl CategoryReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// What a finished run reports to whoever awaits its handle.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub email: String,
    pub status: ProcessingStatus,
    /// One report per category, in category order
    pub categories: Vec<CategoryReport>,
    /// Most stages that held a limiter slot at the same time
    pub peak_concurrency: usize,
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// Content items produced across all categories, including the successful keys of
    /// categories that also had failures.
    pub fn items_generated(&self) -> usize {
        self.categories
            .iter()
            .map(|report| report.outcome.stages_succeeded)
            .sum()
    }

    pub fn failed_categories(&self) -> Vec<Category> {
        self.categories
            .iter()
            .filter(|report| !report.is_ok())
            .map(|report| report.category)
            .collect()
    }
}

/// Handle to a detached run. Dropping it leaves the run going.
pub struct RunHandle {
    email: String,
    handle: JoinHandle<Result<RunSummary, ApiError>>,
}

impl RunHandle {
    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run to finish.
    pub async fn wait(self) -> Result<RunSummary, ApiError> {
        flatten_join("run", self.handle.await)
    }
}

pub struct Orchestrator {
    ctx: Arc<EngineContext>,
}

impl Orchestrator {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    /// Build providers, stores and the budget gate from configuration.
    pub fn from_config(config: &TapestryConfig) -> Result<Self, ApiError> {
        let stores = config.storage.open()?;
        let providers = ProviderFactory::build_set(&config.providers)?;
        let gate = BudgetGate::new(stores.budgets, config.budget.clone());
        Ok(Self::new(EngineContext {
            providers,
            content: stores.content,
            profiles: stores.profiles,
            gate: Arc::new(gate),
            settings: config.engine.clone(),
        }))
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Accept a submission and start its run in the background.
    ///
    /// Only validation and the initial profile write can fail here; everything after
    /// that is reported through the returned handle.
    pub async fn submit(&self, metadata: UserMetadata) -> Result<RunHandle, ApiError> {
        metadata.validate()?;
        self.ctx
            .profiles
            .upsert(&metadata, ProcessingStatus::InProgress)
            .await?;
        info!(email = %metadata.email, language = %metadata.language, "Submission accepted");

        let email = metadata.email.clone();
        let ctx = Arc::clone(&self.ctx);
        let handle = spawn_isolated(format!("run:{}", email), execute_run(ctx, metadata));
        Ok(RunHandle { email, handle })
    }
}

async fn execute_run(ctx: Arc<EngineContext>, metadata: UserMetadata) -> Result<RunSummary, ApiError> {
    let started = Instant::now();
    let limiter = ctx.settings.limiter();
    info!(
        email = %metadata.email,
        capacity = limiter.capacity(),
        "Run started"
    );

    let mut pipelines = JoinSet::new();
    for plan in CategoryPlan::all(&metadata) {
        let pipeline = CategoryPipeline::new(Arc::clone(&ctx), plan, limiter.clone());
        let category = pipeline.category();
        let task = format!("pipeline:{}", category);
        pipelines.spawn(async move {
            let report = isolate(task, async move { Ok(pipeline.run().await) }).await;
            (category, report)
        });
    }

    let mut categories = Vec::with_capacity(Category::ALL.len());
    while let Some(joined) = pipelines.join_next().await {
        match joined {
            Ok((category, report)) => {
                let (outcome, error) = match report {
                    Ok(PipelineReport { outcome, error }) => (outcome, error),
                    Err(err) => (PipelineOutcome::default(), Some(err)),
                };
                if let Some(err) = &error {
                    warn!(category = %category, error = %err, "Category did not complete cleanly");
                }
                categories.push(CategoryReport {
                    category,
                    outcome,
                    error,
                });
            }
            Err(err) => error!(error = %err, "Category pipeline task aborted"),
        }
    }
    categories.sort_by_key(|report| report.category.id());

    let status = finalize_status(&ctx, &metadata.email).await;
    let summary = RunSummary {
        email: metadata.email,
        status,
        categories,
        peak_concurrency: limiter.peak(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        email = %summary.email,
        status = %summary.status,
        items = summary.items_generated(),
        failed_categories = summary.failed_categories().len(),
        peak_concurrency = summary.peak_concurrency,
        elapsed_ms = summary.elapsed_ms,
        "Run finished"
    );
    Ok(summary)
}

/// Mark the profile completed, or failed when that write does not go through.
async fn finalize_status(ctx: &EngineContext, email: &str) -> ProcessingStatus {
    match ctx
        .profiles
        .set_status(email, ProcessingStatus::Completed)
        .await
    {
        Ok(()) => ProcessingStatus::Completed,
        Err(err) => {
            error!(email, error = %err, "Failed to mark run completed");
            if let Err(err) = ctx.profiles.set_status(email, ProcessingStatus::Failed).await {
                error!(email, error = %err, "Failed to mark run failed");
            }
            ProcessingStatus::Failed
        }
    }
}
