//! Content generation stage: one topic in, one content item out.
//!
//! Order inside a stage is fixed: text, then image and audio concurrently under a
//! deadline, then both uploads concurrently, then a detached persist. A limiter slot is
//! held for the whole stage. Any failure before the persist drops the topic.

use super::EngineContext;
use crate::concurrency::{flatten_join, spawn_isolated, ConcurrencyLimiter};
use crate::error::ApiError;
use crate::provider::{GeneratedAsset, Provider, ProviderPair};
use crate::types::{ContentItem, GenerationRequest, StageReport};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Which member of a provider pair was chosen for a call.
struct Selection<P: ?Sized> {
    provider: Arc<P>,
    primary: bool,
}

#[derive(Clone)]
pub struct ContentStage {
    ctx: Arc<EngineContext>,
}

impl ContentStage {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Run the stage and forward its report to `reports` on success.
    pub async fn run(
        self,
        request: GenerationRequest,
        limiter: ConcurrencyLimiter,
        reports: UnboundedSender<StageReport>,
    ) -> Result<(), ApiError> {
        let report = self.execute(request, &limiter).await?;
        if reports.send(report).is_err() {
            warn!("Result stream closed before stage report was delivered");
        }
        Ok(())
    }

    /// Produce one content item for `request`.
    pub async fn execute(
        &self,
        request: GenerationRequest,
        limiter: &ConcurrencyLimiter,
    ) -> Result<StageReport, ApiError> {
        let _permit = limiter.acquire().await?;
        let started = Instant::now();
        debug!(
            category = %request.category,
            key = %request.key,
            topic = %request.topic,
            "Stage started"
        );

        let text = self.generate_text(&request).await?;
        let (image, audio) = self.generate_assets(&request, &text).await?;

        let slug = request.category.slug();
        let image_path = format!("{}/image", slug);
        let audio_path = format!("{}/audio", slug);
        let (image_ref, audio_ref) = tokio::try_join!(
            self.ctx
                .content
                .upload(image.bytes, &image_path, &image.extension),
            self.ctx
                .content
                .upload(audio.bytes, &audio_path, &audio.extension),
        )?;

        let item = ContentItem::assemble(&request, text, image_ref, audio_ref);
        info!(
            category = %request.category,
            key = %request.key,
            topic = %request.topic,
            content_id = %item.id,
            duration_ms = started.elapsed().as_millis() as u64,
            "Content item generated"
        );
        self.persist_detached(item);

        Ok(StageReport {
            key: request.key,
            theme_group_id: request.theme_group_id,
            topic: request.topic,
        })
    }

    async fn generate_text(&self, request: &GenerationRequest) -> Result<String, ApiError> {
        let selection = select(&self.ctx, &self.ctx.providers.text, &request.language).await;
        let generated = selection.provider.generate_text(request).await?;
        if generated.content.trim().is_empty() {
            return Err(ApiError::EmptyResponse(format!(
                "{} returned no text for '{}'",
                selection.provider.provider_name(),
                request.topic
            )));
        }
        if selection.primary {
            record(&self.ctx, selection.provider.provider_name(), generated.usage_units).await;
        }
        Ok(generated.content)
    }

    async fn generate_assets(
        &self,
        request: &GenerationRequest,
        text: &str,
    ) -> Result<(GeneratedAsset, GeneratedAsset), ApiError> {
        let image_task = {
            let image = Arc::clone(&self.ctx.providers.image);
            let request = request.clone();
            let text = text.to_string();
            spawn_isolated(format!("image:{}", request.topic), async move {
                let asset = image.generate_image(&text, &request).await?;
                non_empty(asset, image.provider_name())
            })
        };
        let audio_task = {
            let ctx = Arc::clone(&self.ctx);
            let request = request.clone();
            let text = text.to_string();
            spawn_isolated(format!("audio:{}", request.topic), async move {
                synthesize_audio(&ctx, &text, &request).await
            })
        };

        let image_abort = image_task.abort_handle();
        let audio_abort = audio_task.abort_handle();
        let deadline = self.ctx.settings.asset_deadline();

        match tokio::time::timeout(deadline, async move { tokio::join!(image_task, audio_task) })
            .await
        {
            Ok((image, audio)) => {
                let image = flatten_join("image", image)?;
                let audio = flatten_join("audio", audio)?;
                Ok((image, audio))
            }
            Err(_) => {
                image_abort.abort();
                audio_abort.abort();
                warn!(
                    topic = %request.topic,
                    deadline_ms = deadline.as_millis() as u64,
                    "Image and audio generation exceeded deadline"
                );
                Err(ApiError::Timeout {
                    operation: format!("assets for '{}'", request.topic),
                    elapsed_ms: deadline.as_millis() as u64,
                })
            }
        }
    }

    fn persist_detached(&self, item: ContentItem) {
        let content = Arc::clone(&self.ctx.content);
        let task = format!("persist:{}", item.id);
        drop(spawn_isolated(task, async move {
            if let Err(err) = content.persist_item(&item).await {
                warn!(content_id = %item.id, error = %err, "Failed to persist content item");
            }
            Ok::<_, ApiError>(())
        }));
    }
}

async fn synthesize_audio(
    ctx: &EngineContext,
    text: &str,
    request: &GenerationRequest,
) -> Result<GeneratedAsset, ApiError> {
    let selection = select(ctx, &ctx.providers.audio, &request.language).await;
    let asset = selection.provider.synthesize(text, request).await?;
    let asset = non_empty(asset, selection.provider.provider_name())?;
    if selection.primary {
        record(ctx, selection.provider.provider_name(), asset.usage_units).await;
    }
    Ok(asset)
}

/// Pick the primary unless its budget gate requires the fallback.
///
/// A gate error counts as over budget. The premium-only language always stays on the
/// primary.
async fn select<P: Provider + ?Sized>(
    ctx: &EngineContext,
    pair: &ProviderPair<P>,
    language: &str,
) -> Selection<P> {
    let primary_name = pair.primary.provider_name();
    let over_budget = match ctx.gate.should_fallback(primary_name).await {
        Ok(decision) => decision.fallback,
        Err(err) => {
            warn!(provider = %primary_name, error = %err, "Budget check failed, assuming over budget");
            true
        }
    };

    if over_budget && !ctx.settings.is_premium_only(language) {
        debug!(
            primary = %primary_name,
            fallback = %pair.fallback.provider_name(),
            "Using fallback provider"
        );
        Selection {
            provider: Arc::clone(&pair.fallback),
            primary: false,
        }
    } else {
        Selection {
            provider: Arc::clone(&pair.primary),
            primary: true,
        }
    }
}

async fn record(ctx: &EngineContext, provider: &str, units: u64) {
    if let Err(err) = ctx.gate.record_usage(provider, units).await {
        warn!(provider, units, error = %err, "Failed to record provider usage");
    }
}

fn non_empty(asset: GeneratedAsset, provider: &str) -> Result<GeneratedAsset, ApiError> {
    if asset.bytes.is_empty() {
        return Err(ApiError::EmptyResponse(format!(
            "{} returned an empty .{} payload",
            provider, asset.extension
        )));
    }
    Ok(asset)
}
