//! Content Generation Providers
//!
//! Provider-agnostic contracts for topic, text, image and audio generation. Each asset
//! type that supports fallback is configured as a primary/fallback pair, and the pair
//! members are interchangeable behind the same trait.

use crate::error::ApiError;
use crate::types::GenerationRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod openai;

pub use openai::OpenAiCompatibleClient;

/// Common identity for every provider client.
pub trait Provider: Send + Sync {
    /// Name used for logging and as the budget gate key
    fn provider_name(&self) -> &str;
}

/// Generated text plus the usage it cost (tokens).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedText {
    pub content: String,
    pub usage_units: u64,
}

/// A binary asset (image or audio).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAsset {
    pub bytes: Vec<u8>,
    pub extension: String,
    pub usage_units: u64,
}

#[async_trait]
pub trait TopicGenerator: Provider {
    /// Ordered topic list for a rendered prompt.
    async fn generate_topics(&self, prompt: &str) -> Result<Vec<String>, ApiError>;
}

#[async_trait]
pub trait TextGenerator: Provider {
    async fn generate_text(&self, request: &GenerationRequest) -> Result<GeneratedText, ApiError>;
}

#[async_trait]
pub trait ImageGenerator: Provider {
    async fn generate_image(
        &self,
        text: &str,
        request: &GenerationRequest,
    ) -> Result<GeneratedAsset, ApiError>;
}

#[async_trait]
pub trait AudioGenerator: Provider {
    async fn synthesize(
        &self,
        text: &str,
        request: &GenerationRequest,
    ) -> Result<GeneratedAsset, ApiError>;
}

/// Primary provider and the provider that replaces it when the primary is over budget.
pub struct ProviderPair<P: ?Sized> {
    pub primary: Arc<P>,
    pub fallback: Arc<P>,
}

impl<P: ?Sized> ProviderPair<P> {
    pub fn new(primary: Arc<P>, fallback: Arc<P>) -> Self {
        Self { primary, fallback }
    }
}

impl<P: ?Sized> Clone for ProviderPair<P> {
    fn clone(&self) -> Self {
        Self {
            primary: Arc::clone(&self.primary),
            fallback: Arc::clone(&self.fallback),
        }
    }
}

/// Every provider the engine calls.
///
/// The image path has a single provider and no budget gate; text and audio are gated.
#[derive(Clone)]
pub struct ProviderSet {
    pub topics: ProviderPair<dyn TopicGenerator>,
    pub text: ProviderPair<dyn TextGenerator>,
    pub image: Arc<dyn ImageGenerator>,
    pub audio: ProviderPair<dyn AudioGenerator>,
}

/// Provider API flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    #[serde(rename = "openai")]
    OpenAI,
    LocalCustom,
}

/// Configuration for one provider client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name used as the budget key (defaults to the provider type slug)
    #[serde(default)]
    pub provider_name: Option<String>,
    pub provider_type: ProviderType,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL, required for `local_custom`
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Speech voice (audio providers only)
    #[serde(default)]
    pub voice: Option<String>,
}

impl ProviderConfig {
    pub fn openai(model: &str) -> Self {
        Self {
            provider_name: None,
            provider_type: ProviderType::OpenAI,
            model: model.to_string(),
            api_key: None,
            endpoint: None,
            voice: None,
        }
    }

    pub fn resolved_name(&self) -> String {
        self.provider_name.clone().unwrap_or_else(|| {
            match self.provider_type {
                ProviderType::OpenAI => "openai",
                ProviderType::LocalCustom => "local",
            }
            .to_string()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("Invalid endpoint URL: {}", endpoint));
            }
        }
        if self.provider_type == ProviderType::LocalCustom && self.endpoint.is_none() {
            return Err("local_custom providers require an endpoint".to_string());
        }
        Ok(())
    }
}

/// Provider configuration for every slot in a [`ProviderSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub topic_primary: ProviderConfig,
    pub topic_fallback: ProviderConfig,
    pub text_primary: ProviderConfig,
    pub text_fallback: ProviderConfig,
    pub image: ProviderConfig,
    pub audio_primary: ProviderConfig,
    pub audio_fallback: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        let mut text_fallback = ProviderConfig::openai("gpt-4o-mini");
        text_fallback.provider_name = Some("openai-mini".to_string());
        let mut audio_primary = ProviderConfig::openai("tts-1-hd");
        audio_primary.provider_name = Some("openai-tts-hd".to_string());
        audio_primary.voice = Some("alloy".to_string());
        let mut audio_fallback = ProviderConfig::openai("tts-1");
        audio_fallback.provider_name = Some("openai-tts".to_string());
        audio_fallback.voice = Some("alloy".to_string());

        Self {
            topic_primary: ProviderConfig::openai("gpt-4o"),
            topic_fallback: text_fallback.clone(),
            text_primary: ProviderConfig::openai("gpt-4o"),
            text_fallback,
            image: ProviderConfig::openai("dall-e-3"),
            audio_primary,
            audio_fallback,
        }
    }
}

impl ProvidersConfig {
    pub fn slots(&self) -> [(&'static str, &ProviderConfig); 7] {
        [
            ("topic_primary", &self.topic_primary),
            ("topic_fallback", &self.topic_fallback),
            ("text_primary", &self.text_primary),
            ("text_fallback", &self.text_fallback),
            ("image", &self.image),
            ("audio_primary", &self.audio_primary),
            ("audio_fallback", &self.audio_fallback),
        ]
    }
}

/// Builds provider clients from configuration.
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_client(config: &ProviderConfig) -> Result<Arc<OpenAiCompatibleClient>, ApiError> {
        config
            .validate()
            .map_err(|e| ApiError::ProviderNotConfigured(format!("{}: {}", config.model, e)))?;
        let api_key = match config.provider_type {
            ProviderType::OpenAI => Some(config.api_key.clone().ok_or_else(|| {
                ApiError::ProviderNotConfigured(format!(
                    "API key required for provider '{}'",
                    config.resolved_name()
                ))
            })?),
            ProviderType::LocalCustom => config.api_key.clone(),
        };
        Ok(Arc::new(OpenAiCompatibleClient::new(
            config.resolved_name(),
            config.model.clone(),
            api_key,
            config.endpoint.clone(),
            config.voice.clone(),
        )?))
    }

    pub fn build_set(config: &ProvidersConfig) -> Result<ProviderSet, ApiError> {
        let topic_primary: Arc<dyn TopicGenerator> = Self::create_client(&config.topic_primary)?;
        let topic_fallback: Arc<dyn TopicGenerator> = Self::create_client(&config.topic_fallback)?;
        let text_primary: Arc<dyn TextGenerator> = Self::create_client(&config.text_primary)?;
        let text_fallback: Arc<dyn TextGenerator> = Self::create_client(&config.text_fallback)?;
        let image: Arc<dyn ImageGenerator> = Self::create_client(&config.image)?;
        let audio_primary: Arc<dyn AudioGenerator> = Self::create_client(&config.audio_primary)?;
        let audio_fallback: Arc<dyn AudioGenerator> = Self::create_client(&config.audio_fallback)?;

        Ok(ProviderSet {
            topics: ProviderPair::new(topic_primary, topic_fallback),
            text: ProviderPair::new(text_primary, text_fallback),
            image,
            audio: ProviderPair::new(audio_primary, audio_fallback),
        })
    }
}
