//! OpenAI-compatible provider client.
//!
//! One client type serves every asset slot: chat completions for topics and text, the
//! image generation endpoint for images, and the speech endpoint for audio. Local servers
//! exposing the same API are reached through a custom endpoint.

use super::{
    AudioGenerator, GeneratedAsset, GeneratedText, ImageGenerator, Provider, TextGenerator,
    TopicGenerator,
};
use crate::error::ApiError;
use crate::types::{GenerationRequest, LocaleContext};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PROVIDER_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_VOICE: &str = "alloy";
const IMAGE_SIZE: &str = "1024x1024";

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u64,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

// Helper function to map HTTP errors to ApiError
fn map_http_error(error: reqwest::Error) -> ApiError {
    if let Some(status) = error.status() {
        map_status(status.as_u16(), &error.to_string())
    } else if error.is_timeout() {
        ApiError::ProviderRequestFailed(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::ProviderRequestFailed(format!("Connection error: {}", error))
    } else {
        ApiError::ProviderError(format!("HTTP error: {}", error))
    }
}

fn map_status(status: u16, detail: &str) -> ApiError {
    match status {
        401 => ApiError::ProviderAuthFailed(format!("Authentication failed: {}", detail)),
        429 => ApiError::ProviderRateLimit(format!("Rate limit exceeded: {}", detail)),
        404 => ApiError::ProviderNotConfigured(format!("Model not found: {}", detail)),
        _ => ApiError::ProviderRequestFailed(format!(
            "Request failed with status {}: {}",
            status, detail
        )),
    }
}

/// Split a completion into topics, dropping list markers and blank lines.
pub fn parse_topic_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .trim_start_matches(['.', ')', '-', '*', '•'])
                .trim()
                .trim_matches('"')
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

fn locale_hint(locale: &LocaleContext) -> String {
    match locale {
        LocaleContext::City { country, city } => format!(" for readers in {}, {}", city, country),
        LocaleContext::Faith {
            country,
            religion,
            preferences,
        } if preferences.is_empty() => format!(" for {} readers in {}", religion, country),
        LocaleContext::Faith {
            country,
            religion,
            preferences,
        } => format!(
            " for {} readers in {} who enjoy {}",
            religion,
            country,
            preferences.join(", ")
        ),
        LocaleContext::Global => String::new(),
    }
}

pub struct OpenAiCompatibleClient {
    client: Client,
    name: String,
    model: String,
    api_key: Option<String>,
    base_url: String,
    voice: String,
}

impl OpenAiCompatibleClient {
    pub fn new(
        name: String,
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        voice: Option<String>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
            .timeout(PROVIDER_HTTP_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::ProviderError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            name,
            model,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            voice: voice.unwrap_or_else(|| DEFAULT_VOICE.to_string()),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let request = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(map_http_error)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status, &error_text));
        }
        Ok(response)
    }

    async fn chat(&self, system: &str, user: String) -> Result<GeneratedText, ApiError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: Some(0.9),
        };

        let completion: ChatCompletionResponse = self
            .send(self.post("chat/completions").json(&request))
            .await?
            .json()
            .await
            .map_err(|e| ApiError::ProviderError(format!("Failed to parse response: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| ApiError::EmptyResponse(format!("{}: no choices", self.name)))?;

        Ok(GeneratedText {
            content,
            usage_units: completion.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }
}

impl Provider for OpenAiCompatibleClient {
    fn provider_name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl TopicGenerator for OpenAiCompatibleClient {
    async fn generate_topics(&self, prompt: &str) -> Result<Vec<String>, ApiError> {
        let completion = self
            .chat(
                "You propose short article topics. Answer with one topic per line.",
                prompt.to_string(),
            )
            .await?;
        let topics = parse_topic_lines(&completion.content);
        debug!(provider = %self.name, topic_count = topics.len(), "Parsed topic list");
        Ok(topics)
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleClient {
    async fn generate_text(&self, request: &GenerationRequest) -> Result<GeneratedText, ApiError> {
        let user = format!(
            "Write a short article about \"{}\" (theme: {}){}. Respond in language '{}'.",
            request.topic,
            request.key,
            locale_hint(&request.locale),
            request.language
        );
        self.chat("You write engaging short-form articles.", user)
            .await
    }
}

#[async_trait]
impl ImageGenerator for OpenAiCompatibleClient {
    async fn generate_image(
        &self,
        text: &str,
        request: &GenerationRequest,
    ) -> Result<GeneratedAsset, ApiError> {
        let summary: String = text.chars().take(600).collect();
        let body = json!({
            "model": self.model,
            "prompt": format!("Illustration for \"{}\": {}", request.topic, summary),
            "size": IMAGE_SIZE,
            "n": 1,
            "response_format": "b64_json",
        });

        let images: ImageResponse = self
            .send(self.post("images/generations").json(&body))
            .await?
            .json()
            .await
            .map_err(|e| ApiError::ProviderError(format!("Failed to parse image response: {}", e)))?;

        let encoded = images
            .data
            .into_iter()
            .find_map(|d| d.b64_json)
            .ok_or_else(|| ApiError::EmptyResponse(format!("{}: no image data", self.name)))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ApiError::ProviderError(format!("Invalid image payload: {}", e)))?;

        Ok(GeneratedAsset {
            bytes,
            extension: "png".to_string(),
            usage_units: 1,
        })
    }
}

#[async_trait]
impl AudioGenerator for OpenAiCompatibleClient {
    async fn synthesize(
        &self,
        text: &str,
        _request: &GenerationRequest,
    ) -> Result<GeneratedAsset, ApiError> {
        let body = json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": "mp3",
        });

        let bytes = self
            .send(self.post("audio/speech").json(&body))
            .await?
            .bytes()
            .await
            .map_err(map_http_error)?;

        Ok(GeneratedAsset {
            bytes: bytes.to_vec(),
            extension: "mp3".to_string(),
            usage_units: text.chars().count() as u64,
        })
    }
}
