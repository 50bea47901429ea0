//! Scripted collaborators for engine tests.
//!
//! `FakeProvider` implements all four generator traits. Its behaviour is set up front
//! (topics per key, which topics fail or panic, delays) and every call is counted so
//! tests can assert which member of a provider pair was used.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tapestry::budget::{BudgetGate, BudgetPolicy};
use tapestry::error::{ApiError, StorageError};
use tapestry::generation::{EngineContext, EngineSettings};
use tapestry::profile::{ProcessingStatus, UserMetadata, UserProfile};
use tapestry::provider::{
    AudioGenerator, GeneratedAsset, GeneratedText, ImageGenerator, Provider, ProviderPair,
    ProviderSet, TextGenerator, TopicGenerator,
};
use tapestry::store::{BudgetStore, ContentStore, MemoryStore, ProfileStore};
use tapestry::types::{BatchRecord, ContentItem, GenerationRequest, TopicScope};

/// Tracks how many calls are inside a provider at once.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Script {
    default_topics: Vec<String>,
    topics_by_key: HashMap<String, Vec<String>>,
    panic_on_key: Option<String>,
    topic_error: bool,
    empty_text: bool,
    fail_topics: HashSet<String>,
    panic_topics: HashSet<String>,
    delay: Duration,
    gauge: Option<Arc<ConcurrencyGauge>>,
}

pub struct FakeProvider {
    name: String,
    script: Mutex<Script>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(Script {
                default_topics: vec!["first topic".to_string(), "second topic".to_string()],
                ..Script::default()
            }),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every topic prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn topics(self, topics: &[&str]) -> Self {
        self.script.lock().default_topics = topics.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn topics_for(self, key: &str, topics: &[&str]) -> Self {
        self.script.lock().topics_by_key.insert(
            key.to_string(),
            topics.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub fn panic_on_key(self, key: &str) -> Self {
        self.script.lock().panic_on_key = Some(key.to_string());
        self
    }

    pub fn topic_error(self) -> Self {
        self.script.lock().topic_error = true;
        self
    }

    pub fn empty_text(self) -> Self {
        self.script.lock().empty_text = true;
        self
    }

    /// Asset and text calls for `topic` return an error.
    pub fn fail_topic(self, topic: &str) -> Self {
        self.script.lock().fail_topics.insert(topic.to_string());
        self
    }

    /// Asset and text calls for `topic` panic.
    pub fn panic_topic(self, topic: &str) -> Self {
        self.script.lock().panic_topics.insert(topic.to_string());
        self
    }

    pub fn delay(self, delay: Duration) -> Self {
        self.script.lock().delay = delay;
        self
    }

    pub fn gauge(self, gauge: Arc<ConcurrencyGauge>) -> Self {
        self.script.lock().gauge = Some(gauge);
        self
    }

    async fn begin(&self, topic: Option<&str>) -> Result<(), ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, gauge, fails, panics) = {
            let script = self.script.lock();
            let fails = topic.is_some_and(|t| script.fail_topics.contains(t));
            let panics = topic.is_some_and(|t| script.panic_topics.contains(t));
            (script.delay, script.gauge.clone(), fails, panics)
        };
        if let Some(gauge) = &gauge {
            gauge.enter();
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(gauge) = &gauge {
            gauge.leave();
        }
        if panics {
            panic!("{} exploded on '{}'", self.name, topic.unwrap_or_default());
        }
        if fails {
            return Err(ApiError::ProviderRequestFailed(format!(
                "{} rejected '{}'",
                self.name,
                topic.unwrap_or_default()
            )));
        }
        Ok(())
    }
}

impl Provider for FakeProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl TopicGenerator for FakeProvider {
    async fn generate_topics(&self, prompt: &str) -> Result<Vec<String>, ApiError> {
        self.prompts.lock().push(prompt.to_string());
        self.begin(None).await?;
        let script = self.script.lock();
        if let Some(key) = &script.panic_on_key {
            if prompt.contains(&format!("\"{}\"", key)) {
                panic!("topic generator exploded on key {}", key);
            }
        }
        if script.topic_error {
            return Err(ApiError::ProviderRequestFailed("topic service down".to_string()));
        }
        let by_key = script
            .topics_by_key
            .iter()
            .find(|(key, _)| prompt.contains(&format!("\"{}\"", key)))
            .map(|(_, topics)| topics.clone());
        Ok(by_key.unwrap_or_else(|| script.default_topics.clone()))
    }
}

#[async_trait]
impl TextGenerator for FakeProvider {
    async fn generate_text(&self, request: &GenerationRequest) -> Result<GeneratedText, ApiError> {
        self.begin(Some(&request.topic)).await?;
        let content = if self.script.lock().empty_text {
            "   ".to_string()
        } else {
            format!("{} wrote about {}", self.name, request.topic)
        };
        Ok(GeneratedText {
            content,
            usage_units: 1_000,
        })
    }
}

#[async_trait]
impl ImageGenerator for FakeProvider {
    async fn generate_image(
        &self,
        _text: &str,
        request: &GenerationRequest,
    ) -> Result<GeneratedAsset, ApiError> {
        self.begin(Some(&request.topic)).await?;
        Ok(GeneratedAsset {
            bytes: format!("png:{}:{}", request.key, request.topic).into_bytes(),
            extension: "png".to_string(),
            usage_units: 1,
        })
    }
}

#[async_trait]
impl AudioGenerator for FakeProvider {
    async fn synthesize(
        &self,
        text: &str,
        request: &GenerationRequest,
    ) -> Result<GeneratedAsset, ApiError> {
        self.begin(Some(&request.topic)).await?;
        Ok(GeneratedAsset {
            bytes: format!("mp3:{}", text).into_bytes(),
            extension: "mp3".to_string(),
            usage_units: text.chars().count() as u64,
        })
    }
}

/// One fake per provider slot.
pub struct Fakes {
    pub topics: Arc<FakeProvider>,
    pub topics_fallback: Arc<FakeProvider>,
    pub text: Arc<FakeProvider>,
    pub text_fallback: Arc<FakeProvider>,
    pub image: Arc<FakeProvider>,
    pub audio: Arc<FakeProvider>,
    pub audio_fallback: Arc<FakeProvider>,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            topics: Arc::new(FakeProvider::new("topics")),
            topics_fallback: Arc::new(FakeProvider::new("topics-backup").topics(&[])),
            text: Arc::new(FakeProvider::new("text")),
            text_fallback: Arc::new(FakeProvider::new("text-backup")),
            image: Arc::new(FakeProvider::new("image")),
            audio: Arc::new(FakeProvider::new("audio")),
            audio_fallback: Arc::new(FakeProvider::new("audio-backup")),
        }
    }
}

impl Fakes {
    pub fn provider_set(&self) -> ProviderSet {
        ProviderSet {
            topics: ProviderPair::new(
                Arc::clone(&self.topics) as Arc<dyn TopicGenerator>,
                Arc::clone(&self.topics_fallback) as Arc<dyn TopicGenerator>,
            ),
            text: ProviderPair::new(
                Arc::clone(&self.text) as Arc<dyn TextGenerator>,
                Arc::clone(&self.text_fallback) as Arc<dyn TextGenerator>,
            ),
            image: Arc::clone(&self.image) as Arc<dyn ImageGenerator>,
            audio: ProviderPair::new(
                Arc::clone(&self.audio) as Arc<dyn AudioGenerator>,
                Arc::clone(&self.audio_fallback) as Arc<dyn AudioGenerator>,
            ),
        }
    }
}

/// Budget policies keyed by the fake primaries' names.
pub fn test_policies() -> HashMap<String, BudgetPolicy> {
    let mut policies = HashMap::new();
    policies.insert("text".to_string(), BudgetPolicy::text_default());
    policies.insert("audio".to_string(), BudgetPolicy::audio_default());
    policies
}

pub fn test_settings() -> EngineSettings {
    EngineSettings {
        concurrency_override: Some(4),
        asset_deadline_secs: 5,
        target_topic_count: 12,
        max_topics_per_key: 2,
        theme_sample_size: 3,
        ..EngineSettings::default()
    }
}

/// Engine context over a shared memory store.
pub fn engine(fakes: &Fakes, store: &Arc<MemoryStore>, settings: EngineSettings) -> EngineContext {
    engine_with_profiles(fakes, store, Arc::clone(store) as Arc<dyn ProfileStore>, settings)
}

pub fn engine_with_profiles(
    fakes: &Fakes,
    store: &Arc<MemoryStore>,
    profiles: Arc<dyn ProfileStore>,
    settings: EngineSettings,
) -> EngineContext {
    let gate = BudgetGate::new(Arc::clone(store) as Arc<dyn BudgetStore>, test_policies());
    EngineContext {
        providers: fakes.provider_set(),
        content: Arc::clone(store) as Arc<dyn ContentStore>,
        profiles,
        gate: Arc::new(gate),
        settings,
    }
}

pub fn metadata(preferences: &[&str], religions: &[&str]) -> UserMetadata {
    UserMetadata {
        email: "user@example.com".to_string(),
        country: String::new(),
        city: String::new(),
        religions: religions.iter().map(|r| r.to_string()).collect(),
        preferences: preferences.iter().map(|p| p.to_string()).collect(),
        language: "en".to_string(),
    }
}

/// Wait for detached item persists to land.
pub async fn wait_for_items(store: &MemoryStore, expected: usize) -> usize {
    for _ in 0..200 {
        if store.items().len() >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    store.items().len()
}

/// Profile store whose `completed` write always fails.
pub struct RefusesCompletion {
    inner: Arc<MemoryStore>,
}

impl RefusesCompletion {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ProfileStore for RefusesCompletion {
    async fn upsert(
        &self,
        metadata: &UserMetadata,
        status: ProcessingStatus,
    ) -> Result<(), StorageError> {
        self.inner.upsert(metadata, status).await
    }

    async fn get(&self, email: &str) -> Result<Option<UserProfile>, StorageError> {
        self.inner.get(email).await
    }

    async fn set_status(&self, email: &str, status: ProcessingStatus) -> Result<(), StorageError> {
        if status == ProcessingStatus::Completed {
            return Err(StorageError::Backend("profile table unavailable".to_string()));
        }
        self.inner.set_status(email, status).await
    }

    async fn existing_topic_count(&self, scope: &TopicScope) -> Result<usize, StorageError> {
        self.inner.existing_topic_count(scope).await
    }
}

/// Content store that rejects uploads under one path and delegates everything else.
pub struct RefusesUploads {
    inner: Arc<MemoryStore>,
    path: String,
}

impl RefusesUploads {
    pub fn new(inner: Arc<MemoryStore>, path: &str) -> Self {
        Self {
            inner,
            path: path.to_string(),
        }
    }
}

#[async_trait]
impl ContentStore for RefusesUploads {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        category: &str,
        extension: &str,
    ) -> Result<String, StorageError> {
        if category == self.path {
            return Err(StorageError::Backend(format!("bucket {} unavailable", category)));
        }
        self.inner.upload(bytes, category, extension).await
    }

    async fn persist_item(&self, item: &ContentItem) -> Result<(), StorageError> {
        self.inner.persist_item(item).await
    }

    async fn persist_batch(&self, record: &BatchRecord) -> Result<(), StorageError> {
        self.inner.persist_batch(record).await
    }
}
