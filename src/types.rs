//! Core data types shared across the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Content category processed per user.
///
/// Each category is an independent pipeline with its own key set and locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Keys are preferences, grounded in the user's country and city.
    Local = 1,
    /// Keys are religions, grounded in the user's country and tinted by their preferences.
    Faith = 2,
    /// Keys are preferences with no locale.
    Interest = 3,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Local, Category::Faith, Category::Interest];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn slug(self) -> &'static str {
        match self {
            Category::Local => "local",
            Category::Faith => "faith",
            Category::Interest => "interest",
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Category::Local),
            2 => Some(Category::Faith),
            3 => Some(Category::Interest),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Identifier tying together every topic generated for one key in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThemeGroupId(Uuid);

impl ThemeGroupId {
    pub fn new() -> Self {
        ThemeGroupId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ThemeGroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ThemeGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique content item identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentId(Uuid);

impl ContentId {
    pub fn new() -> Self {
        ContentId(Uuid::new_v4())
    }
}

impl Default for ContentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Locale a request is grounded in. Which variant applies depends on the category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocaleContext {
    City { country: String, city: String },
    Faith {
        country: String,
        religion: String,
        preferences: Vec<String>,
    },
    Global,
}

impl LocaleContext {
    /// Scope string used to partition persisted topic counts.
    pub fn scope(&self) -> String {
        match self {
            LocaleContext::City { country, city } => format!("{}/{}", country, city),
            LocaleContext::Faith { country, .. } => country.clone(),
            LocaleContext::Global => String::new(),
        }
    }

    pub fn country(&self) -> Option<&str> {
        match self {
            LocaleContext::City { country, .. } | LocaleContext::Faith { country, .. } => {
                Some(country)
            }
            LocaleContext::Global => None,
        }
    }
}

/// One topic's worth of work handed to a content generation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub category: Category,
    pub key: String,
    pub topic: String,
    pub language: String,
    pub locale: LocaleContext,
    pub theme_group_id: ThemeGroupId,
}

/// Lookup key for persisted topic counts (idempotency check).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicScope {
    pub category: Category,
    pub scope: String,
    pub key: String,
    pub language: String,
}

impl TopicScope {
    pub fn new(category: Category, locale: &LocaleContext, key: &str, language: &str) -> Self {
        Self {
            category,
            scope: locale.scope(),
            key: key.to_string(),
            language: language.to_string(),
        }
    }

    pub fn storage_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.category.id(),
            self.scope,
            self.key,
            self.language
        )
    }
}

/// What a successful stage forwards to its category's result stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub key: String,
    pub theme_group_id: ThemeGroupId,
    pub topic: String,
}

/// A fully assembled content item. Only ever built once text, image and audio exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub category: Category,
    pub category_key: String,
    pub theme_group_id: ThemeGroupId,
    pub topic: String,
    pub text: String,
    pub image_ref: String,
    pub audio_ref: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl ContentItem {
    pub fn assemble(
        request: &GenerationRequest,
        text: String,
        image_ref: String,
        audio_ref: String,
    ) -> Self {
        Self {
            id: ContentId::new(),
            category: request.category,
            category_key: request.key.clone(),
            theme_group_id: request.theme_group_id,
            topic: request.topic.clone(),
            text,
            image_ref,
            audio_ref,
            language: request.language.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Metadata batch persisted once per key after a category's result stream closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub theme_group_id: ThemeGroupId,
    pub category: Category,
    pub key: String,
    pub topics: Vec<String>,
    pub locale: LocaleContext,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl BatchRecord {
    pub fn scope(&self) -> TopicScope {
        TopicScope::new(self.category, &self.locale, &self.key, &self.language)
    }
}
