//! Topic prompts
//!
//! Each category has a fixed theme vocabulary. A prompt draws a small sample from it,
//! ranked by a blake3 digest of (category, key, theme), so the same key always sees
//! the same angles while different keys spread across the vocabulary.

use crate::types::{Category, LocaleContext};

const LOCAL_THEMES: &[&str] = &[
    "food and drink",
    "seasonal events",
    "local history",
    "parks and nature",
    "nightlife",
    "architecture",
    "markets and shops",
    "sports clubs",
    "live music",
    "neighbourhood people",
];

const FAITH_THEMES: &[&str] = &[
    "festivals",
    "sacred texts",
    "history",
    "daily practice",
    "pilgrimage",
    "charity",
    "community life",
    "reflection",
];

const INTEREST_THEMES: &[&str] = &[
    "recent trends",
    "how-to guides",
    "origins",
    "notable people",
    "the science behind it",
    "culture",
    "tools and gear",
    "personal stories",
];

pub fn theme_vocabulary(category: Category) -> &'static [&'static str] {
    match category {
        Category::Local => LOCAL_THEMES,
        Category::Faith => FAITH_THEMES,
        Category::Interest => INTEREST_THEMES,
    }
}

fn theme_rank(category: Category, key: &str, theme: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[category.id()]);
    hasher.update(key.as_bytes());
    hasher.update(&[0]);
    hasher.update(theme.as_bytes());
    hasher.finalize()
}

/// Deterministic sample of up to `size` themes for `key`.
pub fn sample_themes(category: Category, key: &str, size: usize) -> Vec<&'static str> {
    let mut ranked: Vec<([u8; 32], &'static str)> = theme_vocabulary(category)
        .iter()
        .map(|theme| (*theme_rank(category, key, theme).as_bytes(), *theme))
        .collect();
    ranked.sort_unstable();
    ranked.into_iter().take(size).map(|(_, theme)| theme).collect()
}

/// Rendered request for a topic list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPrompt {
    pub key: String,
    pub locale: LocaleContext,
    pub language: String,
    pub count: usize,
    pub themes: Vec<&'static str>,
}

impl TopicPrompt {
    pub fn new(
        category: Category,
        key: &str,
        locale: &LocaleContext,
        language: &str,
        count: usize,
        sample_size: usize,
    ) -> Self {
        Self {
            key: key.to_string(),
            locale: locale.clone(),
            language: language.to_string(),
            count,
            themes: sample_themes(category, key, sample_size),
        }
    }

    pub fn render(&self) -> String {
        let place = match &self.locale {
            LocaleContext::City { country, city } if city.is_empty() => format!(" in {}", country),
            LocaleContext::City { country, city } => format!(" in {}, {}", city, country),
            LocaleContext::Faith {
                country,
                religion,
                preferences,
            } => {
                let mut place = format!(" for followers of {}", religion);
                if !country.is_empty() {
                    place.push_str(&format!(" living in {}", country));
                }
                if !preferences.is_empty() {
                    place.push_str(&format!(" who enjoy {}", preferences.join(", ")));
                }
                place
            }
            LocaleContext::Global => String::new(),
        };
        format!(
            "Suggest {} distinct article topics about \"{}\"{}. Consider these angles: {}. \
             Write the topics in language '{}'. Return one topic per line with no numbering.",
            self.count,
            self.key,
            place,
            self.themes.join(", "),
            self.language
        )
    }
}
