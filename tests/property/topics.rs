//! Properties of topic normalization and theme sampling

use proptest::prelude::*;
use std::collections::HashSet;
use tapestry::generation::{normalize_topics, sample_themes, theme_vocabulary};
use tapestry::types::Category;

fn category_strategy() -> impl Strategy<Value = Category> {
    prop::sample::select(Category::ALL.to_vec())
}

proptest! {
    #[test]
    fn normalized_topics_are_bounded_trimmed_and_unique(
        raw in prop::collection::vec("[ a-zA-Z]{0,12}", 0..20),
        bound in 0usize..8,
    ) {
        let topics = normalize_topics(raw, bound);
        prop_assert!(topics.len() <= bound);

        let mut seen = HashSet::new();
        for topic in &topics {
            prop_assert!(!topic.is_empty());
            prop_assert_eq!(topic.trim(), topic.as_str());
            prop_assert!(seen.insert(topic.to_lowercase()));
        }
    }

    #[test]
    fn theme_sample_is_stable_and_drawn_from_vocabulary(
        category in category_strategy(),
        key in "[A-Za-z ]{1,16}",
        size in 0usize..12,
    ) {
        let first = sample_themes(category, &key, size);
        let second = sample_themes(category, &key, size);
        prop_assert_eq!(&first, &second);

        let vocabulary = theme_vocabulary(category);
        prop_assert_eq!(first.len(), size.min(vocabulary.len()));
        let unique: HashSet<_> = first.iter().collect();
        prop_assert_eq!(unique.len(), first.len());
        prop_assert!(first.iter().all(|theme| vocabulary.contains(theme)));
    }
}
