//! Username suggestions.

use uuid::Uuid;

use crate::config::ValidationConfig;
use crate::traits::DataStore;

use super::engine::check_availability;
use super::rules::{check_format, FormatCheck};

const ADJECTIVES: &[&str] = &[
    "happy", "cool", "smart", "quick", "bright", "swift", "bold", "wise",
];

const NOUNS: &[&str] = &[
    "panda", "eagle", "tiger", "wolf", "fox", "bear", "lion", "hawk",
];

/// Uniform-enough integer in `0..bound` from a fresh v4 UUID.
fn random_below(bound: usize) -> usize {
    (Uuid::new_v4().as_u128() % bound as u128) as usize
}

fn pick<'a>(words: &[&'a str]) -> &'a str {
    words.get(random_below(words.len())).copied().unwrap_or("user")
}

/// Up to `count` distinct `base` + number variants.
pub fn suggest_alternatives(base: &str, count: usize) -> Vec<String> {
    let mut suggestions: Vec<String> = Vec::with_capacity(count);
    // Bounded so a tiny number space cannot loop forever.
    for _ in 0..count * 8 {
        if suggestions.len() == count {
            break;
        }
        let candidate = format!("{}{}", base, random_below(999));
        if !suggestions.contains(&candidate) {
            suggestions.push(candidate);
        }
    }
    suggestions
}

/// A random `adjective_noun` + number username, e.g. `swift_fox417`.
pub fn generate_random_username() -> String {
    format!("{}_{}{}", pick(ADJECTIVES), pick(NOUNS), random_below(999))
}

/// Suggestions for `base` that pass the format rules and are free in the
/// store right now. Availability may change before the user submits.
pub async fn available_alternatives(
    store: &dyn DataStore,
    config: &ValidationConfig,
    base: &str,
    count: usize,
) -> Vec<String> {
    let mut available = Vec::new();
    for candidate in suggest_alternatives(base, count) {
        if check_format(&candidate, config) != FormatCheck::Passed {
            continue;
        }
        if check_availability(store, config, &candidate).await.is_valid() {
            available.push(candidate);
        }
    }
    available
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::InMemoryStore;

    #[test]
    fn test_suggest_alternatives_are_distinct_and_prefixed() {
        let suggestions = suggest_alternatives("cool_fox", 3);
        assert_eq!(suggestions.len(), 3);
        for suggestion in &suggestions {
            assert!(suggestion.starts_with("cool_fox"));
            assert!(suggestion["cool_fox".len()..].parse::<u32>().is_ok());
        }
        let unique: std::collections::HashSet<_> = suggestions.iter().collect();
        assert_eq!(unique.len(), suggestions.len());
    }

    #[test]
    fn test_random_username_passes_format_rules() {
        let config = ValidationConfig::default();
        for _ in 0..50 {
            let name = generate_random_username();
            assert_eq!(check_format(&name, &config), FormatCheck::Passed, "{name}");
            assert!(name.contains('_'));
        }
    }

    #[tokio::test]
    async fn test_available_alternatives_skip_invalid_base() {
        let store = InMemoryStore::new();
        let config = ValidationConfig::default();

        // A leading digit survives the suffix, so nothing is offered.
        let none = available_alternatives(&store, &config, "9fox", 3).await;
        assert!(none.is_empty());
        assert_eq!(store.query_count(), 0);

        let some = available_alternatives(&store, &config, "cool_fox", 3).await;
        assert_eq!(some.len(), 3);
    }
}
