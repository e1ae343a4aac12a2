/// Keyword and modifier extraction from free text.
///
/// Free text is normalized by lowercasing and turning everything that is not an ASCII
/// letter or digit into a space. Keywords are the remaining tokens of at least three
/// characters that are not stopwords, deduplicated in order of first appearance.
/// Modifier extraction also recognizes multi-word rule vocabulary ("grade a"), which the
/// keyword pass alone would lose to the length filter.
use std::collections::HashSet;

use crate::model::Modifier;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "is",
    "are", "was", "were", "be", "been", "being", "this", "that", "these", "those", "it", "its",
    "as", "by", "from", "has", "have", "had", "will", "would", "can", "could", "should", "used",
    "use", "etc",
];

const MIN_KEYWORD_LEN: usize = 3;

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Lowercase and replace non-alphanumerics with single spaces.
pub fn normalize_text(text: &str) -> String {
    let replaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether `phrase` occurs in `text` on word boundaries (both sides normalized).
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    let phrase = normalize_text(phrase);
    if phrase.is_empty() {
        return false;
    }
    let haystack = format!(" {} ", normalize_text(text));
    haystack.contains(&format!(" {phrase} "))
}

/// Extract up to `max_keywords` unique keywords from `text`.
pub fn extract_keywords(text: &str, max_keywords: usize) -> Vec<String> {
    let normalized = normalize_text(text);
    let mut seen = HashSet::new();
    normalized
        .split(' ')
        .filter(|w| w.len() >= MIN_KEYWORD_LEN && !is_stopword(w))
        .filter(|w| seen.insert(w.to_string()))
        .take(max_keywords)
        .map(str::to_string)
        .collect()
}

/// Extract modifiers from `text`.
///
/// Multi-word `vocabulary` phrases are matched first, longest first, and consume their
/// tokens, so "not decaffeinated" yields one modifier instead of a stray
/// "decaffeinated". The remaining text contributes its keywords.
pub fn extract_modifiers<S: AsRef<str>>(text: &str, vocabulary: &[S]) -> Vec<Modifier> {
    let mut phrases: Vec<String> = vocabulary
        .iter()
        .map(|p| normalize_text(p.as_ref()))
        .filter(|p| p.contains(' '))
        .collect();
    phrases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    phrases.dedup();

    let mut remaining = format!(" {} ", normalize_text(text));
    let mut matched: Vec<Modifier> = Vec::new();
    for phrase in &phrases {
        let needle = format!(" {phrase} ");
        if remaining.contains(&needle) {
            remaining = remaining.replace(&needle, " ");
            // Adjacent occurrences share a space and survive one pass.
            while remaining.contains(&needle) {
                remaining = remaining.replace(&needle, " ");
            }
            matched.extend(Modifier::new(phrase));
        }
    }

    let mut modifiers: Vec<Modifier> = extract_keywords(&remaining, usize::MAX)
        .iter()
        .filter_map(|k| Modifier::new(k))
        .collect();
    for m in matched {
        if !modifiers.contains(&m) {
            modifiers.push(m);
        }
    }
    modifiers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("Coffee, NOT roasted!"), "coffee not roasted");
        assert_eq!(normalize_text("  --  "), "");
    }

    #[test]
    fn test_extract_keywords_drops_stopwords_and_short_words() {
        let keywords = extract_keywords("Brake pads for the cars of a truck, brake", 15);
        assert_eq!(keywords, vec!["brake", "pads", "cars", "truck"]);
    }

    #[test]
    fn test_extract_keywords_respects_limit() {
        let keywords = extract_keywords("one two three four five", 2);
        assert_eq!(keywords, vec!["one", "two"]);
    }

    #[test]
    fn test_contains_phrase_uses_word_boundaries() {
        assert!(contains_phrase("Arabica, Grade A beans", "grade a"));
        assert!(!contains_phrase("Arabica grade ab", "grade a"));
        assert!(!contains_phrase("anything", ""));
    }

    #[test]
    fn test_extract_modifiers_includes_vocabulary_phrases() {
        let modifiers = extract_modifiers("arabica grade A", &["grade a", "robusta"]);
        let tokens: Vec<&str> = modifiers.iter().map(|m| m.as_str()).collect();
        assert_eq!(tokens, vec!["arabica", "grade a"]);
    }

    #[test]
    fn test_extract_modifiers_consumes_longest_phrase() {
        let vocabulary = ["not decaffeinated", "decaffeinated"];
        let modifiers = extract_modifiers("Coffee, not decaffeinated", &vocabulary);
        let tokens: Vec<&str> = modifiers.iter().map(|m| m.as_str()).collect();
        assert_eq!(tokens, vec!["coffee", "not decaffeinated"]);
    }
}
