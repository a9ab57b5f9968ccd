use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "the", "and", "is", "in", "to", "a", "for", "of", "with", "that", "this",
];
const MIN_KEYWORD_CHARS: usize = 4;

/// Search keywords for `text`: lower-cased, punctuation stripped, stopwords
/// and words shorter than four characters dropped, deduplicated.
///
/// Set semantics: the order of the returned keywords carries no meaning.
pub fn extract_keywords(text: &str, max_keywords: usize) -> Result<Vec<String>> {
    static NON_WORD: OnceCell<Regex> = OnceCell::new();
    let non_word = NON_WORD.get_or_try_init(|| {
        Regex::new(r"[^\w\s]").context("failed to compile keyword regex")
    })?;

    let lowered = text.to_lowercase();
    let cleaned = non_word.replace_all(&lowered, "");

    let unique: HashSet<&str> = cleaned
        .split_whitespace()
        .filter(|word| !STOPWORDS.contains(word))
        .filter(|word| word.chars().count() >= MIN_KEYWORD_CHARS)
        .collect();

    Ok(unique
        .into_iter()
        .take(max_keywords)
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "Stop scrolling! This kitchen hack saves time. \
        Prep veggies, freeze portions, and label jars. Follow for more kitchen tips.";

    #[test]
    fn drops_short_words_stopwords_and_punctuation() {
        let all: HashSet<String> = extract_keywords(TEXT, 100).unwrap().into_iter().collect();
        let expected: HashSet<String> = [
            "stop", "scrolling", "kitchen", "hack", "saves", "time", "prep", "veggies",
            "freeze", "portions", "label", "jars", "follow", "more", "tips",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn repeated_extraction_yields_same_set() {
        let first: HashSet<String> = extract_keywords(TEXT, 100).unwrap().into_iter().collect();
        let second: HashSet<String> = extract_keywords(TEXT, 100).unwrap().into_iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn respects_maximum_and_deduplicates() {
        let picked = extract_keywords(TEXT, 3).unwrap();
        assert_eq!(picked.len(), 3);
        let unique: HashSet<&String> = picked.iter().collect();
        assert_eq!(unique.len(), 3);
        assert!(extract_keywords(TEXT, 0).unwrap().is_empty());
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(extract_keywords("a to the of ...", 5).unwrap().is_empty());
    }
}
