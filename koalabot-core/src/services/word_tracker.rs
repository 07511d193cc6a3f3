// File: koalabot-core/src/services/word_tracker.rs

use std::path::Path;
use regex::{Regex, RegexBuilder};
use tracing::{info, warn};

use koalabot_common::models::TrackedWord;
use crate::Error;

/// A tracked word with its patterns compiled.
#[derive(Debug, Clone)]
pub struct WordMatcher {
    word: String,
    patterns: Vec<Regex>,
}

impl WordMatcher {
    /// Patterns that fail to compile are logged and dropped.
    pub fn new(tracked: &TrackedWord) -> Self {
        let patterns = tracked
            .matches
            .iter()
            .filter_map(|p| match compile_pattern(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Dropping invalid pattern {:?} for tracked word {:?}: {}", p, tracked.word, e);
                    None
                }
            })
            .collect();

        Self {
            word: tracked.word.clone(),
            patterns,
        }
    }

    /// Builds a matcher for an ad-hoc word or pattern. If `pattern` is not a
    /// valid regex it is matched literally.
    pub fn adhoc(pattern: &str) -> Self {
        let re = compile_pattern(pattern)
            .or_else(|_| compile_pattern(&regex::escape(pattern)))
            .ok();
        Self {
            word: pattern.to_string(),
            patterns: re.into_iter().collect(),
        }
    }

    pub fn word(&self) -> &str {
        &self.word
    }

    /// True when any pattern matches. Patterns are tried in order and the
    /// first hit wins.
    pub fn is_in_message(&self, content: &str) -> bool {
        let lowered = content.to_lowercase();
        self.patterns.iter().any(|re| re.is_match(&lowered))
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, Error> {
    Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
}

/// Compiles a whole tracked-word list, keeping configuration order.
pub fn compile_tracked_words(words: &[TrackedWord]) -> Vec<WordMatcher> {
    words.iter().map(WordMatcher::new).collect()
}

/// Reads the tracked-word JSON file (`[{"word": .., "matches": [..]}]`).
pub fn load_tracked_words(path: &Path) -> Result<Vec<TrackedWord>, Error> {
    let raw = std::fs::read_to_string(path)?;
    let words: Vec<TrackedWord> = serde_json::from_str(&raw)?;
    info!("Loaded {} tracked words from {:?}", words.len(), path);
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_case_insensitively_across_patterns() {
        let m = WordMatcher::new(&TrackedWord::new("heck", &["heck", "h3ck"]));
        assert!(m.is_in_message("what the HECK"));
        assert!(m.is_in_message("h3ck yeah"));
        assert!(!m.is_in_message("hello"));
    }

    #[test]
    fn invalid_patterns_are_skipped() {
        let m = WordMatcher::new(&TrackedWord::new("darn", &["(unclosed", "darn"]));
        assert!(m.is_in_message("darn it"));
    }

    #[test]
    fn adhoc_falls_back_to_literal() {
        let m = WordMatcher::adhoc("c++(");
        assert!(m.is_in_message("I love C++( a lot"));
        assert!(!m.is_in_message("I love C"));

        let re = WordMatcher::adhoc("fr+ick");
        assert!(re.is_in_message("frrrick"));
    }

    #[test]
    fn loads_word_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profanity.json");
        std::fs::write(&path, r#"[{"profanity":"heck","matches":["heck"]}]"#).unwrap();
        let words = load_tracked_words(&path).unwrap();
        assert_eq!(words, vec![TrackedWord::new("heck", &["heck"])]);

        assert!(load_tracked_words(&dir.path().join("missing.json")).is_err());
    }
}
