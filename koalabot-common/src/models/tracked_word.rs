use serde::{Deserialize, Serialize};

/// A configured word and the regex patterns that count as saying it.
///
/// Loaded from `profanity.json`; older files use `profanity` as the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedWord {
    #[serde(alias = "profanity")]
    pub word: String,
    #[serde(default)]
    pub matches: Vec<String>,
}

impl TrackedWord {
    pub fn new(word: impl Into<String>, matches: &[&str]) -> Self {
        Self {
            word: word.into(),
            matches: matches.iter().map(|m| m.to_string()).collect(),
        }
    }
}
