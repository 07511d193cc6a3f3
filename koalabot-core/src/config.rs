// File: koalabot-core/src/config.rs

use std::path::PathBuf;
use tracing::warn;

use koalabot_common::models::ResponseTier;
use crate::cache::DEFAULT_MAX_ENTRIES_PER_CACHE;

pub const DEFAULT_LOG_FILE_NAME: &str = "discord_messages.log";
pub const TRACKED_WORDS_FILE_NAME: &str = "profanity.json";

/// Settings for the analytics core, read from the environment (after
/// `.env` has been loaded).
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsConfig {
    pub max_entries: usize,
    pub log_base_dir: PathBuf,
    pub log_file_name: String,
    pub data_path: PathBuf,
    pub streak_words: Vec<String>,
    pub streak_channels: Vec<String>,
    pub streak_save_dir: PathBuf,
    pub always_respond_words: Vec<String>,
    pub silent_words: Vec<String>,
    pub leaderboard_ignore: Vec<String>,
    pub database_url: Option<String>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES_PER_CACHE,
            log_base_dir: PathBuf::from("./logs"),
            log_file_name: DEFAULT_LOG_FILE_NAME.to_string(),
            data_path: PathBuf::from("./data"),
            streak_words: Vec::new(),
            streak_channels: Vec::new(),
            streak_save_dir: PathBuf::from("./data/badwords"),
            always_respond_words: Vec::new(),
            silent_words: Vec::new(),
            leaderboard_ignore: Vec::new(),
            database_url: None,
        }
    }
}

impl AnalyticsConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset or blank keys keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let max_entries = match get("LOG_MAX_ENTRIES") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("LOG_MAX_ENTRIES={:?} is not a number; using {}", raw, defaults.max_entries);
                defaults.max_entries
            }),
            None => defaults.max_entries,
        };
        let data_path = get("DATA_PATH").map(PathBuf::from).unwrap_or(defaults.data_path);
        let streak_save_dir = get("LISTENER_BADWORD_TRACKING_SAVE_DIR")
            .map(|dir| data_path.join(dir))
            .unwrap_or_else(|| data_path.join("badwords"));

        Self {
            max_entries,
            log_base_dir: get("LOG_BASE_DIR").map(PathBuf::from).unwrap_or(defaults.log_base_dir),
            log_file_name: get("DISCORD_LOG_FILE_NAME").unwrap_or(defaults.log_file_name),
            streak_words: split_list(get("LISTENER_BADWORDS")),
            streak_channels: split_list(get("LISTENER_BADWORD_TRACKING_CHANNEL")),
            streak_save_dir,
            always_respond_words: split_list(get("LISTENER_BADWORD_ALWAYS_RESPOND")),
            silent_words: split_list(get("LISTENER_BADWORD_SILENT")),
            leaderboard_ignore: split_list(get("LEADERBOARD_IGNORE")),
            database_url: get("DATABASE_URL"),
            data_path,
        }
    }

    pub fn tracked_words_path(&self) -> PathBuf {
        self.data_path.join(TRACKED_WORDS_FILE_NAME)
    }

    /// Silent wins over always-respond; everything else announces records only.
    pub fn tier_for(&self, word: &str) -> ResponseTier {
        let listed = |list: &[String]| list.iter().any(|w| w.eq_ignore_ascii_case(word));
        if listed(&self.silent_words) {
            ResponseTier::Silent
        } else if listed(&self.always_respond_words) {
            ResponseTier::Always
        } else {
            ResponseTier::RecordsOnly
        }
    }
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
