use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One occurrence of a streak word in a channel.
///
/// Field names on the wire match the save files written by earlier bot
/// versions (`timestamp`, `userId`, `userName`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakEvent {
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    pub user_id: String,
    pub user_name: String,
}

impl StreakEvent {
    pub fn new(timestamp_ms: i64, user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }

    /// `"{user_id}:{timestamp_ms}"`, identifies the same real event across sources.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.user_id, self.timestamp_ms)
    }
}

/// A streak event as stored in `badword_events`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StreakEventRow {
    pub channel_id: String,
    pub word: String,
    pub user_id: String,
    pub user_name: String,
    pub timestamp_ms: i64,
}

impl StreakEventRow {
    pub fn from_event(channel_id: &str, word: &str, event: &StreakEvent) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            word: word.to_string(),
            user_id: event.user_id.clone(),
            user_name: event.user_name.clone(),
            timestamp_ms: event.timestamp_ms,
        }
    }

    pub fn into_event(self) -> StreakEvent {
        StreakEvent {
            timestamp_ms: self.timestamp_ms,
            user_id: self.user_id,
            user_name: self.user_name,
        }
    }
}

/// How a streak listener answers in chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseTier {
    /// Announce every occurrence.
    Always,
    /// Announce only when the gap sets a new record.
    #[default]
    RecordsOnly,
    /// Record, never reply.
    Silent,
}
