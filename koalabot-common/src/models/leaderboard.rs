use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One `(guild, author, word) -> count` cell, as stored in `leaderboard_stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LeaderboardRow {
    pub guild_id: String,
    pub user_name: String,
    pub word: String,
    pub count: i64,
}

/// Total messages an author has sent in a guild, as stored in `message_counts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MessageCountRow {
    pub guild_id: String,
    pub user_name: String,
    pub count: i64,
}

/// Someone took the lead for a tracked word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderChange {
    pub word: String,
    pub leader: String,
    pub old_leader: Option<String>,
}

/// One line of a rendered leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub author: String,
    pub count: u64,
    pub total_messages: u64,
}

impl LeaderboardEntry {
    /// `count / total_messages`, or 0 when the author has no known messages.
    pub fn ratio(&self) -> f64 {
        if self.total_messages == 0 {
            0.0
        } else {
            self.count as f64 / self.total_messages as f64
        }
    }
}
