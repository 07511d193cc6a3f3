use async_trait::async_trait;
use crate::error::Error;
use crate::models::{LeaderboardRow, MessageCountRow, StreakEventRow};

/// Lifetime word counts per `(guild, author, word)`.
#[async_trait]
pub trait LeaderboardRepository: Send + Sync {
    async fn get_leaderboard_rows(&self, guild_id: &str) -> Result<Vec<LeaderboardRow>, Error>;

    /// Inserts or raises rows; an existing count is never lowered.
    async fn bulk_upsert_leaderboard(&self, rows: &[LeaderboardRow]) -> Result<(), Error>;

    async fn increment_word_count(&self, guild_id: &str, user_name: &str, word: &str) -> Result<(), Error>;
}

/// Lifetime message totals per `(guild, author)`.
#[async_trait]
pub trait MessageCountRepository: Send + Sync {
    async fn get_message_counts(&self, guild_id: &str) -> Result<Vec<MessageCountRow>, Error>;

    /// Inserts or raises rows; an existing count is never lowered.
    async fn bulk_upsert_message_counts(&self, rows: &[MessageCountRow]) -> Result<(), Error>;

    async fn increment_message_count(&self, guild_id: &str, user_name: &str) -> Result<(), Error>;
}

/// Streak events per `(channel, word)`.
#[async_trait]
pub trait StreakEventRepository: Send + Sync {
    /// Returned rows are ordered by timestamp, oldest first.
    async fn get_streak_events(&self, channel_id: &str, word: &str) -> Result<Vec<StreakEventRow>, Error>;

    /// No-op for rows that already exist.
    async fn bulk_insert_streak_events(&self, rows: &[StreakEventRow]) -> Result<(), Error>;

    /// No-op when the row already exists.
    async fn insert_streak_event(&self, row: &StreakEventRow) -> Result<(), Error>;
}

/// Everything the analytics core reads from or writes to durable storage.
///
/// Callers check [`DurableStore::is_available`] before issuing work and treat
/// any `Err` as "nothing stored / nothing returned".
pub trait DurableStore: LeaderboardRepository + MessageCountRepository + StreakEventRepository {
    fn is_available(&self) -> bool;
}
