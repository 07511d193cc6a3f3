// src/repositories/postgres/mod.rs

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use koalabot_common::models::{LeaderboardRow, MessageCountRow, StreakEventRow};
use koalabot_common::traits::{DurableStore, LeaderboardRepository, MessageCountRepository, StreakEventRepository};
use crate::Error;

pub mod leaderboard;
pub mod message_counts;
pub mod streak_events;

pub use leaderboard::PostgresLeaderboardRepository;
pub use message_counts::PostgresMessageCountRepository;
pub use streak_events::PostgresStreakEventRepository;

/// Rows per multi-row INSERT in the bulk operations.
pub const BULK_BATCH_SIZE: usize = 100;

/// The three Postgres repositories behind one [`DurableStore`]. Available
/// for as long as the pool is open.
#[derive(Clone)]
pub struct PostgresDurableStore {
    pool: Pool<Postgres>,
    leaderboard: PostgresLeaderboardRepository,
    message_counts: PostgresMessageCountRepository,
    streak_events: PostgresStreakEventRepository,
}

impl PostgresDurableStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            leaderboard: PostgresLeaderboardRepository::new(pool.clone()),
            message_counts: PostgresMessageCountRepository::new(pool.clone()),
            streak_events: PostgresStreakEventRepository::new(pool.clone()),
            pool,
        }
    }
}

impl DurableStore for PostgresDurableStore {
    fn is_available(&self) -> bool {
        !self.pool.is_closed()
    }
}

#[async_trait]
impl LeaderboardRepository for PostgresDurableStore {
    async fn get_leaderboard_rows(&self, guild_id: &str) -> Result<Vec<LeaderboardRow>, Error> {
        self.leaderboard.get_leaderboard_rows(guild_id).await
    }

    async fn bulk_upsert_leaderboard(&self, rows: &[LeaderboardRow]) -> Result<(), Error> {
        self.leaderboard.bulk_upsert_leaderboard(rows).await
    }

    async fn increment_word_count(&self, guild_id: &str, user_name: &str, word: &str) -> Result<(), Error> {
        self.leaderboard.increment_word_count(guild_id, user_name, word).await
    }
}

#[async_trait]
impl MessageCountRepository for PostgresDurableStore {
    async fn get_message_counts(&self, guild_id: &str) -> Result<Vec<MessageCountRow>, Error> {
        self.message_counts.get_message_counts(guild_id).await
    }

    async fn bulk_upsert_message_counts(&self, rows: &[MessageCountRow]) -> Result<(), Error> {
        self.message_counts.bulk_upsert_message_counts(rows).await
    }

    async fn increment_message_count(&self, guild_id: &str, user_name: &str) -> Result<(), Error> {
        self.message_counts.increment_message_count(guild_id, user_name).await
    }
}

#[async_trait]
impl StreakEventRepository for PostgresDurableStore {
    async fn get_streak_events(&self, channel_id: &str, word: &str) -> Result<Vec<StreakEventRow>, Error> {
        self.streak_events.get_streak_events(channel_id, word).await
    }

    async fn bulk_insert_streak_events(&self, rows: &[StreakEventRow]) -> Result<(), Error> {
        self.streak_events.bulk_insert_streak_events(rows).await
    }

    async fn insert_streak_event(&self, row: &StreakEventRow) -> Result<(), Error> {
        self.streak_events.insert_streak_event(row).await
    }
}
