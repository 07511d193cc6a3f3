// File: koalabot-core/tests/test_utils/mod.rs
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use koalabot_common::models::{ChatEvent, LeaderboardRow, MessageCountRow, StreakEventRow, TrackedWord};
use koalabot_common::traits::{DurableStore, LeaderboardRepository, MessageCountRepository, StreakEventRepository};
use koalabot_core::services::word_tracker::compile_tracked_words;
use koalabot_core::services::ProfanityLeaderboard;
use koalabot_core::{Database, Error};

/// A `DurableStore` held in memory, with the same conflict rules as the
/// Postgres tables. Guilds or channels listed in `fail_guilds` /
/// `fail_channels` make every call touching them fail.
pub struct InMemoryStore {
    available: AtomicBool,
    pub leaderboard: Mutex<Vec<LeaderboardRow>>,
    pub message_counts: Mutex<Vec<MessageCountRow>>,
    pub streak_events: Mutex<Vec<StreakEventRow>>,
    pub fail_guilds: Mutex<HashSet<String>>,
    pub fail_channels: Mutex<HashSet<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            leaderboard: Mutex::new(Vec::new()),
            message_counts: Mutex::new(Vec::new()),
            streak_events: Mutex::new(Vec::new()),
            fail_guilds: Mutex::new(HashSet::new()),
            fail_channels: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn fail_guild(&self, guild_id: &str) {
        self.fail_guilds.lock().unwrap().insert(guild_id.to_string());
    }

    pub fn fail_channel(&self, channel_id: &str) {
        self.fail_channels.lock().unwrap().insert(channel_id.to_string());
    }

    pub fn word_count(&self, guild_id: &str, user_name: &str, word: &str) -> i64 {
        self.leaderboard
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.guild_id == guild_id && r.user_name == user_name && r.word == word)
            .map(|r| r.count)
            .unwrap_or(0)
    }

    pub fn message_count(&self, guild_id: &str, user_name: &str) -> i64 {
        self.message_counts
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.guild_id == guild_id && r.user_name == user_name)
            .map(|r| r.count)
            .unwrap_or(0)
    }

    fn check_guild(&self, guild_id: &str) -> Result<(), Error> {
        if self.fail_guilds.lock().unwrap().contains(guild_id) {
            return Err(Error::Parse(format!("injected failure for guild {guild_id}")));
        }
        Ok(())
    }

    fn check_channel(&self, channel_id: &str) -> Result<(), Error> {
        if self.fail_channels.lock().unwrap().contains(channel_id) {
            return Err(Error::Parse(format!("injected failure for channel {channel_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl LeaderboardRepository for InMemoryStore {
    async fn get_leaderboard_rows(&self, guild_id: &str) -> Result<Vec<LeaderboardRow>, Error> {
        self.check_guild(guild_id)?;
        Ok(self.leaderboard.lock().unwrap().iter().filter(|r| r.guild_id == guild_id).cloned().collect())
    }

    async fn bulk_upsert_leaderboard(&self, rows: &[LeaderboardRow]) -> Result<(), Error> {
        for row in rows {
            self.check_guild(&row.guild_id)?;
        }
        let mut table = self.leaderboard.lock().unwrap();
        for row in rows {
            match table
                .iter_mut()
                .find(|r| r.guild_id == row.guild_id && r.user_name == row.user_name && r.word == row.word)
            {
                Some(existing) => existing.count = existing.count.max(row.count),
                None => table.push(row.clone()),
            }
        }
        Ok(())
    }

    async fn increment_word_count(&self, guild_id: &str, user_name: &str, word: &str) -> Result<(), Error> {
        self.check_guild(guild_id)?;
        let mut table = self.leaderboard.lock().unwrap();
        match table
            .iter_mut()
            .find(|r| r.guild_id == guild_id && r.user_name == user_name && r.word == word)
        {
            Some(existing) => existing.count += 1,
            None => table.push(LeaderboardRow {
                guild_id: guild_id.into(),
                user_name: user_name.into(),
                word: word.into(),
                count: 1,
            }),
        }
        Ok(())
    }
}

#[async_trait]
impl MessageCountRepository for InMemoryStore {
    async fn get_message_counts(&self, guild_id: &str) -> Result<Vec<MessageCountRow>, Error> {
        self.check_guild(guild_id)?;
        Ok(self.message_counts.lock().unwrap().iter().filter(|r| r.guild_id == guild_id).cloned().collect())
    }

    async fn bulk_upsert_message_counts(&self, rows: &[MessageCountRow]) -> Result<(), Error> {
        for row in rows {
            self.check_guild(&row.guild_id)?;
        }
        let mut table = self.message_counts.lock().unwrap();
        for row in rows {
            match table.iter_mut().find(|r| r.guild_id == row.guild_id && r.user_name == row.user_name) {
                Some(existing) => existing.count = existing.count.max(row.count),
                None => table.push(row.clone()),
            }
        }
        Ok(())
    }

    async fn increment_message_count(&self, guild_id: &str, user_name: &str) -> Result<(), Error> {
        self.check_guild(guild_id)?;
        let mut table = self.message_counts.lock().unwrap();
        match table.iter_mut().find(|r| r.guild_id == guild_id && r.user_name == user_name) {
            Some(existing) => existing.count += 1,
            None => table.push(MessageCountRow {
                guild_id: guild_id.into(),
                user_name: user_name.into(),
                count: 1,
            }),
        }
        Ok(())
    }
}

#[async_trait]
impl StreakEventRepository for InMemoryStore {
    async fn get_streak_events(&self, channel_id: &str, word: &str) -> Result<Vec<StreakEventRow>, Error> {
        self.check_channel(channel_id)?;
        let mut rows: Vec<StreakEventRow> = self
            .streak_events
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.channel_id == channel_id && r.word == word)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.timestamp_ms);
        Ok(rows)
    }

    async fn bulk_insert_streak_events(&self, rows: &[StreakEventRow]) -> Result<(), Error> {
        for row in rows {
            self.check_channel(&row.channel_id)?;
        }
        for row in rows {
            self.insert_streak_event(row).await?;
        }
        Ok(())
    }

    async fn insert_streak_event(&self, row: &StreakEventRow) -> Result<(), Error> {
        self.check_channel(&row.channel_id)?;
        let mut table = self.streak_events.lock().unwrap();
        let exists = table.iter().any(|r| {
            r.channel_id == row.channel_id
                && r.word == row.word
                && r.user_id == row.user_id
                && r.timestamp_ms == row.timestamp_ms
        });
        if !exists {
            table.push(row.clone());
        }
        Ok(())
    }
}

impl DurableStore for InMemoryStore {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

pub fn chat(guild: &str, channel: &str, author: &str, content: &str, ts: i64) -> ChatEvent {
    ChatEvent::new(guild, channel, author, format!("{author}-id"), content, ts)
}

pub fn leaderboard_for(words: &[(&str, &[&str])]) -> ProfanityLeaderboard {
    let tracked: Vec<TrackedWord> = words.iter().map(|(w, p)| TrackedWord::new(*w, p)).collect();
    ProfanityLeaderboard::new(compile_tracked_words(&tracked))
}

/// Create a connection pool to the test DB.
/// By default looks for `TEST_DATABASE_URL` in env,
/// else uses `postgres://koala@localhost/koalabot_test`.
pub async fn create_test_db_pool() -> Result<Pool<Postgres>, Error> {
    let url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://koala@localhost/koalabot_test".to_string());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    Ok(pool)
}

/// Wipes out test data so each test can start fresh.
pub async fn clean_database(pool: &Pool<Postgres>) -> Result<(), Error> {
    sqlx::query(r#"
        TRUNCATE TABLE
            leaderboard_stats,
            message_counts,
            badword_events
        RESTART IDENTITY CASCADE;
    "#)
        .execute(pool)
        .await?;

    Ok(())
}

/// A migrated, empty test database.
pub async fn setup_test_database() -> Result<Database, Error> {
    let pool = create_test_db_pool().await?;
    let db = Database::from_pool(pool);
    db.migrate().await?;
    clean_database(db.pool()).await?;
    Ok(db)
}
