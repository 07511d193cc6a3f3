// File: koalabot-common/src/models/mod.rs
pub mod chat;
pub mod leaderboard;
pub mod streak;
pub mod tracked_word;

pub use chat::ChatEvent;
pub use leaderboard::{LeaderChange, LeaderboardEntry, LeaderboardRow, MessageCountRow};
pub use streak::{ResponseTier, StreakEvent, StreakEventRow};
pub use tracked_word::TrackedWord;
