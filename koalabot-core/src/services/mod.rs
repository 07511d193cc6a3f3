// File: src/services/mod.rs

pub mod chat_listener;
pub mod leaderboard_service;
pub mod streak_service;
pub mod word_tracker;

pub use chat_listener::{AnalyticsState, ChatListener};
pub use leaderboard_service::ProfanityLeaderboard;
pub use streak_service::{StreakListener, StreakTracker};
pub use word_tracker::WordMatcher;
