// File: src/tasks/mod.rs

pub mod background;
pub mod bootstrap_sync;
pub mod snapshot_writer;

pub use bootstrap_sync::{sync_leaderboard_startup_data, sync_streak_startup_data};
