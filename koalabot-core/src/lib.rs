// src/lib.rs

pub mod cache;
pub mod config;
pub mod db;
pub mod eventbus;
pub mod repositories;
pub mod services;
pub mod tasks;
pub mod utils;

pub use config::AnalyticsConfig;
pub use db::Database;
pub use koalabot_common::error::Error;
