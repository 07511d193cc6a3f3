// File: src/cache/mod.rs

pub mod message_cache;
pub mod stenographer;

pub use message_cache::MessageCache;
pub use stenographer::{Stenographer, DEFAULT_MAX_ENTRIES_PER_CACHE, GLOBAL_SCOPE};
