// File: koalabot-core/src/cache/stenographer.rs
//
// Fans every chat message out to the global, per-channel and per-guild caches
// and answers scoped queries. Also bulk-loads the newline-delimited JSON chat
// history written by the logging layer.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use koalabot_common::models::ChatEvent;
use crate::Error;
use super::message_cache::MessageCache;

/// Guild/channel id used for events loaded from a scope that has no such id.
pub const GLOBAL_SCOPE: &str = "global";

pub const DEFAULT_MAX_ENTRIES_PER_CACHE: usize = 1000;

pub struct Stenographer {
    global: MessageCache,
    channels: HashMap<String, MessageCache>,
    guilds: HashMap<String, MessageCache>,
    max_entries: usize,
}

impl Stenographer {
    pub fn new(max_entries: usize) -> Self {
        Self {
            global: MessageCache::new(max_entries),
            channels: HashMap::new(),
            guilds: HashMap::new(),
            max_entries,
        }
    }

    /// Stores one event in all three scopes. The returned handle is the
    /// shared allocation every scope now holds.
    pub fn push_message(&mut self, msg: ChatEvent) -> Arc<ChatEvent> {
        let msg = Arc::new(msg);
        self.global.push_message(msg.clone());
        self.channel_cache_mut(&msg.channel_id).push_message(msg.clone());
        self.guild_cache_mut(&msg.guild_id).push_message(msg.clone());
        msg
    }

    /// Evicts the oldest event from the global scope only.
    pub fn pop_message(&mut self) -> Option<Arc<ChatEvent>> {
        self.global.pop_message()
    }

    pub fn global_messages(&self) -> Vec<Arc<ChatEvent>> {
        self.global.messages().iter().cloned().collect()
    }

    pub fn channel_messages(&self, channel_id: &str) -> Vec<Arc<ChatEvent>> {
        self.channels
            .get(channel_id)
            .map(|c| c.messages().iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn guild_messages(&self, guild_id: &str) -> Vec<Arc<ChatEvent>> {
        self.guilds
            .get(guild_id)
            .map(|c| c.messages().iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn guild_cache(&self, guild_id: &str) -> Option<&MessageCache> {
        self.guilds.get(guild_id)
    }

    pub fn guild_ids(&self) -> impl Iterator<Item = &str> {
        self.guilds.keys().map(|k| k.as_str())
    }

    /// Sum of every scope's length. Scopes overlap, so one message pushed
    /// live is counted three times.
    pub fn total_cached_count(&self) -> usize {
        self.global.len()
            + self.channels.values().map(MessageCache::len).sum::<usize>()
            + self.guilds.values().map(MessageCache::len).sum::<usize>()
    }

    /// Messages by `author` currently cached for `guild_id`.
    pub fn message_count(&self, guild_id: &str, author: &str) -> usize {
        self.guilds
            .get(guild_id)
            .map(|c| c.count_by_author(author))
            .unwrap_or(0)
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Applies a new capacity to every scope and trims them immediately.
    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = max_entries;
        self.global.set_max_entries(max_entries);
        for cache in self.channels.values_mut() {
            cache.set_max_entries(max_entries);
        }
        for cache in self.guilds.values_mut() {
            cache.set_max_entries(max_entries);
        }
    }

    fn channel_cache_mut(&mut self, channel_id: &str) -> &mut MessageCache {
        let max = self.max_entries;
        self.channels
            .entry(channel_id.to_string())
            .or_insert_with(|| MessageCache::new(max))
    }

    fn guild_cache_mut(&mut self, guild_id: &str) -> &mut MessageCache {
        let max = self.max_entries;
        self.guilds
            .entry(guild_id.to_string())
            .or_insert_with(|| MessageCache::new(max))
    }

    // ------------------------------------------------------------------
    // History loading
    // ------------------------------------------------------------------

    /// Loads `{root}/{file_name}` into the global scope, then for each
    /// directory `{root}/{guild_id}` loads `{guild_id}/{file_name}` into that
    /// guild, and for each `{guild_id}/{channel_id}` loads its file into the
    /// channel. A missing or broken file only leaves its own scope empty.
    #[instrument(skip_all)]
    pub fn load_history(&mut self, root: impl AsRef<Path>, file_name: &str) {
        let root = root.as_ref();
        debug!("Loading chat history from {:?}", root);

        if let Err(e) = self.load_global_history(&root.join(file_name)) {
            error!("Failed to load global chat history from {:?}: {}", root.join(file_name), e);
        }

        let guild_dirs = match list_subdirectories(root) {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to list guild history directories under {:?}: {}", root, e);
                return;
            }
        };

        for (guild_id, guild_dir) in guild_dirs {
            if let Err(e) = self.load_guild_history(&guild_dir.join(file_name), &guild_id) {
                error!("Failed to load guild history for {}: {}", guild_id, e);
            }

            let channel_dirs = match list_subdirectories(&guild_dir) {
                Ok(dirs) => dirs,
                Err(e) => {
                    error!("Failed to list channel directories for guild {}: {}", guild_id, e);
                    continue;
                }
            };

            for (channel_id, channel_dir) in channel_dirs {
                let path = channel_dir.join(file_name);
                if let Err(e) = self.load_channel_history(&path, &guild_id, &channel_id) {
                    error!("Failed to load channel history for {}/{}: {}", guild_id, channel_id, e);
                }
            }
        }
    }

    pub fn load_global_history(&mut self, path: &Path) -> Result<usize, Error> {
        let messages = read_history_file(path, GLOBAL_SCOPE, GLOBAL_SCOPE)?;
        let loaded = messages.len();
        self.global.replace(messages);
        info!("Loaded {} global messages from {:?}", loaded, path);
        Ok(loaded)
    }

    pub fn load_guild_history(&mut self, path: &Path, guild_id: &str) -> Result<usize, Error> {
        if guild_id.is_empty() {
            return Err(Error::Parse("empty guild id".into()));
        }
        let messages = read_history_file(path, guild_id, GLOBAL_SCOPE)?;
        let loaded = messages.len();
        self.guild_cache_mut(guild_id).replace(messages);
        info!("Loaded {} messages for guild {} from {:?}", loaded, guild_id, path);
        Ok(loaded)
    }

    pub fn load_channel_history(&mut self, path: &Path, guild_id: &str, channel_id: &str) -> Result<usize, Error> {
        if channel_id.is_empty() {
            return Err(Error::Parse("empty channel id".into()));
        }
        let messages = read_history_file(path, guild_id, channel_id)?;
        let loaded = messages.len();
        self.channel_cache_mut(channel_id).replace(messages);
        info!("Loaded {} messages for channel {}/{} from {:?}", loaded, guild_id, channel_id, path);
        Ok(loaded)
    }
}

impl Default for Stenographer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES_PER_CACHE)
    }
}

fn list_subdirectories(dir: &Path) -> Result<Vec<(String, std::path::PathBuf)>, Error> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) if !name.is_empty() => out.push((name, entry.path())),
            _ => warn!("Skipping history directory with unusable name: {:?}", entry.path()),
        }
    }
    out.sort();
    Ok(out)
}

/// Reads one history file. Each line is an independent JSON object; lines are
/// joined into an array before parsing. If the file as a whole does not parse,
/// the lines are retried one by one and the unreadable ones dropped.
pub(crate) fn read_history_file(
    path: &Path,
    guild_id: &str,
    channel_id: &str,
) -> Result<Vec<Arc<ChatEvent>>, Error> {
    let raw = fs::read_to_string(path)?;
    let lines: Vec<&str> = raw
        .trim()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let joined = format!("[{}]", lines.join(","));
    let objects: Vec<Value> = match serde_json::from_str(&joined) {
        Ok(objs) => objs,
        Err(e) => {
            warn!("History file {:?} is not clean JSON lines ({}); parsing line by line", path, e);
            lines
                .iter()
                .filter_map(|l| serde_json::from_str::<Value>(l).ok())
                .collect()
        }
    };

    let fallback_ts = Utc::now().timestamp_millis();
    let messages: Vec<Arc<ChatEvent>> = objects
        .iter()
        .filter_map(|obj| {
            let parsed = history_object_to_event(obj, guild_id, channel_id, fallback_ts);
            if parsed.is_none() {
                debug!("Skipping unreadable history entry in {:?}: {}", path, obj);
            }
            parsed
        })
        .map(Arc::new)
        .collect();

    Ok(messages)
}

fn history_object_to_event(obj: &Value, guild_id: &str, channel_id: &str, fallback_ts: i64) -> Option<ChatEvent> {
    let line = obj.get("message")?.as_str()?;
    let timestamp_ms = obj
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(fallback_ts);

    ChatEvent::parse_standard_format(guild_id, channel_id, line, timestamp_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ev(guild: &str, channel: &str, author: &str, content: &str) -> ChatEvent {
        ChatEvent::new(guild, channel, author, "1", content, 0)
    }

    #[test]
    fn push_fans_out_to_all_scopes() {
        let mut steno = Stenographer::new(10);
        steno.push_message(ev("g1", "c1", "alice", "hello"));
        steno.push_message(ev("g1", "c2", "bob", "hey"));
        steno.push_message(ev("g2", "c3", "alice", "yo"));

        assert_eq!(steno.global_messages().len(), 3);
        assert_eq!(steno.channel_messages("c1").len(), 1);
        assert_eq!(steno.guild_messages("g1").len(), 2);
        assert_eq!(steno.message_count("g1", "alice"), 1);
        assert_eq!(steno.message_count("g2", "bob"), 0);
        assert_eq!(steno.total_cached_count(), 9);
    }

    #[test]
    fn unknown_scopes_read_as_empty() {
        let steno = Stenographer::default();
        assert!(steno.channel_messages("nope").is_empty());
        assert!(steno.guild_messages("nope").is_empty());
        assert_eq!(steno.message_count("nope", "alice"), 0);
    }

    #[test]
    fn set_max_entries_retrims_every_scope() {
        let mut steno = Stenographer::new(5);
        for i in 0..5 {
            steno.push_message(ev("g1", "c1", "alice", &i.to_string()));
        }
        steno.set_max_entries(2);
        assert_eq!(steno.global_messages().len(), 2);
        assert_eq!(steno.channel_messages("c1").len(), 2);
        assert_eq!(steno.guild_messages("g1").len(), 2);
        assert_eq!(steno.message_count("g1", "alice"), 2);

        steno.push_message(ev("g9", "c9", "new", "x"));
        assert_eq!(steno.guild_cache("g9").unwrap().max_entries(), 2);
    }

    #[test]
    fn history_file_tolerates_whitespace_and_timestamps() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  ").unwrap();
        writeln!(file, r#"{{"level":"discord_message","message":"alice<@11>: hi there","timestamp":"2024-01-01T00:00:00.000Z"}}"#).unwrap();
        writeln!(file, r#"{{"message":"bob<@22>: second"}}"#).unwrap();
        writeln!(file, r#"{{"message":"garbage without markers"}}"#).unwrap();
        writeln!(file).unwrap();

        let msgs = read_history_file(file.path(), "g1", "c1").unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].author_name, "alice");
        assert_eq!(msgs[0].author_id, "11");
        assert_eq!(msgs[0].content, "hi there");
        assert_eq!(msgs[0].timestamp_ms, 1_704_067_200_000);
        assert_eq!(msgs[1].guild_id, "g1");
    }

    #[test]
    fn one_bad_line_does_not_drop_the_rest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"message":"alice<@1>: ok"}}"#).unwrap();
        writeln!(file, r#"{{"message": broken"#).unwrap();
        writeln!(file, r#"{{"message":"bob<@2>: fine"}}"#).unwrap();

        let msgs = read_history_file(file.path(), "g", "c").unwrap();
        let authors: Vec<_> = msgs.iter().map(|m| m.author_name.as_str()).collect();
        assert_eq!(authors, vec!["alice", "bob"]);
    }

    #[test]
    fn unparseable_file_yields_empty_scope() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not json at all").unwrap();
        let msgs = read_history_file(file.path(), "g", "c").unwrap();
        assert!(msgs.is_empty());
    }
}
