// File: koalabot-core/src/cache/message_cache.rs

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use koalabot_common::models::ChatEvent;

/// Fixed-capacity, insertion-ordered log of chat events with a running
/// per-author count.
///
/// Invariants after every mutation:
///  - `messages.len() <= max_entries`
///  - `author_counts[a]` equals the number of stored events written by `a`
///    (authors that drop to zero are removed from the map)
///
/// Eviction is always from the front, oldest first.
#[derive(Debug, Clone)]
pub struct MessageCache {
    messages: VecDeque<Arc<ChatEvent>>,
    author_counts: HashMap<String, usize>,
    max_entries: usize,
}

impl MessageCache {
    /// `usize::MAX` means effectively unbounded.
    pub fn new(max_entries: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            author_counts: HashMap::new(),
            max_entries,
        }
    }

    /// Appends at the tail, then evicts from the head while over capacity.
    pub fn push_message(&mut self, msg: Arc<ChatEvent>) {
        *self.author_counts.entry(msg.author_name.clone()).or_insert(0) += 1;
        self.messages.push_back(msg);
        self.trim_entries();
    }

    /// Removes and returns the oldest event.
    pub fn pop_message(&mut self) -> Option<Arc<ChatEvent>> {
        let msg = self.messages.pop_front()?;
        self.decrement_author(&msg.author_name);
        Some(msg)
    }

    /// Swaps the stored sequence for `messages` (kept in the given order) and
    /// rebuilds the author counts from scratch.
    pub fn replace<I>(&mut self, messages: I)
    where
        I: IntoIterator<Item = Arc<ChatEvent>>,
    {
        self.messages = messages.into_iter().collect();
        self.author_counts.clear();
        for msg in &self.messages {
            *self.author_counts.entry(msg.author_name.clone()).or_insert(0) += 1;
        }
        self.trim_entries();
    }

    pub fn messages(&self) -> &VecDeque<Arc<ChatEvent>> {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 0 for authors never seen (or fully evicted).
    pub fn count_by_author(&self, author: &str) -> usize {
        self.author_counts.get(author).copied().unwrap_or(0)
    }

    /// `(author, count)` for every author currently in the log.
    pub fn author_counts(&self) -> impl Iterator<Item = (&str, usize)> {
        self.author_counts.iter().map(|(a, c)| (a.as_str(), *c))
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = max_entries;
        self.trim_entries();
    }

    pub(crate) fn trim_entries(&mut self) {
        while self.messages.len() > self.max_entries {
            if self.pop_message().is_none() {
                break;
            }
        }
    }

    fn decrement_author(&mut self, author: &str) {
        if let Some(count) = self.author_counts.get_mut(author) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.author_counts.remove(author);
            }
        }
    }
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}
