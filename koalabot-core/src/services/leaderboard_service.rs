// File: koalabot-core/src/services/leaderboard_service.rs
//
// Per-guild "who says it most" counters for the tracked words, leader
// detection (absolute and per-capita) and the text the bot replies with.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, instrument};

use koalabot_common::models::{ChatEvent, LeaderChange, LeaderboardEntry, LeaderboardRow, MessageCountRow};
use koalabot_common::traits::DurableStore;

use crate::cache::Stenographer;
use crate::services::word_tracker::WordMatcher;
use crate::tasks::background::spawn_fire_and_forget;

const RULE: &str = "-------------------------";

/// word -> count for one author.
type WordCounts = HashMap<String, u64>;

pub struct ProfanityLeaderboard {
    words: Vec<WordMatcher>,
    /// guild -> author (first-seen order) -> word -> count
    counts: HashMap<String, IndexMap<String, WordCounts>>,
    /// guild -> author -> lifetime message total pulled from the durable store
    message_totals: HashMap<String, HashMap<String, u64>>,
    ignore_list: Vec<String>,
    store: Option<Arc<dyn DurableStore>>,
}

impl ProfanityLeaderboard {
    pub fn new(words: Vec<WordMatcher>) -> Self {
        Self {
            words,
            counts: HashMap::new(),
            message_totals: HashMap::new(),
            ignore_list: Vec::new(),
            store: None,
        }
    }

    /// Authors left out of rendered leaderboards (bots, test accounts).
    pub fn with_ignore_list(mut self, ignore_list: Vec<String>) -> Self {
        self.ignore_list = ignore_list;
        self
    }

    pub fn set_store(&mut self, store: Option<Arc<dyn DurableStore>>) {
        self.store = store;
    }

    pub fn tracked_words(&self) -> &[WordMatcher] {
        &self.words
    }

    pub fn guild_ids(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(|k| k.as_str())
    }

    pub fn count(&self, guild_id: &str, author: &str, word: &str) -> u64 {
        self.counts
            .get(guild_id)
            .and_then(|authors| authors.get(author))
            .and_then(|words| words.get(word))
            .copied()
            .unwrap_or(0)
    }

    /// Counts a live message and returns every word whose leader changed.
    ///
    /// Matching increments are also written to the durable store without
    /// waiting, along with the author's message total.
    pub fn observe(&mut self, event: &ChatEvent, stenographer: &Stenographer) -> Vec<LeaderChange> {
        self.observe_inner(event, stenographer, true)
    }

    fn observe_inner(&mut self, event: &ChatEvent, stenographer: &Stenographer, live: bool) -> Vec<LeaderChange> {
        let guild_id = event.guild_id.as_str();
        let author = event.author_name.as_str();

        // New authors start at zero for every word before anyone's lead is judged.
        let word_names: Vec<String> = self.words.iter().map(|w| w.word().to_string()).collect();
        self.counts
            .entry(guild_id.to_string())
            .or_default()
            .entry(author.to_string())
            .or_insert_with(|| word_names.iter().map(|w| (w.clone(), 0)).collect());

        if live {
            if let Some(total) = self
                .message_totals
                .get_mut(guild_id)
                .and_then(|authors| authors.get_mut(author))
            {
                *total += 1;
            }
            if let Some(store) = self.available_store() {
                let (g, a) = (guild_id.to_string(), author.to_string());
                // not awaited; the reply path never waits on the store
                spawn_fire_and_forget(format!("increment_message_count({g}, {a})"), async move {
                    store.increment_message_count(&g, &a).await
                });
            }
        }

        let mut changes = Vec::new();
        for idx in 0..self.words.len() {
            if !self.words[idx].is_in_message(&event.content) {
                continue;
            }
            let word = word_names[idx].as_str();

            let before = self.leader(guild_id, word, false, &[], stenographer).map(|l| l.author);
            if let Some(cell) = self
                .counts
                .get_mut(guild_id)
                .and_then(|authors| authors.get_mut(author))
            {
                *cell.entry(word.to_string()).or_insert(0) += 1;
            }
            let after = self.leader(guild_id, word, false, &[], stenographer).map(|l| l.author);

            if live {
                if let Some(store) = self.available_store() {
                    let (g, a, w) = (guild_id.to_string(), author.to_string(), word.to_string());
                    spawn_fire_and_forget(format!("increment_word_count({g}, {a}, {w})"), async move {
                        store.increment_word_count(&g, &a, &w).await
                    });
                }
            }

            if before != after {
                if let Some(leader) = after {
                    changes.push(LeaderChange {
                        word: word.to_string(),
                        leader,
                        old_leader: before,
                    });
                }
            }
        }
        changes
    }

    /// The author ranked first for `word` in `guild_id`.
    ///
    /// Authors are visited in first-seen order and a later author only takes
    /// over on a strictly greater score, so ties stay with whoever came first.
    /// In per-capita mode an author with no known messages has no score: they
    /// cannot take the lead, and lose it to anyone who has one.
    pub fn leader(
        &self,
        guild_id: &str,
        word: &str,
        per_capita: bool,
        ignore: &[String],
        stenographer: &Stenographer,
    ) -> Option<LeaderboardEntry> {
        let authors = self.counts.get(guild_id)?;
        let mut champion: Option<LeaderboardEntry> = None;

        for (author, words) in authors {
            if ignore.iter().any(|i| i == author) {
                continue;
            }
            let candidate = LeaderboardEntry {
                author: author.clone(),
                count: words.get(word).copied().unwrap_or(0),
                total_messages: self.author_total(guild_id, author, stenographer),
            };

            let displace = match &champion {
                None => true,
                Some(current) if per_capita => match (per_capita_ratio(&candidate), per_capita_ratio(current)) {
                    (Some(c), Some(l)) => c > l,
                    (Some(_), None) => true,
                    _ => false,
                },
                Some(current) => candidate.count > current.count,
            };
            if displace {
                champion = Some(candidate);
            }
        }
        champion
    }

    /// Messages an author is known to have sent in a guild: the cached count,
    /// or the reconciled lifetime total when that is higher.
    pub fn author_total(&self, guild_id: &str, author: &str, stenographer: &Stenographer) -> u64 {
        let cached = stenographer.message_count(guild_id, author) as u64;
        let durable = self
            .message_totals
            .get(guild_id)
            .and_then(|authors| authors.get(author))
            .copied()
            .unwrap_or(0);
        cached.max(durable)
    }

    /// Rebuilds every counter from the guild caches. Nothing is written to
    /// the durable store.
    #[instrument(skip_all)]
    pub fn recalculate_all(&mut self, stenographer: &Stenographer) {
        self.counts.clear();

        let mut guild_ids: Vec<&str> = stenographer.guild_ids().collect();
        guild_ids.sort_unstable();

        let mut observed = 0usize;
        for guild_id in guild_ids {
            for msg in stenographer.guild_messages(guild_id) {
                self.observe_inner(&msg, stenographer, false);
                observed += 1;
            }
        }
        info!("Recalculated leaderboard from {} cached messages", observed);
    }

    // ------------------------------------------------------------------
    // Reconciliation accessors
    // ------------------------------------------------------------------

    /// Every non-zero cell for a guild, ready for a bulk upsert.
    pub fn leaderboard_rows(&self, guild_id: &str) -> Vec<LeaderboardRow> {
        let Some(authors) = self.counts.get(guild_id) else {
            return Vec::new();
        };
        authors
            .iter()
            .flat_map(|(author, words)| {
                words.iter().filter(|(_, c)| **c > 0).map(move |(word, count)| LeaderboardRow {
                    guild_id: guild_id.to_string(),
                    user_name: author.clone(),
                    word: word.clone(),
                    count: *count as i64,
                })
            })
            .collect()
    }

    /// Raises in-memory cells to the durable values. Never lowers a cell.
    pub fn apply_durable_rows(&mut self, guild_id: &str, rows: &[LeaderboardRow]) {
        let word_names: Vec<String> = self.words.iter().map(|w| w.word().to_string()).collect();
        let authors = self.counts.entry(guild_id.to_string()).or_default();

        for row in rows {
            let cell = authors
                .entry(row.user_name.clone())
                .or_insert_with(|| word_names.iter().map(|w| (w.clone(), 0)).collect())
                .entry(row.word.clone())
                .or_insert(0);
            let durable = row.count.max(0) as u64;
            if durable > *cell {
                debug!("Raising {}/{}/{} from {} to {}", guild_id, row.user_name, row.word, cell, durable);
                *cell = durable;
            }
        }
    }

    /// Per-author cached message counts for a guild, for the first-run push.
    pub fn message_count_rows(&self, guild_id: &str, stenographer: &Stenographer) -> Vec<MessageCountRow> {
        let Some(cache) = stenographer.guild_cache(guild_id) else {
            return Vec::new();
        };
        let mut rows: Vec<MessageCountRow> = cache
            .author_counts()
            .filter(|(_, c)| *c > 0)
            .map(|(author, count)| MessageCountRow {
                guild_id: guild_id.to_string(),
                user_name: author.to_string(),
                count: count as i64,
            })
            .collect();
        rows.sort_by(|a, b| a.user_name.cmp(&b.user_name));
        rows
    }

    pub fn raise_message_total(&mut self, guild_id: &str, author: &str, total: u64) {
        let current = self
            .message_totals
            .entry(guild_id.to_string())
            .or_default()
            .entry(author.to_string())
            .or_insert(0);
        *current = (*current).max(total);
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// One line per tracked word with its leader in `guild_id`.
    pub fn render_leaderboard(&self, guild_id: &str, per_capita: bool, stenographer: &Stenographer) -> String {
        let mut out = format!("```Profanity Leaderboard {}\n{}\n", mode_label(per_capita), RULE);

        for matcher in &self.words {
            let label = format!("{}(s):", matcher.word());
            let line = match self.leader(guild_id, matcher.word(), per_capita, &self.ignore_list, stenographer) {
                Some(lead) if per_capita => format!("{} with {}%", lead.author, to_precision_2(lead.ratio() * 100.0)),
                Some(lead) => format!("{} with {}", lead.author, lead.count),
                None => "nobody with 0".to_string(),
            };
            out.push_str(&format!("{:<12}{}\n", label, line));
        }
        out.push_str("```");
        out
    }

    /// Ranks a guild's cached messages against any word or pattern. A
    /// tracked word uses its configured patterns.
    pub fn custom_leaderboard(
        &self,
        guild_id: &str,
        pattern: &str,
        per_capita: bool,
        stenographer: &Stenographer,
    ) -> Vec<LeaderboardEntry> {
        let pattern = pattern.to_lowercase();
        let adhoc;
        let matcher = match self.words.iter().find(|w| w.word() == pattern) {
            Some(m) => m,
            None => {
                adhoc = WordMatcher::adhoc(&pattern);
                &adhoc
            }
        };

        let mut tallies: IndexMap<String, u64> = IndexMap::new();
        for msg in stenographer.guild_messages(guild_id) {
            if self.ignore_list.iter().any(|i| *i == msg.author_name) {
                continue;
            }
            let tally = tallies.entry(msg.author_name.clone()).or_insert(0);
            if matcher.is_in_message(&msg.content) {
                *tally += 1;
            }
        }

        let mut entries: Vec<LeaderboardEntry> = tallies
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(author, count)| LeaderboardEntry {
                total_messages: self.author_total(guild_id, &author, stenographer),
                author,
                count,
            })
            .collect();

        let score = |e: &LeaderboardEntry| if per_capita { e.ratio() } else { e.count as f64 };
        entries.sort_by(|a, b| score(b).total_cmp(&score(a)));
        entries
    }

    pub fn render_custom_leaderboard(
        &self,
        guild_id: &str,
        pattern: &str,
        per_capita: bool,
        stenographer: &Stenographer,
    ) -> String {
        let mut out = format!("```{} Leaderboard {}\n{}\n", pattern.to_lowercase(), mode_label(per_capita), RULE);
        for entry in self.custom_leaderboard(guild_id, pattern, per_capita, stenographer) {
            let value = if per_capita {
                format!("{}%", to_precision_2(entry.ratio() * 100.0))
            } else {
                entry.count.to_string()
            };
            out.push_str(&format!("{:<14}{}\n", format!("{}:", entry.author), value));
        }
        out.push_str("```");
        out
    }

    fn available_store(&self) -> Option<Arc<dyn DurableStore>> {
        self.store.as_ref().filter(|s| s.is_available()).cloned()
    }
}

/// `count / total`, or nothing when the total is unknown.
fn per_capita_ratio(entry: &LeaderboardEntry) -> Option<f64> {
    (entry.total_messages > 0).then(|| entry.count as f64 / entry.total_messages as f64)
}

fn mode_label(per_capita: bool) -> &'static str {
    if per_capita { "(per capita)" } else { "(total)" }
}

/// Two significant digits, the way the bot has always shown percentages.
fn to_precision_2(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return "0.0".to_string();
    }
    // exponent after rounding, so 9.96 carries over to 1.0e1
    let rounded = format!("{:.1e}", value);
    let magnitude: i32 = rounded
        .split_once('e')
        .and_then(|(_, exp)| exp.parse().ok())
        .unwrap_or_else(|| value.abs().log10().floor() as i32);
    let decimals = 1 - magnitude;
    if decimals >= 0 {
        format!("{:.*}", decimals as usize, value)
    } else {
        let scale = 10f64.powi(-decimals);
        format!("{:.0}", (value / scale).round() * scale)
    }
}

/// `"Congrats X, you've surpassed A and B at saying w1, w2, and w3!"`
pub fn leadership_announcement(changes: &[LeaderChange]) -> Option<String> {
    let first = changes.first()?;

    let mut dethroned: Vec<&str> = Vec::new();
    for change in changes {
        if let Some(old) = change.old_leader.as_deref() {
            if !dethroned.contains(&old) {
                dethroned.push(old);
            }
        }
    }
    let words: Vec<&str> = changes.iter().map(|c| c.word.as_str()).collect();

    if dethroned.is_empty() {
        return Some(format!("Congrats {}, you've taken the lead at saying {}!", first.leader, join_names(&words)));
    }
    Some(format!(
        "Congrats {}, you've surpassed {} at saying {}!",
        first.leader,
        join_names(&dethroned),
        join_names(&words)
    ))
}

fn join_names(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [one] => one.to_string(),
        [a, b] => format!("{a} and {b}"),
        [init @ .., last] => format!("{}, and {}", init.join(", "), last),
    }
}
