// File: koalabot-core/src/services/streak_service.rs
//
// Time between consecutive uses of one word in a channel: the ordered event
// log, its longest and average gaps, on-disk snapshots and chat replies.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use koalabot_common::models::{ChatEvent, ResponseTier, StreakEvent, StreakEventRow, TrackedWord};
use koalabot_common::traits::DurableStore;

use crate::Error;
use crate::services::word_tracker::WordMatcher;
use crate::tasks::background::spawn_fire_and_forget;
use crate::tasks::snapshot_writer::SnapshotWriter;
use crate::utils::time::HumanDuration;

/// What one recorded occurrence did to the statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreakOutcome {
    pub gap_ms: i64,
    pub is_new_record: bool,
    pub longest_gap_ms: i64,
    pub average_gap_ms: f64,
}

/// Ordered occurrences of a word in one channel.
#[derive(Debug, Clone, Default)]
pub struct StreakTracker {
    events: Vec<StreakEvent>,
    longest_gap_ms: i64,
    average_gap_ms: f64,
}

impl StreakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes `events` as already ordered and derives both statistics.
    pub fn from_events(events: Vec<StreakEvent>) -> Self {
        let mut tracker = Self {
            events,
            ..Self::default()
        };
        tracker.longest_gap_ms = tracker.recalculate_longest();
        tracker.average_gap_ms = tracker.recalculate_average();
        tracker
    }

    pub fn from_json(raw: &str) -> Result<Self, Error> {
        let events: Vec<StreakEvent> = serde_json::from_str(raw)?;
        Ok(Self::from_events(events))
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(&self.events)?)
    }

    /// Appends an occurrence. The first one ever has nothing to compare
    /// against and returns `None`. The second only establishes the first
    /// streak; from the third on a strictly longer gap is a new record.
    pub fn record(&mut self, event: StreakEvent) -> Option<StreakOutcome> {
        let Some(last) = self.events.last() else {
            self.events.push(event);
            return None;
        };

        let gap_ms = event.timestamp_ms - last.timestamp_ms;
        let is_new_record = self.events.len() >= 2 && gap_ms > self.longest_gap_ms;

        self.events.push(event);
        self.longest_gap_ms = self.recalculate_longest();

        let gaps = (self.events.len() - 1) as f64;
        self.average_gap_ms += (gap_ms as f64 - self.average_gap_ms) / gaps;

        Some(StreakOutcome {
            gap_ms,
            is_new_record,
            longest_gap_ms: self.longest_gap_ms,
            average_gap_ms: self.average_gap_ms,
        })
    }

    pub fn events(&self) -> &[StreakEvent] {
        &self.events
    }

    pub fn longest_gap_ms(&self) -> i64 {
        self.longest_gap_ms
    }

    pub fn average_gap_ms(&self) -> f64 {
        self.average_gap_ms
    }

    fn recalculate_longest(&self) -> i64 {
        self.events
            .windows(2)
            .map(|pair| (pair[1].timestamp_ms - pair[0].timestamp_ms).abs())
            .max()
            .unwrap_or(0)
    }

    fn recalculate_average(&self) -> f64 {
        self.events
            .windows(2)
            .enumerate()
            .fold(0.0, |avg, (i, pair)| {
                let gap = (pair[1].timestamp_ms - pair[0].timestamp_ms) as f64;
                avg + (gap - avg) / (i + 1) as f64
            })
    }
}

/// Reply for one occurrence, or `None` when this tier stays quiet.
pub fn streak_reply(word: &str, tier: ResponseTier, outcome: &StreakOutcome) -> Option<String> {
    let prefix = match tier {
        ResponseTier::Silent => return None,
        _ if outcome.is_new_record => "IT'S A NEW RECORD!",
        ResponseTier::Always => "RESET THE CLOCK!",
        ResponseTier::RecordsOnly => return None,
    };
    Some(format!(
        "{} It's been {} since the last time {} was said with a new average of {}!",
        prefix,
        HumanDuration::from_millis(outcome.gap_ms as f64).long(),
        word,
        HumanDuration::from_millis(outcome.average_gap_ms).short()
    ))
}

/// `{save_dir}/{word}_{channel_id}.json`
pub fn streak_save_path(save_dir: &Path, word: &str, channel_id: &str) -> PathBuf {
    save_dir.join(format!("{word}_{channel_id}.json"))
}

/// Watches one word across its tracked channels.
pub struct StreakListener {
    word: String,
    matcher: WordMatcher,
    tier: ResponseTier,
    tracking_channels: Vec<String>,
    save_dir: PathBuf,
    trackers: HashMap<String, StreakTracker>,
    writers: HashMap<String, SnapshotWriter>,
    store: Option<Arc<dyn DurableStore>>,
}

impl StreakListener {
    pub fn new(word: &str, tier: ResponseTier, tracking_channels: Vec<String>, save_dir: impl Into<PathBuf>) -> Self {
        let word = word.to_lowercase();
        let literal = regex::escape(&word);
        let matcher = WordMatcher::new(&TrackedWord::new(&word, &[literal.as_str()]));
        Self {
            word,
            matcher,
            tier,
            tracking_channels,
            save_dir: save_dir.into(),
            trackers: HashMap::new(),
            writers: HashMap::new(),
            store: None,
        }
    }

    pub fn set_store(&mut self, store: Option<Arc<dyn DurableStore>>) {
        self.store = store;
    }

    pub fn word(&self) -> &str {
        &self.word
    }

    pub fn tier(&self) -> ResponseTier {
        self.tier
    }

    pub fn tracking_channels(&self) -> &[String] {
        &self.tracking_channels
    }

    pub fn tracker(&self, channel_id: &str) -> Option<&StreakTracker> {
        self.trackers.get(channel_id)
    }

    pub fn tracked_events(&self, channel_id: &str) -> &[StreakEvent] {
        self.trackers.get(channel_id).map(StreakTracker::events).unwrap_or(&[])
    }

    /// Creates the save directory if needed and loads any saved tracker for
    /// each tracked channel. A broken file leaves that channel empty.
    pub fn load_saved(&mut self) -> Result<(), Error> {
        if !self.save_dir.exists() {
            std::fs::create_dir_all(&self.save_dir)?;
            info!("Created streak save directory {:?}", self.save_dir);
            return Ok(());
        }

        for channel_id in &self.tracking_channels {
            let path = streak_save_path(&self.save_dir, &self.word, channel_id);
            if !path.exists() {
                continue;
            }
            match std::fs::read_to_string(&path).map_err(Error::from).and_then(|raw| StreakTracker::from_json(&raw)) {
                Ok(tracker) => {
                    debug!("Loaded {} '{}' events for channel {}", tracker.events().len(), self.word, channel_id);
                    self.trackers.insert(channel_id.clone(), tracker);
                }
                Err(e) => error!("Failed to load streak file {:?}: {}", path, e),
            }
        }
        Ok(())
    }

    /// Records the message if it was sent in a tracked channel and contains
    /// the word, then returns the reply this listener's tier calls for.
    pub fn on_message(&mut self, event: &ChatEvent) -> Option<String> {
        if !self.tracking_channels.iter().any(|c| *c == event.channel_id) {
            return None;
        }
        if !self.matcher.is_in_message(&event.content) {
            return None;
        }

        let streak_event = StreakEvent::new(event.timestamp_ms, &event.author_id, &event.author_name);
        let outcome = self
            .trackers
            .entry(event.channel_id.clone())
            .or_default()
            .record(streak_event.clone());

        self.persist(&event.channel_id, &streak_event);

        let outcome = outcome?;
        if outcome.is_new_record {
            info!("New '{}' record in channel {}: {} ms", self.word, event.channel_id, outcome.gap_ms);
        }
        streak_reply(&self.word, self.tier, &outcome)
    }

    /// Swaps in a reconciled event list for a channel and rewrites its file.
    pub fn replace_events(&mut self, channel_id: &str, events: Vec<StreakEvent>) {
        self.trackers.insert(channel_id.to_string(), StreakTracker::from_events(events));
        self.write_snapshot(channel_id);
    }

    /// Waits until every queued file write has landed.
    pub async fn flush(&self) {
        for writer in self.writers.values() {
            writer.settled().await;
        }
    }

    fn persist(&mut self, channel_id: &str, event: &StreakEvent) {
        self.write_snapshot(channel_id);

        let Some(store) = self.store.as_ref().filter(|s| s.is_available()).cloned() else {
            return;
        };
        let row = StreakEventRow::from_event(channel_id, &self.word, event);
        // not awaited; durable copy catches up in the background
        spawn_fire_and_forget(format!("insert_streak_event({}, {})", channel_id, self.word), async move {
            store.insert_streak_event(&row).await
        });
    }

    fn write_snapshot(&mut self, channel_id: &str) {
        let Some(tracker) = self.trackers.get(channel_id) else {
            return;
        };
        let content = match tracker.to_json() {
            Ok(c) => c,
            Err(e) => {
                warn!("Could not serialize '{}' streak for {}: {}", self.word, channel_id, e);
                return;
            }
        };
        let path = streak_save_path(&self.save_dir, &self.word, channel_id);
        self.writers
            .entry(channel_id.to_string())
            .or_insert_with(|| SnapshotWriter::new(path))
            .submit(content);
    }
}
