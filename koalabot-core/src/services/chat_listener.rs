// File: koalabot-core/src/services/chat_listener.rs
//
// Drives every chat message through cache -> leaderboard -> streaks and
// publishes whatever the bot has to say back onto the event bus.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use koalabot_common::models::ChatEvent;

use crate::cache::Stenographer;
use crate::eventbus::{BotEvent, EventBus};
use crate::services::leaderboard_service::{leadership_announcement, ProfanityLeaderboard};
use crate::services::streak_service::StreakListener;

/// Everything the analytics path mutates, owned by the composition root and
/// shared behind one lock.
pub struct AnalyticsState {
    pub stenographer: Stenographer,
    pub leaderboard: ProfanityLeaderboard,
    pub streaks: Vec<StreakListener>,
}

impl AnalyticsState {
    pub fn new(stenographer: Stenographer, leaderboard: ProfanityLeaderboard, streaks: Vec<StreakListener>) -> Self {
        Self {
            stenographer,
            leaderboard,
            streaks,
        }
    }

    /// Caches the event, updates every counter and returns the replies.
    pub fn handle_chat(&mut self, event: ChatEvent) -> Vec<String> {
        let event = self.stenographer.push_message(event);
        let mut replies = Vec::new();

        let changes = self.leaderboard.observe(&event, &self.stenographer);
        if let Some(text) = leadership_announcement(&changes) {
            replies.push(text);
        }

        for listener in &mut self.streaks {
            if let Some(text) = listener.on_message(&event) {
                replies.push(text);
            }
        }
        replies
    }

    /// Waits for pending streak file writes.
    pub async fn flush(&self) {
        for listener in &self.streaks {
            listener.flush().await;
        }
    }
}

pub struct ChatListener {
    state: Arc<Mutex<AnalyticsState>>,
    event_bus: Arc<EventBus>,
    /// Messages from this author (the bot itself) are not counted.
    self_author_id: Option<String>,
    buffer_size: Option<usize>,
}

impl ChatListener {
    pub fn new(state: Arc<Mutex<AnalyticsState>>, event_bus: Arc<EventBus>) -> Self {
        Self {
            state,
            event_bus,
            self_author_id: None,
            buffer_size: None,
        }
    }

    pub fn with_self_author_id(mut self, author_id: impl Into<String>) -> Self {
        self.self_author_id = Some(author_id.into());
        self
    }

    /// Size of the listener's own bus queue (the bus default otherwise).
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    pub fn state(&self) -> Arc<Mutex<AnalyticsState>> {
        self.state.clone()
    }

    /// Processes one message and returns a `ChatReply` for each reply,
    /// addressed to the channel the message came from.
    pub async fn handle(&self, event: ChatEvent) -> Vec<BotEvent> {
        if self.self_author_id.as_deref() == Some(event.author_id.as_str()) {
            trace!("Skipping own message in {}", event.channel_id);
            return Vec::new();
        }
        let (guild_id, channel_id) = (event.guild_id.clone(), event.channel_id.clone());

        let replies = {
            let mut state = self.state.lock().await;
            state.handle_chat(event)
        };

        replies
            .into_iter()
            .map(|text| BotEvent::ChatReply {
                guild_id: guild_id.clone(),
                channel_id: channel_id.clone(),
                text,
            })
            .collect()
    }

    /// Subscribes to the bus and handles chat messages until shutdown.
    ///
    /// Replies reach the bus through a forwarding task; the listener never
    /// awaits `publish`, since its own queue is one of the subscribers.
    pub async fn spawn(self) -> JoinHandle<()> {
        let mut rx = self.event_bus.subscribe(self.buffer_size).await;
        let mut shutdown_rx = self.event_bus.shutdown_rx.clone();
        let reply_tx = spawn_reply_forwarder(self.event_bus.clone());

        tokio::spawn(async move {
            info!("Chat listener started");
            loop {
                tokio::select! {
                    biased;
                    Ok(_) = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Chat listener shutting down");
                            break;
                        }
                    }
                    maybe_event = rx.recv() => {
                        match maybe_event {
                            Some(BotEvent::ChatMessage(event)) => {
                                for reply in self.handle(event).await {
                                    if reply_tx.send(reply).is_err() {
                                        warn!("Reply forwarder gone; dropping reply");
                                    }
                                }
                            }
                            Some(other) => trace!("Chat listener ignoring {}", other.event_type()),
                            None => {
                                info!("Event bus closed; chat listener exiting");
                                break;
                            }
                        }
                    }
                }
            }
            self.state.lock().await.flush().await;
        })
    }
}

/// Publishes queued replies onto the bus until the sending side is dropped.
fn spawn_reply_forwarder(event_bus: Arc<EventBus>) -> mpsc::UnboundedSender<BotEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel::<BotEvent>();
    tokio::spawn(async move {
        while let Some(reply) = rx.recv().await {
            event_bus.publish(reply).await;
        }
        debug!("Reply forwarder finished");
    });
    tx
}
