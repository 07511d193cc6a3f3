//! src/eventbus/mod.rs
//!
//! Provides an in-process event bus that supports guaranteed delivery
//! to multiple subscribers via bounded MPSC queues.

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

use koalabot_common::models::ChatEvent;

/// Events passed between the chat transport and the analytics services.
#[derive(Debug, Clone)]
pub enum BotEvent {
    /// A message observed by the chat transport.
    ChatMessage(ChatEvent),

    /// Text the transport should post back into a channel.
    ChatReply {
        guild_id: String,
        channel_id: String,
        text: String,
    },

    /// Periodic heartbeat.
    Tick,
}

impl BotEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            BotEvent::ChatMessage(_) => "chat_message",
            BotEvent::ChatReply { .. } => "chat_reply",
            BotEvent::Tick => "tick",
        }
    }
}

/// Each subscriber gets its own `mpsc::Sender<BotEvent>` for guaranteed delivery.
///
/// - If the subscriber’s channel buffer fills, `publish` will await
///   until there's space (backpressure).
/// - If the subscriber has dropped the `Receiver`, the channel is closed
///   and sending returns an error.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<BotEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Default size for each subscriber’s buffer.
const DEFAULT_BUFFER_SIZE: usize = 10000;

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Returns a receiver on which events will be delivered.
    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<BotEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    /// Publish an event to all subscribers. Closed subscribers are pruned.
    pub async fn publish(&self, event: BotEvent) {
        let senders = {
            let subs = self.subscribers.lock().await;
            subs.clone()
        };
        let mut saw_closed = false;
        for s in senders {
            if s.send(event.clone()).await.is_err() {
                saw_closed = true;
            }
        }
        if saw_closed {
            self.subscribers.lock().await.retain(|s| !s.is_closed());
        }
    }

    /// Convenience method: publish a `ChatMessage` event.
    pub async fn publish_chat(&self, event: ChatEvent) {
        self.publish(BotEvent::ChatMessage(event)).await;
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
