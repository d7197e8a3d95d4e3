//! Cross-session publish/subscribe. Delivery is best-effort and unordered
//! across sessions; nothing is queued for absent subscribers. Payloads
//! travel as wire-format JSON so the in-process bus and a real transport
//! behave identically; unparseable payloads are skipped on receipt. The
//! core publishes on two topics: conversation/message events on
//! [`MESSAGING_TOPIC`], ephemeral typing signals on [`TYPING_TOPIC`].

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;
use uuid::Uuid;

pub use memory::MemoryBus;

pub const MESSAGING_TOPIC: &str = "messaging";
pub const TYPING_TOPIC: &str = "typing";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusEvent {
    #[serde(rename = "message:sent")]
    MessageSent {
        conversation_id: Uuid,
        sender_id: Uuid,
    },

    #[serde(rename = "conversation:created")]
    ConversationCreated { conversation_id: Uuid },

    #[serde(rename = "conversation:read")]
    ConversationRead {
        conversation_id: Uuid,
        user_id: Uuid,
    },

    #[serde(rename = "typing")]
    Typing {
        conversation_id: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    },

    #[serde(rename = "typing:clear")]
    TypingCleared {
        conversation_id: Uuid,
        user_id: Uuid,
    },
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Best-effort publish; a topic with no subscribers is not an error.
    async fn publish(&self, topic: &str, payload: String);

    /// Subscribe to a topic. The receiver sees payloads published after
    /// this call, in per-publisher order only.
    async fn subscribe(&self, topic: &str) -> UnboundedReceiver<String>;
}

impl dyn MessageBus {
    /// Publish a typed event in its wire format.
    pub async fn publish_event(&self, topic: &str, event: &BusEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => self.publish(topic, payload).await,
            Err(e) => warn!("bus event serialization failed: {e}"),
        }
    }
}

/// Decode a received payload; foreign or malformed payloads yield `None`
/// and are skipped, keeping delivery best-effort.
pub fn decode_event(payload: &str) -> Option<BusEvent> {
    serde_json::from_str(payload).ok()
}
