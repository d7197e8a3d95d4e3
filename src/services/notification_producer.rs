//! Notification Producer
//!
//! Hands notification-worthy events to the external notification
//! collaborator. Transport (push, in-app feeds) is out of scope here; the
//! producer writes to a channel the embedding application drains.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotificationEvent {
    /// A recipient should be told the message they received was
    /// substantially rewritten after the fact.
    #[serde(rename = "message:edited")]
    MessageEdited {
        message_id: Uuid,
        conversation_id: Uuid,
        editor_id: Uuid,
        recipient_id: Uuid,
        edited_at: DateTime<Utc>,
    },
}

#[derive(Clone)]
pub struct NotificationProducer {
    tx: UnboundedSender<NotificationEvent>,
}

impl NotificationProducer {
    pub fn new() -> (Self, UnboundedReceiver<NotificationEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    /// Best-effort emit; a consumer that has gone away drops the event.
    pub fn emit(&self, event: NotificationEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("notification consumer gone, event dropped");
        }
    }
}
