use crate::models::attachment::MessageAttachment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Delivery state of a message. `Sending` is explicit rather than an
/// absent/undefined status so "never attempted" and "actively sending"
/// cannot be confused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Failed,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Sending => write!(f, "sending"),
            MessageStatus::Sent => write!(f, "sent"),
            MessageStatus::Delivered => write!(f, "delivered"),
            MessageStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Pre-edit snapshot, appended to `edit_history` on every edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditRecord {
    pub content: String,
    pub edited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub edit_history: Vec<EditRecord>,
    pub attachments: Vec<MessageAttachment>,
    /// emoji -> users who reacted with it; empty sets are removed.
    pub reactions: HashMap<String, HashSet<Uuid>>,
    /// Every participant has a key; the sender's is stamped at creation.
    pub read_at: HashMap<Uuid, Option<DateTime<Utc>>>,
    pub status: MessageStatus,
    pub replied_to_id: Option<Uuid>,
    pub forwarded_from_id: Option<Uuid>,
    /// Users who removed the message from their own view.
    pub deleted_for: HashSet<Uuid>,
    /// Tombstone overlay; orthogonal to `status`.
    pub deleted_for_everyone: bool,
    pub deleted_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    /// A new message in the `Sending` state, with the read map seeded so
    /// that the sender's entry equals `created_at` and every other
    /// participant's is empty.
    pub fn new(
        conversation_id: Uuid,
        sender_id: Uuid,
        content: String,
        participants: &[Uuid],
    ) -> Self {
        let created_at = Utc::now();
        let read_at = participants
            .iter()
            .map(|&participant_id| {
                let stamp = (participant_id == sender_id).then_some(created_at);
                (participant_id, stamp)
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content,
            created_at,
            edited_at: None,
            edit_history: Vec::new(),
            attachments: Vec::new(),
            reactions: HashMap::new(),
            read_at,
            status: MessageStatus::Sending,
            replied_to_id: None,
            forwarded_from_id: None,
            deleted_for: HashSet::new(),
            deleted_for_everyone: false,
            deleted_by: None,
            deleted_at: None,
        }
    }

    pub fn is_read_by(&self, user_id: Uuid) -> bool {
        matches!(self.read_at.get(&user_id), Some(Some(_)))
    }

    pub fn is_visible_to(&self, user_id: Uuid) -> bool {
        !self.deleted_for.contains(&user_id)
    }
}
