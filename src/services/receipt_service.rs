//! Read Receipt Aggregation
//!
//! Derives per-message read/unread views from the raw per-participant
//! timestamps stored on the message, and stamps receipts when a user
//! views a conversation.

use crate::bus::{BusEvent, MessageBus, MESSAGING_TOPIC};
use crate::error::{AppError, AppResult};
use crate::models::Message;
use crate::store::{ConversationPatch, ConversationStore, MessagePatch};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadEntry {
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReadReceiptDetails {
    /// Who has read the message, ascending by read time.
    pub read_by: Vec<ReadEntry>,
    /// Relevant participants with no receipt yet.
    pub unread_by: Vec<Uuid>,
    pub last_read_at: Option<DateTime<Utc>>,
    pub is_fully_read: bool,
}

/// Partition a conversation's participants by whether they have read the
/// message. The sender is excluded from the relevant set unless
/// `include_sender` is set (their receipt is the creation stamp).
pub fn read_receipt_details(
    message: &Message,
    participants: &[Uuid],
    include_sender: bool,
) -> ReadReceiptDetails {
    let mut relevant: Vec<Uuid> = Vec::new();
    for &participant_id in participants {
        if relevant.contains(&participant_id) {
            continue;
        }
        if include_sender || participant_id != message.sender_id {
            relevant.push(participant_id);
        }
    }

    let mut read_by: Vec<ReadEntry> = relevant
        .iter()
        .filter_map(|&user_id| {
            message
                .read_at
                .get(&user_id)
                .copied()
                .flatten()
                .map(|read_at| ReadEntry { user_id, read_at })
        })
        .collect();
    read_by.sort_by_key(|entry| entry.read_at);

    let unread_by: Vec<Uuid> = relevant
        .iter()
        .copied()
        .filter(|user_id| !read_by.iter().any(|entry| entry.user_id == *user_id))
        .collect();

    let last_read_at = read_by.last().map(|entry| entry.read_at);
    let is_fully_read = unread_by.is_empty() && read_by.len() == relevant.len();

    ReadReceiptDetails {
        read_by,
        unread_by,
        last_read_at,
        is_fully_read,
    }
}

pub struct ReadReceiptAggregator {
    store: Arc<dyn ConversationStore>,
    bus: Arc<dyn MessageBus>,
}

impl ReadReceiptAggregator {
    pub fn new(store: Arc<dyn ConversationStore>, bus: Arc<dyn MessageBus>) -> Self {
        Self { store, bus }
    }

    /// Stamp `read_at[user_id] = now` on every message in the
    /// conversation authored by someone else and not yet read by this
    /// user, and zero the user's unread count. Returns whether anything
    /// changed; calling again immediately is a no-op.
    pub async fn mark_read(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let conversation = self
            .store
            .conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !conversation.has_participant(user_id) {
            return Err(AppError::Forbidden);
        }

        let messages = self.store.messages_for_conversation(conversation_id).await?;
        let unread: Vec<&Message> = messages
            .iter()
            .filter(|m| m.sender_id != user_id && !m.is_read_by(user_id))
            .collect();
        if unread.is_empty() {
            return Ok(false);
        }

        let now = Utc::now();
        for message in unread {
            let mut read_at = message.read_at.clone();
            read_at.insert(user_id, Some(now));
            self.store
                .update_message(
                    message.id,
                    MessagePatch {
                        read_at: Some(read_at),
                        ..Default::default()
                    },
                )
                .await?;
        }

        if conversation
            .unread_counts
            .get(&user_id)
            .copied()
            .unwrap_or(0)
            > 0
        {
            let mut unread_counts = conversation.unread_counts.clone();
            unread_counts.insert(user_id, 0);
            self.store
                .update_conversation(
                    conversation_id,
                    ConversationPatch {
                        unread_counts: Some(unread_counts),
                        ..Default::default()
                    },
                )
                .await?;
        }

        debug!(%conversation_id, %user_id, "conversation marked read");
        self.bus
            .publish_event(
                MESSAGING_TOPIC,
                &BusEvent::ConversationRead {
                    conversation_id,
                    user_id,
                },
            )
            .await;
        Ok(true)
    }
}
