//! Persistence boundary. The concrete engine is an external collaborator;
//! everything here is the contract the core consumes: CRUD over
//! conversations and messages with last-write-wins partial-merge updates,
//! plus a change feed fired on every write so other sessions can re-sync.

pub mod memory;

use crate::error::AppResult;
use crate::models::{Conversation, Message};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::broadcast;
use uuid::Uuid;

pub use memory::MemoryStore;

/// Fired after every committed write. Sessions either re-read the affected
/// entity or ignore the notice; there is no payload beyond identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    ConversationUpserted(Uuid),
    ConversationDeleted(Uuid),
    MessageUpserted {
        conversation_id: Uuid,
        message_id: Uuid,
    },
    MessageDeleted {
        conversation_id: Uuid,
        message_id: Uuid,
    },
}

/// Partial-merge update for a conversation. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct ConversationPatch {
    pub title: Option<Option<String>>,
    pub pinned: Option<bool>,
    pub archived: Option<bool>,
    pub muted: Option<bool>,
    pub unread_counts: Option<HashMap<Uuid, u32>>,
    pub last_message_id: Option<Option<Uuid>>,
    pub snippet: Option<Option<String>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Partial-merge update for a message.
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub edited_at: Option<Option<DateTime<Utc>>>,
    pub edit_history: Option<Vec<crate::models::EditRecord>>,
    pub attachments: Option<Vec<crate::models::MessageAttachment>>,
    pub reactions: Option<HashMap<String, HashSet<Uuid>>>,
    pub read_at: Option<HashMap<Uuid, Option<DateTime<Utc>>>>,
    pub status: Option<crate::models::MessageStatus>,
    pub deleted_for: Option<HashSet<Uuid>>,
    pub deleted_for_everyone: Option<bool>,
    pub deleted_by: Option<Option<Uuid>>,
    pub deleted_at: Option<Option<DateTime<Utc>>>,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation over the given participants, or return the
    /// existing one covering exactly that participant set.
    async fn create_conversation(&self, participant_ids: &[Uuid]) -> AppResult<Conversation>;

    async fn conversation(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    async fn conversation_by_participants(
        &self,
        participant_ids: &[Uuid],
    ) -> AppResult<Option<Conversation>>;

    /// Conversations the user participates in, most recently updated first.
    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>>;

    async fn update_conversation(
        &self,
        id: Uuid,
        patch: ConversationPatch,
    ) -> AppResult<Conversation>;

    async fn delete_conversation(&self, id: Uuid) -> AppResult<()>;

    async fn insert_message(&self, message: Message) -> AppResult<Message>;

    async fn message(&self, id: Uuid) -> AppResult<Option<Message>>;

    /// Messages of a conversation ordered ascending by creation time.
    async fn messages_for_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>>;

    async fn update_message(&self, id: Uuid, patch: MessagePatch) -> AppResult<Message>;

    /// Hard delete. Only failed messages are ever physically removed.
    async fn delete_message(&self, id: Uuid) -> AppResult<()>;

    fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange>;
}

impl MessagePatch {
    pub fn status(status: crate::models::MessageStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}
