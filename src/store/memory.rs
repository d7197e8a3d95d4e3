use crate::error::{AppError, AppResult};
use crate::models::conversation::normalize_participants;
use crate::models::{Conversation, Message};
use crate::store::{ConversationPatch, ConversationStore, MessagePatch, StoreChange};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Single-process store backed by in-memory maps. Writes are
/// last-write-wins; every committed write emits a [`StoreChange`].
#[derive(Clone)]
pub struct MemoryStore {
    conversations: Arc<RwLock<HashMap<Uuid, Conversation>>>,
    messages: Arc<RwLock<HashMap<Uuid, Message>>>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            messages: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    fn notify(&self, change: StoreChange) {
        // Best-effort: nobody listening is fine.
        let _ = self.changes.send(change);
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(&self, participant_ids: &[Uuid]) -> AppResult<Conversation> {
        let normalized = normalize_participants(participant_ids);
        if normalized.len() < 2 {
            return Err(AppError::BadRequest(
                "conversation requires at least two participants".into(),
            ));
        }

        let mut guard = self.conversations.write().await;
        if let Some(existing) = guard
            .values()
            .find(|c| c.participant_ids == normalized)
            .cloned()
        {
            return Ok(existing);
        }

        let conversation = Conversation::new(normalized);
        guard.insert(conversation.id, conversation.clone());
        drop(guard);

        self.notify(StoreChange::ConversationUpserted(conversation.id));
        Ok(conversation)
    }

    async fn conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self.conversations.read().await.get(&id).cloned())
    }

    async fn conversation_by_participants(
        &self,
        participant_ids: &[Uuid],
    ) -> AppResult<Option<Conversation>> {
        let normalized = normalize_participants(participant_ids);
        Ok(self
            .conversations
            .read()
            .await
            .values()
            .find(|c| c.participant_ids == normalized)
            .cloned())
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let mut list: Vec<Conversation> = self
            .conversations
            .read()
            .await
            .values()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(list)
    }

    async fn update_conversation(
        &self,
        id: Uuid,
        patch: ConversationPatch,
    ) -> AppResult<Conversation> {
        let mut guard = self.conversations.write().await;
        let conversation = guard.get_mut(&id).ok_or(AppError::NotFound)?;

        if let Some(title) = patch.title {
            conversation.title = title;
        }
        if let Some(pinned) = patch.pinned {
            conversation.pinned = pinned;
        }
        if let Some(archived) = patch.archived {
            conversation.archived = archived;
        }
        if let Some(muted) = patch.muted {
            conversation.muted = muted;
        }
        if let Some(unread_counts) = patch.unread_counts {
            conversation.unread_counts = unread_counts;
        }
        if let Some(last_message_id) = patch.last_message_id {
            conversation.last_message_id = last_message_id;
        }
        if let Some(snippet) = patch.snippet {
            conversation.snippet = snippet;
        }
        if let Some(updated_at) = patch.updated_at {
            // updated_at never goes backwards.
            conversation.updated_at = conversation.updated_at.max(updated_at);
        }

        let updated = conversation.clone();
        drop(guard);

        self.notify(StoreChange::ConversationUpserted(id));
        Ok(updated)
    }

    async fn delete_conversation(&self, id: Uuid) -> AppResult<()> {
        let removed = self.conversations.write().await.remove(&id);
        if removed.is_none() {
            return Err(AppError::NotFound);
        }
        self.messages
            .write()
            .await
            .retain(|_, m| m.conversation_id != id);
        self.notify(StoreChange::ConversationDeleted(id));
        Ok(())
    }

    async fn insert_message(&self, message: Message) -> AppResult<Message> {
        let conversation_id = message.conversation_id;
        let message_id = message.id;
        self.messages
            .write()
            .await
            .insert(message_id, message.clone());

        self.notify(StoreChange::MessageUpserted {
            conversation_id,
            message_id,
        });
        Ok(message)
    }

    async fn message(&self, id: Uuid) -> AppResult<Option<Message>> {
        Ok(self.messages.read().await.get(&id).cloned())
    }

    async fn messages_for_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let mut list: Vec<Message> = self
            .messages
            .read()
            .await
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(list)
    }

    async fn update_message(&self, id: Uuid, patch: MessagePatch) -> AppResult<Message> {
        let mut guard = self.messages.write().await;
        let message = guard.get_mut(&id).ok_or(AppError::NotFound)?;

        if let Some(content) = patch.content {
            message.content = content;
        }
        if let Some(edited_at) = patch.edited_at {
            message.edited_at = edited_at;
        }
        if let Some(edit_history) = patch.edit_history {
            message.edit_history = edit_history;
        }
        if let Some(attachments) = patch.attachments {
            message.attachments = attachments;
        }
        if let Some(reactions) = patch.reactions {
            message.reactions = reactions;
        }
        if let Some(read_at) = patch.read_at {
            message.read_at = read_at;
        }
        if let Some(status) = patch.status {
            message.status = status;
        }
        if let Some(deleted_for) = patch.deleted_for {
            message.deleted_for = deleted_for;
        }
        if let Some(deleted_for_everyone) = patch.deleted_for_everyone {
            message.deleted_for_everyone = deleted_for_everyone;
        }
        if let Some(deleted_by) = patch.deleted_by {
            message.deleted_by = deleted_by;
        }
        if let Some(deleted_at) = patch.deleted_at {
            message.deleted_at = deleted_at;
        }

        let updated = message.clone();
        drop(guard);

        self.notify(StoreChange::MessageUpserted {
            conversation_id: updated.conversation_id,
            message_id: id,
        });
        Ok(updated)
    }

    async fn delete_message(&self, id: Uuid) -> AppResult<()> {
        let removed = self.messages.write().await.remove(&id);
        match removed {
            Some(message) => {
                self.notify(StoreChange::MessageDeleted {
                    conversation_id: message.conversation_id,
                    message_id: id,
                });
                Ok(())
            }
            None => Err(AppError::NotFound),
        }
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
