//! Forward Dispatch
//!
//! Fans an existing message out to other conversations (or to bare user
//! targets, creating the one-on-one conversation on demand) under a
//! lifetime cap per (sender, source message). The cap check is
//! all-or-nothing: an over-limit request dispatches to zero targets and
//! leaves the counter untouched.

use crate::bus::{BusEvent, MessageBus, MESSAGING_TOPIC};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Conversation, MessageAttachment};
use crate::services::message_service::MessageLifecycleController;
use crate::store::ConversationStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub enum ForwardTarget {
    /// An existing conversation.
    Conversation(Uuid),
    /// A user; the one-on-one conversation is found or created.
    User(Uuid),
}

pub struct ForwardDispatcher {
    store: Arc<dyn ConversationStore>,
    controller: Arc<MessageLifecycleController>,
    bus: Arc<dyn MessageBus>,
    config: Arc<Config>,
    /// (sender, source message) -> lifetime forwards dispatched.
    counters: Mutex<HashMap<(Uuid, Uuid), u32>>,
}

impl ForwardDispatcher {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        controller: Arc<MessageLifecycleController>,
        bus: Arc<dyn MessageBus>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            controller,
            bus,
            config,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Forward a message to the given targets with an optional leading
    /// comment. Returns the ids of the newly created messages.
    pub async fn dispatch(
        &self,
        sender_id: Uuid,
        source_message_id: Uuid,
        targets: &[ForwardTarget],
        comment: Option<&str>,
    ) -> AppResult<Vec<Uuid>> {
        let source = self
            .store
            .message(source_message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if source.deleted_for_everyone {
            return Err(AppError::AlreadyDeleted);
        }

        // Held across the whole dispatch so concurrent calls cannot slip
        // past the cap between check and increment.
        let mut counters = self.counters.lock().await;
        let key = (sender_id, source_message_id);
        let current = counters.get(&key).copied().unwrap_or(0);
        let limit = self.config.forward_limit;
        if current + targets.len() as u32 > limit {
            return Err(AppError::ForwardLimitExceeded {
                limit,
                current,
                requested: targets.len(),
            });
        }

        let content = join_comment(comment, &source.content);

        // Resolve every target before creating anything, so a bad target
        // rejects the dispatch with nothing sent.
        let mut conversations: Vec<Conversation> = Vec::with_capacity(targets.len());
        for target in targets {
            conversations.push(self.resolve_target(sender_id, *target).await?);
        }

        let mut created = Vec::with_capacity(conversations.len());
        for conversation in &conversations {
            let attachments: Vec<MessageAttachment> = source
                .attachments
                .iter()
                .map(MessageAttachment::with_fresh_id)
                .collect();
            let message = self
                .controller
                .create_message(
                    conversation,
                    sender_id,
                    content.clone(),
                    attachments,
                    None,
                    Some(source.id),
                )
                .await;
            match message {
                Ok(message) => created.push(message.id),
                Err(e) => {
                    *counters.entry(key).or_insert(0) += created.len() as u32;
                    return Err(e);
                }
            }
        }

        *counters.entry(key).or_insert(0) += created.len() as u32;
        info!(
            %source_message_id,
            dispatched = created.len(),
            total = current + created.len() as u32,
            "message forwarded"
        );
        Ok(created)
    }

    pub async fn forward_count(&self, sender_id: Uuid, source_message_id: Uuid) -> u32 {
        self.counters
            .lock()
            .await
            .get(&(sender_id, source_message_id))
            .copied()
            .unwrap_or(0)
    }

    async fn resolve_target(
        &self,
        sender_id: Uuid,
        target: ForwardTarget,
    ) -> AppResult<Conversation> {
        match target {
            ForwardTarget::Conversation(id) => {
                self.store.conversation(id).await?.ok_or(AppError::NotFound)
            }
            ForwardTarget::User(user_id) => {
                let participants = [sender_id, user_id];
                if let Some(existing) = self
                    .store
                    .conversation_by_participants(&participants)
                    .await?
                {
                    return Ok(existing);
                }
                let conversation = self.store.create_conversation(&participants).await?;
                self.bus
                    .publish_event(
                        MESSAGING_TOPIC,
                        &BusEvent::ConversationCreated {
                            conversation_id: conversation.id,
                        },
                    )
                    .await;
                Ok(conversation)
            }
        }
    }
}

/// Comment and original joined by a blank line when both are present.
fn join_comment(comment: Option<&str>, original: &str) -> String {
    let comment = comment.unwrap_or("").trim();
    let original = original.trim();
    match (comment.is_empty(), original.is_empty()) {
        (false, false) => format!("{comment}\n\n{original}"),
        (false, true) => comment.to_string(),
        (true, _) => original.to_string(),
    }
}
