//! Message Lifecycle Controller
//!
//! Owns message creation, the sending → sent/delivered/failed state
//! machine, edit/delete/react, and retry. Delivery is resolved by
//! two-phase timers standing in for real acknowledgments; every timer
//! re-checks the message's current state (and its resolution epoch)
//! before applying an outcome, so a timer that outlived a retry or a
//! deletion is a guaranteed no-op rather than a race.

use crate::bus::{BusEvent, MessageBus, MESSAGING_TOPIC};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Conversation, Message, MessageAttachment, MessageStatus, PendingAttachment};
use crate::services::attachment_service::finalize_attachment;
use crate::services::notification_producer::{NotificationEvent, NotificationProducer};
use crate::services::presence::PresenceSource;
use crate::services::relationship_service::RelationshipProvider;
use crate::store::{ConversationPatch, ConversationStore, MessagePatch};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

pub struct MessageLifecycleController {
    store: Arc<dyn ConversationStore>,
    bus: Arc<dyn MessageBus>,
    presence: Arc<dyn PresenceSource>,
    relationships: Arc<dyn RelationshipProvider>,
    notifications: NotificationProducer,
    config: Arc<Config>,
    /// Local session connectivity; submissions while offline resolve to
    /// failed, mirroring a dropped uplink.
    online: AtomicBool,
    /// Resolution epoch per message. A scheduled resolution captures the
    /// epoch at scheduling time and refuses to apply once it moved on.
    resolutions: Mutex<HashMap<Uuid, u64>>,
}

impl MessageLifecycleController {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        bus: Arc<dyn MessageBus>,
        presence: Arc<dyn PresenceSource>,
        relationships: Arc<dyn RelationshipProvider>,
        notifications: NotificationProducer,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            bus,
            presence,
            relationships,
            notifications,
            config,
            online: AtomicBool::new(true),
            resolutions: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_connectivity(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }

    /// Compose and send. Validates the composition, persists the message
    /// optimistically in the `Sending` state, updates conversation
    /// bookkeeping, and schedules delivery resolution. Returns the
    /// message id immediately; the status settles asynchronously.
    pub async fn submit(
        self: &Arc<Self>,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        attachments: Vec<PendingAttachment>,
        replied_to: Option<Uuid>,
    ) -> AppResult<Uuid> {
        let trimmed = content.trim();
        if trimmed.is_empty() && attachments.is_empty() {
            return Err(AppError::EmptyComposition);
        }
        if attachments.iter().any(|a| !a.is_ready()) {
            return Err(AppError::AttachmentsNotReady);
        }
        if attachments.len() > self.config.max_attachments {
            return Err(AppError::AttachmentLimitExceeded {
                max: self.config.max_attachments,
            });
        }

        let conversation = self
            .store
            .conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !conversation.has_participant(sender_id) {
            return Err(AppError::Forbidden);
        }

        let finalized: Vec<MessageAttachment> =
            attachments.iter().map(finalize_attachment).collect();

        let message = self
            .create_message(
                &conversation,
                sender_id,
                trimmed.to_string(),
                finalized,
                replied_to,
                None,
            )
            .await?;
        Ok(message.id)
    }

    /// Shared creation path for composed and forwarded messages: persist,
    /// bump the conversation, announce, schedule resolution.
    pub(crate) async fn create_message(
        self: &Arc<Self>,
        conversation: &Conversation,
        sender_id: Uuid,
        content: String,
        attachments: Vec<MessageAttachment>,
        replied_to: Option<Uuid>,
        forwarded_from: Option<Uuid>,
    ) -> AppResult<Message> {
        let mut message = Message::new(
            conversation.id,
            sender_id,
            content,
            &conversation.participant_ids,
        );
        message.attachments = attachments;
        message.replied_to_id = replied_to;
        message.forwarded_from_id = forwarded_from;

        let message = self.store.insert_message(message).await?;

        // Sender's unread count resets, everyone else's increments.
        let unread_counts: HashMap<Uuid, u32> = conversation
            .participant_ids
            .iter()
            .map(|&participant_id| {
                let previous = conversation
                    .unread_counts
                    .get(&participant_id)
                    .copied()
                    .unwrap_or(0);
                let next = if participant_id == sender_id {
                    0
                } else {
                    previous + 1
                };
                (participant_id, next)
            })
            .collect();

        self.store
            .update_conversation(
                conversation.id,
                ConversationPatch {
                    unread_counts: Some(unread_counts),
                    last_message_id: Some(Some(message.id)),
                    snippet: Some(Some(message.content.clone())),
                    updated_at: Some(message.created_at),
                    ..Default::default()
                },
            )
            .await?;

        self.bus
            .publish_event(
                MESSAGING_TOPIC,
                &BusEvent::MessageSent {
                    conversation_id: conversation.id,
                    sender_id,
                },
            )
            .await;

        info!(message_id = %message.id, conversation_id = %conversation.id, "message submitted");
        self.schedule_resolution(message.id, conversation.clone(), sender_id)
            .await;
        Ok(message)
    }

    /// Re-run delivery resolution for a failed message. Rejected for any
    /// other status; a retry issued while a stale timer is still pending
    /// supersedes it via the epoch bump.
    pub async fn retry(self: &Arc<Self>, message_id: Uuid) -> AppResult<()> {
        let message = self
            .store
            .message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if message.deleted_for_everyone {
            return Err(AppError::AlreadyDeleted);
        }
        if message.status != MessageStatus::Failed {
            return Err(AppError::RetryNotAllowed {
                status: message.status.to_string(),
            });
        }

        let conversation = self
            .store
            .conversation(message.conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;

        self.store
            .update_message(message_id, MessagePatch::status(MessageStatus::Sending))
            .await?;
        self.schedule_resolution(message_id, conversation, message.sender_id)
            .await;
        Ok(())
    }

    async fn schedule_resolution(
        self: &Arc<Self>,
        message_id: Uuid,
        conversation: Conversation,
        sender_id: Uuid,
    ) {
        let epoch = {
            let mut guard = self.resolutions.lock().await;
            let entry = guard.entry(message_id).or_insert(0);
            *entry += 1;
            *entry
        };

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller
                .run_resolution(message_id, conversation, sender_id, epoch)
                .await;
        });
    }

    /// Two-phase simulated delivery. Phase one settles sending into sent
    /// or failed; phase two promotes sent to delivered when a recipient
    /// looks online. Both phases pass the stale-timer guard first.
    async fn run_resolution(
        self: Arc<Self>,
        message_id: Uuid,
        conversation: Conversation,
        sender_id: Uuid,
        epoch: u64,
    ) {
        tokio::time::sleep(self.config.resolution_delay()).await;
        if !self
            .resolution_still_applies(message_id, epoch, MessageStatus::Sending)
            .await
        {
            return;
        }

        let recipients = conversation.recipients_of(sender_id);
        let mut any_blocked = false;
        for &recipient_id in &recipients {
            if self.relationships.are_blocked(sender_id, recipient_id).await {
                any_blocked = true;
                break;
            }
        }
        let offline = !self.online.load(Ordering::Relaxed);

        if any_blocked || offline {
            debug!(%message_id, any_blocked, offline, "delivery failed");
            let _ = self
                .store
                .update_message(message_id, MessagePatch::status(MessageStatus::Failed))
                .await;
            self.finish_resolution(message_id, epoch).await;
            return;
        }

        let _ = self
            .store
            .update_message(message_id, MessagePatch::status(MessageStatus::Sent))
            .await;

        let mut any_online = false;
        for &recipient_id in &recipients {
            if self
                .presence
                .is_online(recipient_id, self.config.online_window())
                .await
            {
                any_online = true;
                break;
            }
        }

        if any_online {
            tokio::time::sleep(self.config.delivered_delay()).await;
            if self
                .resolution_still_applies(message_id, epoch, MessageStatus::Sent)
                .await
            {
                let _ = self
                    .store
                    .update_message(message_id, MessagePatch::status(MessageStatus::Delivered))
                    .await;
                debug!(%message_id, "message delivered");
            }
        }
        self.finish_resolution(message_id, epoch).await;
    }

    /// Stale-timer guard: the message must still exist, hold the status
    /// this phase assumed, and belong to the epoch the timer was armed
    /// under. Anything else means a retry or deletion got there first.
    async fn resolution_still_applies(
        &self,
        message_id: Uuid,
        epoch: u64,
        expected: MessageStatus,
    ) -> bool {
        let current_epoch = self.resolutions.lock().await.get(&message_id).copied();
        if current_epoch != Some(epoch) {
            debug!(%message_id, "stale resolution timer ignored");
            return false;
        }
        match self.store.message(message_id).await {
            Ok(Some(message)) if message.status == expected => true,
            _ => {
                debug!(%message_id, "resolution target changed, timer ignored");
                false
            }
        }
    }

    async fn finish_resolution(&self, message_id: Uuid, epoch: u64) {
        let mut guard = self.resolutions.lock().await;
        if guard.get(&message_id) == Some(&epoch) {
            guard.remove(&message_id);
        }
    }

    /// Edit by the original sender within the edit window. The pre-edit
    /// content is appended to the history; a major rewrite (length delta
    /// beyond the threshold, or neither text containing the other)
    /// notifies each recipient out-of-band.
    pub async fn edit(
        &self,
        message_id: Uuid,
        editor_id: Uuid,
        new_content: &str,
    ) -> AppResult<Message> {
        let message = self
            .store
            .message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if message.deleted_for_everyone {
            return Err(AppError::AlreadyDeleted);
        }
        if message.sender_id != editor_id {
            return Err(AppError::Forbidden);
        }
        if Utc::now().signed_duration_since(message.created_at) > self.config.edit_window() {
            return Err(AppError::EditWindowExpired {
                max_edit_minutes: self.config.max_edit_minutes,
            });
        }

        let new_content = new_content.trim();
        if new_content == message.content {
            return Ok(message);
        }

        let now = Utc::now();
        let mut edit_history = message.edit_history.clone();
        edit_history.push(crate::models::EditRecord {
            content: message.content.clone(),
            edited_at: now,
        });

        let updated = self
            .store
            .update_message(
                message_id,
                MessagePatch {
                    content: Some(new_content.to_string()),
                    edited_at: Some(Some(now)),
                    edit_history: Some(edit_history),
                    ..Default::default()
                },
            )
            .await?;

        if is_major_edit(&message.content, new_content, self.config.major_edit_delta) {
            let conversation = self.store.conversation(message.conversation_id).await?;
            if let Some(conversation) = conversation {
                for recipient_id in conversation.recipients_of(message.sender_id) {
                    self.notifications.emit(NotificationEvent::MessageEdited {
                        message_id,
                        conversation_id: message.conversation_id,
                        editor_id,
                        recipient_id,
                        edited_at: now,
                    });
                }
            }
        }

        Ok(updated)
    }

    /// Hide the message from one user's view. Idempotent; everyone else
    /// still sees it.
    pub async fn delete_for_me(&self, message_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let message = self
            .store
            .message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if message.deleted_for.contains(&user_id) {
            return Ok(());
        }

        let mut deleted_for = message.deleted_for.clone();
        deleted_for.insert(user_id);
        self.store
            .update_message(
                message_id,
                MessagePatch {
                    deleted_for: Some(deleted_for),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Tombstone the message for all participants: sender only, within
    /// the delete window. Clears content and attachments; terminal.
    pub async fn delete_for_everyone(&self, message_id: Uuid, requester_id: Uuid) -> AppResult<()> {
        let message = self
            .store
            .message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if message.deleted_for_everyone {
            return Err(AppError::AlreadyDeleted);
        }
        if message.sender_id != requester_id {
            return Err(AppError::Forbidden);
        }
        if Utc::now().signed_duration_since(message.created_at) > self.config.delete_window() {
            return Err(AppError::DeleteWindowExpired {
                created_at: message.created_at,
                max_delete_minutes: self.config.max_delete_minutes,
            });
        }

        self.store
            .update_message(
                message_id,
                MessagePatch {
                    content: Some(String::new()),
                    attachments: Some(Vec::new()),
                    deleted_for_everyone: Some(true),
                    deleted_by: Some(Some(requester_id)),
                    deleted_at: Some(Some(Utc::now())),
                    ..Default::default()
                },
            )
            .await?;
        info!(%message_id, "message deleted for everyone");
        Ok(())
    }

    /// Physically remove a failed message. The only hard delete in the
    /// lifecycle.
    pub async fn delete_failed(&self, message_id: Uuid) -> AppResult<()> {
        let message = self
            .store
            .message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if message.status != MessageStatus::Failed {
            return Err(AppError::BadRequest(
                "only failed messages can be discarded".into(),
            ));
        }

        self.store.delete_message(message_id).await?;
        self.resolutions.lock().await.remove(&message_id);
        Ok(())
    }

    /// Flip the user's membership in one emoji's reaction set; empty
    /// sets disappear.
    pub async fn toggle_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> AppResult<Message> {
        let message = self
            .store
            .message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if message.deleted_for_everyone {
            return Err(AppError::AlreadyDeleted);
        }

        let mut reactions = message.reactions.clone();
        let users = reactions.entry(emoji.to_string()).or_default();
        if !users.insert(user_id) {
            users.remove(&user_id);
        }
        reactions.retain(|_, users| !users.is_empty());

        self.store
            .update_message(
                message_id,
                MessagePatch {
                    reactions: Some(reactions),
                    ..Default::default()
                },
            )
            .await
    }
}

/// An edit is major when the length delta exceeds the threshold or
/// neither string contains the other.
fn is_major_edit(old: &str, new: &str, delta_threshold: usize) -> bool {
    let delta = old.len().abs_diff(new.len());
    delta > delta_threshold || (!old.contains(new) && !new.contains(old))
}
