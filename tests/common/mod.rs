#![allow(dead_code)]

use bytes::Bytes;
use chrono::Utc;
use messaging_core::config::Config;
use messaging_core::models::{
    AttachmentKind, Conversation, MessageStatus, PendingAttachment, PendingStatus,
};
use messaging_core::services::notification_producer::NotificationEvent;
use messaging_core::state::AppState;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

// Brought into every test file via `use common::*` so store trait
// methods resolve there.
pub use messaging_core::store::ConversationStore;

pub struct TestEnv {
    pub state: AppState,
    pub notifications: UnboundedReceiver<NotificationEvent>,
    pub alice: Uuid,
    pub bob: Uuid,
    pub carol: Uuid,
}

pub async fn setup() -> TestEnv {
    let (state, notifications) = AppState::in_memory(Config::from_env());
    TestEnv {
        state,
        notifications,
        alice: Uuid::new_v4(),
        bob: Uuid::new_v4(),
        carol: Uuid::new_v4(),
    }
}

pub async fn direct_conversation(env: &TestEnv, a: Uuid, b: Uuid) -> Conversation {
    env.state
        .store
        .create_conversation(&[a, b])
        .await
        .expect("create conversation")
}

/// A staged attachment already past validation, as the pipeline would
/// hand it to the composer.
pub fn ready_image_attachment() -> PendingAttachment {
    PendingAttachment {
        id: Uuid::new_v4(),
        name: "photo.jpg".into(),
        size: 4,
        mime_type: "image/jpeg".into(),
        kind: AttachmentKind::Image,
        data: Bytes::from_static(b"jpeg"),
        status: PendingStatus::Ready,
        progress: 100,
        error: None,
        staged_at: Utc::now(),
    }
}

pub fn uploading_attachment() -> PendingAttachment {
    PendingAttachment {
        id: Uuid::new_v4(),
        name: "clip.mp4".into(),
        size: 4,
        mime_type: "video/mp4".into(),
        kind: AttachmentKind::Video,
        data: Bytes::from_static(b"mp4!"),
        status: PendingStatus::Uploading,
        progress: 40,
        error: None,
        staged_at: Utc::now(),
    }
}

pub async fn wait_for_status(env: &TestEnv, message_id: Uuid, status: MessageStatus) {
    for _ in 0..400 {
        if let Some(message) = env.state.store.message(message_id).await.expect("store read") {
            if message.status == status {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("message {message_id} never reached {status:?}");
}

/// Let spawned listeners and timers run for a stretch of (virtual) time.
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
