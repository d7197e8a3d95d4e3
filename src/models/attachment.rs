use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttachmentKind {
    Image,
    Video,
    Document,
    Link,
    Location,
    LiveLocation,
    Contact,
}

/// Attachment as persisted on a message. The payload is an opaque
/// reference string (data URL for inlined images, object handle
/// otherwise), matching the store's string-valued columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageAttachment {
    pub id: Uuid,
    pub kind: AttachmentKind,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub caption: Option<String>,
}

impl MessageAttachment {
    /// Shallow clone under a fresh id, for forwarding.
    pub fn with_fresh_id(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Idle,
    Uploading,
    Ready,
    Error,
}

/// A staged attachment in the composer: validated (and for images,
/// compressed) but not yet part of a message. The payload bytes live here
/// until send or cancel; the cancel handle for a staged upload lives in
/// the pipeline's task registry, keyed by `id`.
#[derive(Debug, Clone)]
pub struct PendingAttachment {
    pub id: Uuid,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub kind: AttachmentKind,
    pub data: Bytes,
    pub status: PendingStatus,
    pub progress: u8,
    pub error: Option<String>,
    pub staged_at: DateTime<Utc>,
}

impl PendingAttachment {
    pub fn is_uploading(&self) -> bool {
        self.status == PendingStatus::Uploading
    }

    pub fn is_ready(&self) -> bool {
        self.status == PendingStatus::Ready
    }
}
