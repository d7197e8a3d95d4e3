use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Per-user last-seen timestamps. "Online" is a heartbeat heuristic
/// (last seen within the configured window), not a delivery
/// acknowledgment; a production backend substitutes real acks here.
#[async_trait]
pub trait PresenceSource: Send + Sync {
    async fn last_seen(&self, user_id: Uuid) -> Option<DateTime<Utc>>;

    async fn is_online(&self, user_id: Uuid, window: chrono::Duration) -> bool {
        match self.last_seen(user_id).await {
            Some(seen) => Utc::now().signed_duration_since(seen) < window,
            None => false,
        }
    }
}

#[derive(Default, Clone)]
pub struct MemoryPresence {
    last_seen: Arc<RwLock<HashMap<Uuid, DateTime<Utc>>>>,
}

impl MemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn touch(&self, user_id: Uuid) {
        self.record(user_id, Utc::now()).await;
    }

    pub async fn record(&self, user_id: Uuid, seen_at: DateTime<Utc>) {
        self.last_seen.write().await.insert(user_id, seen_at);
    }
}

#[async_trait]
impl PresenceSource for MemoryPresence {
    async fn last_seen(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.last_seen.read().await.get(&user_id).copied()
    }
}
