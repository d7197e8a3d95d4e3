use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Block relationships between users. Blocking is symmetric for delivery
/// purposes: a message fails if either side blocked the other.
#[async_trait]
pub trait RelationshipProvider: Send + Sync {
    async fn are_blocked(&self, a: Uuid, b: Uuid) -> bool;
}

#[derive(Default, Clone)]
pub struct MemoryRelationships {
    // (blocker, blocked) pairs
    blocks: Arc<RwLock<HashSet<(Uuid, Uuid)>>>,
}

impl MemoryRelationships {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn block(&self, blocker: Uuid, blocked: Uuid) {
        self.blocks.write().await.insert((blocker, blocked));
    }

    pub async fn unblock(&self, blocker: Uuid, blocked: Uuid) {
        self.blocks.write().await.remove(&(blocker, blocked));
    }
}

#[async_trait]
impl RelationshipProvider for MemoryRelationships {
    async fn are_blocked(&self, a: Uuid, b: Uuid) -> bool {
        let guard = self.blocks.read().await;
        guard.contains(&(a, b)) || guard.contains(&(b, a))
    }
}
