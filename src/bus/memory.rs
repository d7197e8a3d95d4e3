use crate::bus::MessageBus;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;

/// In-process bus: per-topic lists of channel senders. Closed receivers
/// are pruned on the next publish to their topic.
#[derive(Default, Clone)]
pub struct MemoryBus {
    topics: Arc<RwLock<HashMap<String, Vec<UnboundedSender<String>>>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, payload: String) {
        let mut guard = self.topics.write().await;
        if let Some(subscribers) = guard.get_mut(topic) {
            subscribers.retain(|sender| sender.send(payload.clone()).is_ok());
        }
    }

    async fn subscribe(&self, topic: &str) -> UnboundedReceiver<String> {
        let (tx, rx) = unbounded_channel();
        let mut guard = self.topics.write().await;
        guard.entry(topic.to_string()).or_default().push(tx);
        rx
    }
}
