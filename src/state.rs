use crate::bus::MemoryBus;
use crate::config::Config;
use crate::services::attachment_service::{AttachmentIngestPipeline, MediaProbe, NullProbe};
use crate::services::forward_service::ForwardDispatcher;
use crate::services::message_service::MessageLifecycleController;
use crate::services::notification_producer::{NotificationEvent, NotificationProducer};
use crate::services::presence::MemoryPresence;
use crate::services::receipt_service::ReadReceiptAggregator;
use crate::services::relationship_service::MemoryRelationships;
use crate::services::typing_service::TypingIndicatorBus;
use crate::store::MemoryStore;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

/// Single-process assembly of the messaging core over the in-memory
/// store, bus, presence and relationship implementations. Sessions built
/// from the same `AppState` share one store and one bus, which is exactly
/// the multi-tab topology the typing protocol and change feed assume.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<MemoryStore>,
    pub bus: Arc<MemoryBus>,
    pub presence: Arc<MemoryPresence>,
    pub relationships: Arc<MemoryRelationships>,
    pub messages: Arc<MessageLifecycleController>,
    pub receipts: Arc<ReadReceiptAggregator>,
    pub forwards: Arc<ForwardDispatcher>,
}

impl AppState {
    pub fn in_memory(config: Config) -> (Self, UnboundedReceiver<NotificationEvent>) {
        let config = Arc::new(config);
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MemoryBus::new());
        let presence = Arc::new(MemoryPresence::new());
        let relationships = Arc::new(MemoryRelationships::new());
        let (notifications, notification_rx) = NotificationProducer::new();

        let messages = Arc::new(MessageLifecycleController::new(
            store.clone(),
            bus.clone(),
            presence.clone(),
            relationships.clone(),
            notifications,
            config.clone(),
        ));
        let receipts = Arc::new(ReadReceiptAggregator::new(store.clone(), bus.clone()));
        let forwards = Arc::new(ForwardDispatcher::new(
            store.clone(),
            messages.clone(),
            bus.clone(),
            config.clone(),
        ));

        (
            Self {
                config,
                store,
                bus,
                presence,
                relationships,
                messages,
                receipts,
                forwards,
            },
            notification_rx,
        )
    }

    /// A composer-scoped attachment pipeline with the default probe.
    pub fn attachment_pipeline(&self) -> AttachmentIngestPipeline {
        self.attachment_pipeline_with_probe(Arc::new(NullProbe))
    }

    pub fn attachment_pipeline_with_probe(
        &self,
        probe: Arc<dyn MediaProbe>,
    ) -> AttachmentIngestPipeline {
        AttachmentIngestPipeline::new(self.config.clone(), probe)
    }

    /// A session-scoped typing bus for the given local user, attached to
    /// the shared bus.
    pub async fn typing_bus(&self, local_user: Uuid) -> TypingIndicatorBus {
        TypingIndicatorBus::new(local_user, self.bus.clone(), self.config.clone()).await
    }
}
