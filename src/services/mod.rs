pub mod attachment_service;
pub mod forward_service;
pub mod message_service;
pub mod notification_producer;
pub mod presence;
pub mod receipt_service;
pub mod relationship_service;
pub mod typing_service;

pub use attachment_service::{
    AttachmentIngestPipeline, IngestRejection, IngestReport, MediaProbe, NullProbe, StagedFile,
};
pub use forward_service::{ForwardDispatcher, ForwardTarget};
pub use message_service::MessageLifecycleController;
pub use notification_producer::{NotificationEvent, NotificationProducer};
pub use presence::{MemoryPresence, PresenceSource};
pub use receipt_service::{read_receipt_details, ReadReceiptAggregator, ReadReceiptDetails};
pub use relationship_service::{MemoryRelationships, RelationshipProvider};
pub use typing_service::TypingIndicatorBus;
