pub mod attachment;
pub mod conversation;
pub mod message;

pub use attachment::{AttachmentKind, MessageAttachment, PendingAttachment, PendingStatus};
pub use conversation::Conversation;
pub use message::{EditRecord, Message, MessageStatus};
