use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Coarse classification used by callers to decide how an error surfaces:
/// validation errors are rejected before any persistence, transient
/// failures are user-recoverable, rate limits are all-or-nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Transient,
    RateLimit,
    Permanent,
}

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("add a message or include an attachment before sending")]
    EmptyComposition,

    #[error("attachments are still uploading")]
    AttachmentsNotReady,

    #[error("you can attach up to {max} items")]
    AttachmentLimitExceeded { max: usize },

    #[error("edit window expired (max_edit_minutes: {max_edit_minutes})")]
    EditWindowExpired { max_edit_minutes: i64 },

    #[error("delete window expired (created_at: {created_at}, max_delete_minutes: {max_delete_minutes})")]
    DeleteWindowExpired {
        created_at: chrono::DateTime<chrono::Utc>,
        max_delete_minutes: i64,
    },

    #[error("message already deleted for everyone")]
    AlreadyDeleted,

    #[error("retry is only valid on a failed message (status: {status})")]
    RetryNotAllowed { status: String },

    #[error("forward limit reached for this message ({limit}): {current} already sent, {requested} requested")]
    ForwardLimitExceeded {
        limit: u32,
        current: u32,
        requested: usize,
    },

    #[error("internal error")]
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::BadRequest(_)
            | AppError::EmptyComposition
            | AppError::AttachmentsNotReady
            | AppError::AttachmentLimitExceeded { .. } => ErrorKind::Validation,
            AppError::Storage(_) | AppError::Internal => ErrorKind::Transient,
            AppError::ForwardLimitExceeded { .. } => ErrorKind::RateLimit,
            _ => ErrorKind::Permanent,
        }
    }

    /// Whether retrying the same operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
