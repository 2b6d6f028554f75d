use thiserror::Error;

/// Errors from publishing events.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PublishError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PublishError::Broker(_) | PublishError::Io(_))
    }
}

pub type PublishResult<T> = Result<T, PublishError>;
