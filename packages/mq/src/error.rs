use thiserror::Error;

#[derive(Debug, Error)]
pub enum MqError {
    /// The client was closed; no further messages will be fetched.
    #[error("queue client is closed")]
    Closed,

    /// The caller stopped waiting for a message.
    #[error("fetch cancelled")]
    Cancelled,

    #[error("unknown message offset: {0}")]
    UnknownOffset(String),

    #[error("payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl From<broccoli_queue::error::BroccoliError> for MqError {
    fn from(e: broccoli_queue::error::BroccoliError) -> Self {
        MqError::Internal(e.to_string())
    }
}

impl From<redis::RedisError> for MqError {
    fn from(e: redis::RedisError) -> Self {
        MqError::Internal(e.to_string())
    }
}
