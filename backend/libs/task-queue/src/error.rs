//! Error types for the task queue

use thiserror::Error;

/// Result type for broker and producer operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Failures talking to the queue backend
#[derive(Error, Debug)]
pub enum QueueError {
    /// Redis command or connection failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Envelope could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The queue no longer accepts work
    #[error("Queue closed")]
    Closed,
}

/// Outcome of a single task execution that did not succeed.
///
/// `Rejected` is archived on the first attempt; every other variant goes
/// through the retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Payload could not be decoded into the handler's task type
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// No handler registered for the envelope's kind
    #[error("no handler registered for task kind {0}")]
    UnknownKind(String),

    /// Handler ran and reported failure
    #[error("{0}")]
    Failed(String),

    /// Handler did not finish within the task timeout
    #[error("task timed out after {0:?}")]
    TimedOut(std::time::Duration),

    /// Task can never succeed as submitted
    #[error("rejected: {0}")]
    Rejected(String),
}

impl TaskError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TaskError::Rejected(_))
    }
}
