/// Error types for the image resizer
///
/// `ResizeError` and `CacheError` belong to the pipeline; `AppError` is the
/// HTTP boundary and decides status codes and response bodies.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, ResizeError>;

/// Failures of the resize pipeline and the async submission path.
///
/// Cloneable so a single in-flight result can be handed to every coalesced
/// caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResizeError {
    /// Request rejected before any cache or network access
    #[error("{0}")]
    Validation(String),

    /// Origin unreachable, bad status, non-image body or undecodable bytes
    #[error("{0}")]
    Fetch(String),

    /// Resize or encode failed
    #[error("{0}")]
    Transform(String),

    /// Async submission requested but no queue producer is attached
    #[error("queue client not configured")]
    QueueNotConfigured,

    /// The queue backend refused the task
    #[error("{0}")]
    QueueSubmit(String),
}

impl ResizeError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ResizeError::Validation(_))
    }
}

/// Failures against the cache backend. Logged and absorbed by the service.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// HTTP-facing error. Bodies are plain text.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing params: url, width, height")]
    MissingParams,

    /// Name of the offending query parameter
    #[error("Invalid {0} parameter")]
    InvalidParam(&'static str),

    #[error("Error resizing the image: {0}")]
    Resize(ResizeError),

    #[error("Async processing not configured")]
    AsyncUnavailable,

    #[error("Failed to enqueue task: {0}")]
    Enqueue(ResizeError),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingParams | AppError::InvalidParam(_) => StatusCode::BAD_REQUEST,
            AppError::Resize(err) if err.is_validation() => StatusCode::BAD_REQUEST,
            AppError::Resize(_) | AppError::Enqueue(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::AsyncUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(self.to_string())
    }
}

impl From<ResizeError> for AppError {
    fn from(err: ResizeError) -> Self {
        match err {
            ResizeError::QueueNotConfigured => AppError::AsyncUnavailable,
            ResizeError::QueueSubmit(_) => AppError::Enqueue(err),
            other => AppError::Resize(other),
        }
    }
}
