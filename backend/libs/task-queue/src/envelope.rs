//! Wire format of queued tasks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Submission-time options, fixed for the life of the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Redeliveries allowed after the first failed attempt
    pub max_retry: u32,
    /// Execution budget for one attempt
    pub timeout: Duration,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            max_retry: 3,
            timeout: Duration::from_secs(60),
        }
    }
}

/// A task as stored in the queue.
///
/// `payload` is kept as an opaque string: the broker never interprets it, so a
/// malformed body is only discovered by the handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub id: Uuid,
    pub kind: String,
    pub payload: String,
    /// Failed attempts so far
    #[serde(default)]
    pub retried: u32,
    pub max_retry: u32,
    pub timeout_secs: u64,
    pub enqueued_at: DateTime<Utc>,
}

impl TaskEnvelope {
    pub fn new(kind: impl Into<String>, payload: impl Into<String>, options: &EnqueueOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            payload: payload.into(),
            retried: 0,
            max_retry: options.max_retry,
            timeout_secs: options.timeout.as_secs().max(1),
            enqueued_at: Utc::now(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Copy of this envelope recording one more failed attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            retried: self.retried + 1,
            ..self.clone()
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
