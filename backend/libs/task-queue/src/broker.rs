//! Producer and consumer capabilities of a queue backend
//!
//! These traits abstract the storage so the worker pool can be exercised
//! against an in-memory queue in tests.

use crate::envelope::TaskEnvelope;
use crate::error::QueueResult;
use async_trait::async_trait;
use std::time::Duration;

/// Submits tasks. Fire-and-forget: no handle or result comes back.
#[async_trait]
pub trait TaskProducer: Send + Sync {
    async fn enqueue(&self, envelope: TaskEnvelope) -> QueueResult<()>;
}

/// A dequeued envelope together with the exact bytes it was stored as.
///
/// Backends locate the in-flight entry by its stored form, so the raw string
/// travels with the envelope until it is acknowledged.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub envelope: TaskEnvelope,
    raw: String,
}

impl Delivery {
    pub fn new(envelope: TaskEnvelope, raw: String) -> Self {
        Self { envelope, raw }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Consumer side of the queue, driven by [`crate::Worker`].
#[async_trait]
pub trait TaskBroker: Send + Sync {
    /// Wait up to `wait` for the next pending task and mark it in flight.
    ///
    /// `consumer` identifies the worker unit so backends can give each unit
    /// its own blocking connection.
    async fn dequeue(&self, consumer: usize, wait: Duration) -> QueueResult<Option<Delivery>>;

    /// Drop a successfully handled task.
    async fn complete(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Take a failed task out of flight and make it pending again after `delay`,
    /// with its attempt counter incremented.
    async fn schedule_retry(&self, delivery: &Delivery, delay: Duration) -> QueueResult<()>;

    /// Give up on a task that exhausted its retries.
    async fn archive(&self, delivery: &Delivery, error: &str) -> QueueResult<()>;

    /// Move scheduled retries whose delay elapsed back to pending.
    async fn forward_due(&self) -> QueueResult<usize>;

    /// Return tasks left in flight by a previous worker to pending.
    async fn recover_in_flight(&self) -> QueueResult<usize>;
}
