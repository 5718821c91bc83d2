//! Worker pool that drains a queue through registered handlers
//!
//! Processing guarantees:
//! - **At-least-once**: a task may run more than once if a worker dies mid-task
//! - **Bounded retries**: a failing task is redelivered up to its retry budget,
//!   with exponential backoff between attempts, then archived; a rejected task
//!   is archived without retry
//! - **Per-task timeout**: every attempt runs under a deadline; elapsing counts
//!   as a failure
//! - **Cooperative shutdown**: once signalled, units stop dequeueing, finish the
//!   task in hand and exit

use crate::broker::{Delivery, TaskBroker};
use crate::envelope::TaskEnvelope;
use crate::error::TaskError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Executes one kind of task.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, envelope: &TaskEnvelope) -> Result<(), TaskError>;
}

/// Worker pool configuration. Supplied once; fixed for the pool's lifetime.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of tasks executed concurrently
    pub concurrency: usize,
    /// Queue the pool consumes
    pub queue_name: String,
    /// Upper bound on redeliveries, applied on top of each envelope's own budget
    pub max_retry: u32,
    /// Upper bound on a single attempt, applied on top of each envelope's own timeout
    pub task_timeout: Duration,
    /// How long one dequeue call blocks; also bounds shutdown latency
    pub poll_interval: Duration,
    /// How often scheduled retries are promoted to pending
    pub forward_interval: Duration,
    /// Delay before the first retry; doubles on each further attempt
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            queue_name: "images".to_string(),
            max_retry: 3,
            task_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            forward_interval: Duration::from_secs(1),
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl WorkerConfig {
    /// Replace unset or non-positive values with the defaults.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.concurrency == 0 {
            self.concurrency = defaults.concurrency;
        }
        if self.queue_name.is_empty() {
            self.queue_name = defaults.queue_name;
        }
        if self.max_retry == 0 {
            self.max_retry = defaults.max_retry;
        }
        if self.task_timeout.is_zero() {
            self.task_timeout = defaults.task_timeout;
        }
        if self.poll_interval.is_zero() {
            self.poll_interval = defaults.poll_interval;
        }
        if self.forward_interval.is_zero() {
            self.forward_interval = defaults.forward_interval;
        }
        self
    }

    /// Delay before redelivering a task that has failed `retried` times.
    ///
    /// Strategy: base * 2^retried, capped at `max_backoff`
    pub fn backoff(&self, retried: u32) -> Duration {
        let factor = 2u32.saturating_pow(retried.min(31));
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Fixed-size pool of executors pulling from one queue.
pub struct Worker {
    config: WorkerConfig,
    broker: Arc<dyn TaskBroker>,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl Worker {
    pub fn new(config: WorkerConfig, broker: Arc<dyn TaskBroker>) -> Self {
        Self {
            config: config.normalized(),
            broker,
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for a task kind.
    pub fn handle(mut self, kind: impl Into<String>, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(kind.into(), handler);
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped), then
    /// wait for in-flight tasks to finish.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> crate::QueueResult<()> {
        info!(
            queue = %self.config.queue_name,
            concurrency = self.config.concurrency,
            max_retry = self.config.max_retry,
            task_timeout_secs = self.config.task_timeout.as_secs(),
            "Starting worker"
        );

        self.broker.recover_in_flight().await?;

        let worker = Arc::new(self);
        let mut units = JoinSet::new();

        for unit in 0..worker.config.concurrency {
            let worker = worker.clone();
            let shutdown = shutdown.clone();
            units.spawn(async move { worker.unit_loop(unit, shutdown).await });
        }

        {
            let worker = worker.clone();
            let shutdown = shutdown.clone();
            units.spawn(async move { worker.forward_loop(shutdown).await });
        }

        while let Some(joined) = units.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker unit terminated abnormally");
            }
        }

        info!(queue = %worker.config.queue_name, "Worker stopped");
        Ok(())
    }

    async fn unit_loop(&self, unit: usize, shutdown: watch::Receiver<bool>) {
        debug!(unit, "Worker unit started");

        while !shutdown_requested(&shutdown) {
            match self.broker.dequeue(unit, self.config.poll_interval).await {
                Ok(Some(delivery)) => self.process(delivery).await,
                Ok(None) => {}
                Err(e) => {
                    error!(unit, error = %e, "Dequeue failed");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }

        debug!(unit, "Worker unit stopped");
    }

    async fn forward_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.forward_interval);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    match self.broker.forward_due().await {
                        Ok(0) => {}
                        Ok(moved) => debug!(moved, "Promoted scheduled retries"),
                        Err(e) => warn!(error = %e, "Failed to promote scheduled retries"),
                    }
                }
            }
        }
    }

    async fn process(&self, delivery: Delivery) {
        let envelope = &delivery.envelope;
        let timeout = envelope.timeout().min(self.config.task_timeout);

        let outcome = match self.handlers.get(&envelope.kind) {
            Some(handler) => {
                match tokio::time::timeout(timeout, handler.handle(envelope)).await {
                    Ok(result) => result,
                    Err(_) => Err(TaskError::TimedOut(timeout)),
                }
            }
            None => Err(TaskError::UnknownKind(envelope.kind.clone())),
        };

        match outcome {
            Ok(()) => {
                debug!(task_id = %envelope.id, kind = %envelope.kind, "Task completed");
                if let Err(e) = self.broker.complete(&delivery).await {
                    error!(task_id = %envelope.id, error = %e, "Failed to acknowledge task");
                }
            }
            Err(task_error) => self.fail(&delivery, task_error).await,
        }
    }

    async fn fail(&self, delivery: &Delivery, task_error: TaskError) {
        let envelope = &delivery.envelope;
        let max_retry = envelope.max_retry.min(self.config.max_retry);

        if task_error.is_retryable() && envelope.retried < max_retry {
            let delay = self.config.backoff(envelope.retried);
            warn!(
                task_id = %envelope.id,
                kind = %envelope.kind,
                attempt = envelope.retried + 1,
                max_retry,
                retry_in_ms = delay.as_millis() as u64,
                error = %task_error,
                "Task failed, scheduling retry"
            );
            if let Err(e) = self.broker.schedule_retry(delivery, delay).await {
                error!(task_id = %envelope.id, error = %e, "Failed to schedule retry");
            }
        } else {
            error!(
                task_id = %envelope.id,
                kind = %envelope.kind,
                retried = envelope.retried,
                error = %task_error,
                "Task failed permanently, archiving"
            );
            if let Err(e) = self
                .broker
                .archive(delivery, &task_error.to_string())
                .await
            {
                error!(task_id = %envelope.id, error = %e, "Failed to archive task");
            }
        }
    }
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}
