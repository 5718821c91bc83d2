//! In-process queue for tests and single-binary setups

use crate::broker::{Delivery, TaskBroker, TaskProducer};
use crate::envelope::TaskEnvelope;
use crate::error::{QueueError, QueueResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Default)]
struct State {
    pending: VecDeque<TaskEnvelope>,
    active: HashMap<Uuid, TaskEnvelope>,
    scheduled: Vec<(Instant, TaskEnvelope)>,
    archived: Vec<(TaskEnvelope, String)>,
    completed: Vec<TaskEnvelope>,
    closed: bool,
}

/// Queue held in memory with the same state transitions as the Redis backend.
#[derive(Default)]
pub struct InMemoryTaskQueue {
    state: Mutex<State>,
    notify: Notify,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject further enqueues, as a backend outage would.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    pub fn pending(&self) -> Vec<TaskEnvelope> {
        self.state.lock().pending.iter().cloned().collect()
    }

    pub fn in_flight_len(&self) -> usize {
        self.state.lock().active.len()
    }

    pub fn scheduled_len(&self) -> usize {
        self.state.lock().scheduled.len()
    }

    pub fn archived(&self) -> Vec<(TaskEnvelope, String)> {
        self.state.lock().archived.clone()
    }

    pub fn completed(&self) -> Vec<TaskEnvelope> {
        self.state.lock().completed.clone()
    }
}

#[async_trait]
impl TaskProducer for InMemoryTaskQueue {
    async fn enqueue(&self, envelope: TaskEnvelope) -> QueueResult<()> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            state.pending.push_back(envelope);
        }
        self.notify.notify_one();
        Ok(())
    }
}

#[async_trait]
impl TaskBroker for InMemoryTaskQueue {
    async fn dequeue(&self, _consumer: usize, wait: Duration) -> QueueResult<Option<Delivery>> {
        let deadline = Instant::now() + wait;
        loop {
            // Register interest before checking so a concurrent enqueue is not missed
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if let Some(envelope) = state.pending.pop_front() {
                    state.active.insert(envelope.id, envelope.clone());
                    let raw = envelope.to_json()?;
                    return Ok(Some(Delivery::new(envelope, raw)));
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn complete(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut state = self.state.lock();
        if let Some(envelope) = state.active.remove(&delivery.envelope.id) {
            state.completed.push(envelope);
        }
        Ok(())
    }

    async fn schedule_retry(&self, delivery: &Delivery, delay: Duration) -> QueueResult<()> {
        let mut state = self.state.lock();
        state.active.remove(&delivery.envelope.id);
        state
            .scheduled
            .push((Instant::now() + delay, delivery.envelope.next_attempt()));
        Ok(())
    }

    async fn archive(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut state = self.state.lock();
        state.active.remove(&delivery.envelope.id);
        state
            .archived
            .push((delivery.envelope.clone(), error.to_string()));
        Ok(())
    }

    async fn forward_due(&self) -> QueueResult<usize> {
        let moved = {
            let mut state = self.state.lock();
            let now = Instant::now();
            let (due, waiting): (Vec<_>, Vec<_>) = state
                .scheduled
                .drain(..)
                .partition(|(ready_at, _)| *ready_at <= now);
            state.scheduled = waiting;
            let moved = due.len();
            state.pending.extend(due.into_iter().map(|(_, envelope)| envelope));
            moved
        };
        for _ in 0..moved {
            self.notify.notify_one();
        }
        Ok(moved)
    }

    async fn recover_in_flight(&self) -> QueueResult<usize> {
        let recovered = {
            let mut state = self.state.lock();
            let active: Vec<_> = state.active.drain().map(|(_, envelope)| envelope).collect();
            let recovered = active.len();
            state.pending.extend(active);
            recovered
        };
        for _ in 0..recovered {
            self.notify.notify_one();
        }
        Ok(recovered)
    }
}
