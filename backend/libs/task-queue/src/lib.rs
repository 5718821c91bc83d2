//! # Task Queue
//!
//! Durable job queue backed by Redis lists, with a fixed-size worker pool that
//! retries failed tasks with exponential backoff.
//!
//! ## Architecture
//!
//! ```text
//! Producer ──LPUSH──▶ pending ──BLMOVE──▶ active ──▶ TaskHandler
//!                        ▲                   │
//!                        │ forwarder         ├── ok ──────▶ (removed)
//!                        │                   ├── retry ───▶ scheduled (ZSET, ready-at)
//!                    scheduled ◀─────────────┘
//!                                            └── exhausted ▶ archived
//! ```
//!
//! Delivery is at-least-once: a worker that dies mid-task leaves the envelope
//! in `active`, and the next worker to start pushes it back to `pending`.
//!
//! ## Usage
//!
//! ```ignore
//! use task_queue::{EnqueueOptions, RedisTaskQueue, TaskEnvelope, TaskProducer, Worker, WorkerConfig};
//!
//! let queue = Arc::new(RedisTaskQueue::new(&pool, "images"));
//! queue
//!     .enqueue(TaskEnvelope::new("resize_image", payload, &EnqueueOptions::default()))
//!     .await?;
//!
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! Worker::new(WorkerConfig::default(), queue)
//!     .handle("resize_image", Arc::new(MyHandler))
//!     .run(shutdown_rx)
//!     .await?;
//! ```

pub mod broker;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod redis_queue;
pub mod worker;

pub use broker::{Delivery, TaskBroker, TaskProducer};
pub use envelope::{EnqueueOptions, TaskEnvelope};
pub use error::{QueueError, QueueResult, TaskError};
pub use memory::InMemoryTaskQueue;
pub use redis_queue::{QueueKeys, RedisTaskQueue};
pub use worker::{TaskHandler, Worker, WorkerConfig};
