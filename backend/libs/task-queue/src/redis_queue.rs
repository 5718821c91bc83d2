//! Redis implementation of the producer and broker traits

use crate::broker::{Delivery, TaskBroker, TaskProducer};
use crate::envelope::TaskEnvelope;
use crate::error::QueueResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use redis_utils::{checkout, RedisPool, SharedConnectionManager};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// Upper bound on envelopes kept in the archive list
const ARCHIVE_MAX_LEN: isize = 10_000;

/// Scheduled envelopes promoted per forwarder pass
const FORWARD_BATCH: usize = 100;

const FORWARD_DUE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for _, msg in ipairs(due) do
  redis.call('LPUSH', KEYS[2], msg)
  redis.call('ZREM', KEYS[1], msg)
end
return #due
"#;

const RECOVER_ACTIVE_SCRIPT: &str = r#"
local n = 0
while true do
  local msg = redis.call('RPOP', KEYS[1])
  if not msg then break end
  redis.call('RPUSH', KEYS[2], msg)
  n = n + 1
end
return n
"#;

/// Key layout of one named queue.
/// Format: taskq:{queue}:{pending|active|scheduled|archived}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    pub pending: String,
    pub active: String,
    pub scheduled: String,
    pub archived: String,
}

impl QueueKeys {
    pub fn new(queue: &str) -> Self {
        Self {
            pending: format!("taskq:{queue}:pending"),
            active: format!("taskq:{queue}:active"),
            scheduled: format!("taskq:{queue}:scheduled"),
            archived: format!("taskq:{queue}:archived"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ArchivedTask {
    /// Stored form of the envelope; may not parse if it arrived corrupted
    raw: String,
    error: String,
    archived_at: DateTime<Utc>,
}

/// Queue stored in Redis lists and a retry ZSET.
///
/// Non-blocking commands share one connection manager; each worker unit gets
/// its own multiplexed connection for `BLMOVE` so an idle unit never holds up
/// the others.
pub struct RedisTaskQueue {
    queue: String,
    keys: QueueKeys,
    client: Client,
    conn: SharedConnectionManager,
    consumer_conns: DashMap<usize, MultiplexedConnection>,
}

impl RedisTaskQueue {
    pub fn new(pool: &RedisPool, queue: impl Into<String>) -> Self {
        let queue = queue.into();
        Self {
            keys: QueueKeys::new(&queue),
            queue,
            client: pool.client(),
            conn: pool.manager(),
            consumer_conns: DashMap::new(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    /// Number of tasks waiting to be picked up
    pub async fn pending_len(&self) -> QueueResult<usize> {
        let mut conn = checkout(&self.conn).await;
        Ok(conn.llen(&self.keys.pending).await?)
    }

    async fn consumer_conn(&self, consumer: usize) -> QueueResult<MultiplexedConnection> {
        if let Some(conn) = self.consumer_conns.get(&consumer) {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        self.consumer_conns.insert(consumer, conn.clone());
        Ok(conn)
    }

    async fn archive_raw(&self, raw: &str, error: &str) -> QueueResult<()> {
        let entry = serde_json::to_string(&ArchivedTask {
            raw: raw.to_string(),
            error: error.to_string(),
            archived_at: Utc::now(),
        })?;

        let mut conn = checkout(&self.conn).await;
        redis::pipe()
            .atomic()
            .lrem(&self.keys.active, 1, raw)
            .ignore()
            .lpush(&self.keys.archived, entry)
            .ignore()
            .ltrim(&self.keys.archived, 0, ARCHIVE_MAX_LEN - 1)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TaskProducer for RedisTaskQueue {
    async fn enqueue(&self, envelope: TaskEnvelope) -> QueueResult<()> {
        let raw = envelope.to_json()?;
        let mut conn = checkout(&self.conn).await;
        conn.lpush::<_, _, ()>(&self.keys.pending, raw).await?;

        debug!(
            queue = %self.queue,
            task_id = %envelope.id,
            kind = %envelope.kind,
            "Task enqueued"
        );
        Ok(())
    }
}

#[async_trait]
impl TaskBroker for RedisTaskQueue {
    async fn dequeue(&self, consumer: usize, wait: Duration) -> QueueResult<Option<Delivery>> {
        let mut conn = self.consumer_conn(consumer).await?;

        let raw: Option<String> = match redis::cmd("BLMOVE")
            .arg(&self.keys.pending)
            .arg(&self.keys.active)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(wait.as_secs_f64())
            .query_async(&mut conn)
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                // Drop the connection so the next call reconnects
                self.consumer_conns.remove(&consumer);
                return Err(err.into());
            }
        };

        let Some(raw) = raw else {
            return Ok(None);
        };

        match TaskEnvelope::from_json(&raw) {
            Ok(envelope) => Ok(Some(Delivery::new(envelope, raw))),
            Err(err) => {
                error!(
                    queue = %self.queue,
                    error = %err,
                    "Discarding undecodable envelope to archive"
                );
                self.archive_raw(&raw, &format!("undecodable envelope: {err}"))
                    .await?;
                Ok(None)
            }
        }
    }

    async fn complete(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut conn = checkout(&self.conn).await;
        conn.lrem::<_, _, ()>(&self.keys.active, 1, delivery.raw())
            .await?;
        Ok(())
    }

    async fn schedule_retry(&self, delivery: &Delivery, delay: Duration) -> QueueResult<()> {
        let next = delivery.envelope.next_attempt().to_json()?;
        let ready_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;

        let mut conn = checkout(&self.conn).await;
        redis::pipe()
            .atomic()
            .lrem(&self.keys.active, 1, delivery.raw())
            .ignore()
            .zadd(&self.keys.scheduled, next, ready_at)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn archive(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        self.archive_raw(delivery.raw(), error).await
    }

    async fn forward_due(&self) -> QueueResult<usize> {
        let now = Utc::now().timestamp_millis();
        let mut conn = checkout(&self.conn).await;
        let moved: usize = Script::new(FORWARD_DUE_SCRIPT)
            .key(&self.keys.scheduled)
            .key(&self.keys.pending)
            .arg(now)
            .arg(FORWARD_BATCH)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved)
    }

    async fn recover_in_flight(&self) -> QueueResult<usize> {
        let mut conn = checkout(&self.conn).await;
        let recovered: usize = Script::new(RECOVER_ACTIVE_SCRIPT)
            .key(&self.keys.active)
            .key(&self.keys.pending)
            .invoke_async(&mut conn)
            .await?;

        if recovered > 0 {
            info!(
                queue = %self.queue,
                recovered,
                "Returned in-flight tasks from a previous worker to pending"
            );
        }
        Ok(recovered)
    }
}
