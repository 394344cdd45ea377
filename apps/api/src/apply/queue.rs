//! Auto-apply task queue.
//!
//! `TaskQueue` is the seam between the swipe path and the worker pool.
//! The Redis backend keeps each task as a JSON document and moves task ids
//! between four structures:
//!
//! ```text
//! enqueue ──► autoapply:ready (list, LPUSH/RPOP = FIFO) ──claim──► autoapply:processing
//!                ▲      ▲                                          (zset, score=lease expiry)
//!                │      └──────────── lease expired ◄──────────────────┤
//!                │                                                      ├─ ack
//!                └── autoapply:delayed (zset, score=ready_at) ◄─ retry ─┤
//!                                                                       └─ fail ─► autoapply:failed
//! ```
//!
//! Delivery is at-least-once. A claimed task stays in `processing` until the
//! worker acks, retries or fails it; if the worker dies or cannot reach Redis
//! first, the lease runs out and the next claim puts the id back at the head
//! of the ready list. Workers check the stored status before submitting.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::task::{ApplyTask, TaskStatus};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("Task encoding error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Task {0} not found")]
    NotFound(Uuid),
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Creates a pending task and makes it visible to workers.
    async fn enqueue(&self, user_id: Uuid, job_id: Uuid) -> Result<Uuid, QueueError>;

    /// Claims the next ready task under a lease, or `None` when nothing is
    /// ready. A claim that is never settled is redelivered once its lease
    /// expires.
    async fn dequeue(&self) -> Result<Option<ApplyTask>, QueueError>;

    /// Marks the task in progress and counts the attempt.
    async fn begin(&self, task_id: Uuid) -> Result<ApplyTask, QueueError>;

    /// Terminal success. Settles the claim.
    async fn ack(&self, task_id: Uuid) -> Result<(), QueueError>;

    /// Back to pending, visible again after `delay`. Settles the claim.
    async fn retry(&self, task_id: Uuid, delay: Duration, error: &str) -> Result<(), QueueError>;

    /// Terminal failure, recorded for operators. Settles the claim.
    async fn fail(&self, task_id: Uuid, error: &str) -> Result<(), QueueError>;

    /// Drops the claim without touching the task, for redelivered tasks that
    /// are already terminal.
    async fn release(&self, task_id: Uuid) -> Result<(), QueueError>;

    async fn get(&self, task_id: Uuid) -> Result<Option<ApplyTask>, QueueError>;

    /// The most recently enqueued task for a `(user, job)` pair.
    async fn latest_for(&self, user_id: Uuid, job_id: Uuid)
        -> Result<Option<ApplyTask>, QueueError>;

    /// Terminally failed tasks, newest first.
    async fn failed(&self, limit: usize) -> Result<Vec<ApplyTask>, QueueError>;
}

const READY_KEY: &str = "autoapply:ready";
const DELAYED_KEY: &str = "autoapply:delayed";
const PROCESSING_KEY: &str = "autoapply:processing";
const FAILED_KEY: &str = "autoapply:failed";
/// Operators see at most this many failed task ids.
const FAILED_HISTORY: i64 = 1000;

/// One claim, atomically: promote due retries to the back of the ready list,
/// return expired leases to its head (oldest lease first), then pop the head
/// and lease it until `ARGV[2]`.
///
/// KEYS: delayed, processing, ready. ARGV: now ms, lease expiry ms.
const CLAIM_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 100)
for _, id in ipairs(due) do
    redis.call('ZREM', KEYS[1], id)
    redis.call('LPUSH', KEYS[3], id)
end
local expired = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1], 'LIMIT', 0, 100)
for i = #expired, 1, -1 do
    redis.call('ZREM', KEYS[2], expired[i])
    redis.call('RPUSH', KEYS[3], expired[i])
end
local id = redis.call('RPOP', KEYS[3])
if id then
    redis.call('ZADD', KEYS[2], ARGV[2], id)
end
return id
"#;

fn task_key(task_id: Uuid) -> String {
    format!("autoapply:task:{task_id}")
}

fn index_key(user_id: Uuid, job_id: Uuid) -> String {
    format!("autoapply:latest:{user_id}:{job_id}")
}

pub struct RedisTaskQueue {
    conn: MultiplexedConnection,
    claim: redis::Script,
    lease: Duration,
}

impl RedisTaskQueue {
    /// Opens a multiplexed connection and verifies it with PING. `lease` must
    /// outlast one submission attempt.
    pub async fn connect(redis_url: &str, lease: Duration) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        info!(lease_secs = lease.as_secs(), "Redis apply queue connected");
        Ok(Self {
            conn,
            claim: redis::Script::new(CLAIM_SCRIPT),
            lease,
        })
    }

    async fn save(&self, task: &ApplyTask) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(task_key(task.task_id))
            .arg(serde_json::to_string(task)?)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn load(&self, task_id: Uuid) -> Result<ApplyTask, QueueError> {
        self.get(task_id)
            .await?
            .ok_or(QueueError::NotFound(task_id))
    }

    async fn claim_next(&self) -> Result<Option<String>, QueueError> {
        let now = Utc::now().timestamp_millis();
        let lease_ms = i64::try_from(self.lease.as_millis()).unwrap_or(i64::MAX);
        let mut conn = self.conn.clone();
        let claimed = self
            .claim
            .key(DELAYED_KEY)
            .key(PROCESSING_KEY)
            .key(READY_KEY)
            .arg(now)
            .arg(now.saturating_add(lease_ms))
            .invoke_async::<_, Option<String>>(&mut conn)
            .await?;
        Ok(claimed)
    }

    async fn drop_claim(&self, raw_id: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("ZREM")
            .arg(PROCESSING_KEY)
            .arg(raw_id)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, user_id: Uuid, job_id: Uuid) -> Result<Uuid, QueueError> {
        let task = ApplyTask::new(user_id, job_id);
        let id = task.task_id.to_string();
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(task_key(task.task_id))
            .arg(serde_json::to_string(&task)?)
            .ignore()
            .cmd("SET")
            .arg(index_key(user_id, job_id))
            .arg(&id)
            .ignore()
            .cmd("LPUSH")
            .arg(READY_KEY)
            .arg(&id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(task.task_id)
    }

    async fn dequeue(&self) -> Result<Option<ApplyTask>, QueueError> {
        loop {
            let Some(raw_id) = self.claim_next().await? else {
                return Ok(None);
            };
            let Ok(task_id) = Uuid::parse_str(&raw_id) else {
                warn!(raw_id = %raw_id, "Dropping malformed task id from ready list");
                self.drop_claim(&raw_id).await?;
                continue;
            };
            match self.get(task_id).await? {
                Some(task) => return Ok(Some(task)),
                None => {
                    warn!(task_id = %task_id, "Ready task has no stored record; skipping");
                    self.drop_claim(&raw_id).await?;
                }
            }
        }
    }

    async fn begin(&self, task_id: Uuid) -> Result<ApplyTask, QueueError> {
        let mut task = self.load(task_id).await?;
        task.status = TaskStatus::InProgress;
        task.attempts += 1;
        task.updated_at = Utc::now();
        self.save(&task).await?;
        Ok(task)
    }

    async fn ack(&self, task_id: Uuid) -> Result<(), QueueError> {
        let mut task = self.load(task_id).await?;
        task.status = TaskStatus::Succeeded;
        task.last_error = None;
        task.updated_at = Utc::now();

        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(task_key(task_id))
            .arg(serde_json::to_string(&task)?)
            .ignore()
            .cmd("ZREM")
            .arg(PROCESSING_KEY)
            .arg(task_id.to_string())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn retry(&self, task_id: Uuid, delay: Duration, error: &str) -> Result<(), QueueError> {
        let mut task = self.load(task_id).await?;
        task.status = TaskStatus::Pending;
        task.last_error = Some(error.to_string());
        task.updated_at = Utc::now();

        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let ready_at = Utc::now().timestamp_millis().saturating_add(delay_ms);
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(task_key(task_id))
            .arg(serde_json::to_string(&task)?)
            .ignore()
            .cmd("ZADD")
            .arg(DELAYED_KEY)
            .arg(ready_at)
            .arg(task_id.to_string())
            .ignore()
            .cmd("ZREM")
            .arg(PROCESSING_KEY)
            .arg(task_id.to_string())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn fail(&self, task_id: Uuid, error: &str) -> Result<(), QueueError> {
        let mut task = self.load(task_id).await?;
        task.status = TaskStatus::Failed;
        task.last_error = Some(error.to_string());
        task.updated_at = Utc::now();

        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(task_key(task_id))
            .arg(serde_json::to_string(&task)?)
            .ignore()
            .cmd("LPUSH")
            .arg(FAILED_KEY)
            .arg(task_id.to_string())
            .ignore()
            .cmd("LTRIM")
            .arg(FAILED_KEY)
            .arg(0)
            .arg(FAILED_HISTORY - 1)
            .ignore()
            .cmd("ZREM")
            .arg(PROCESSING_KEY)
            .arg(task_id.to_string())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn release(&self, task_id: Uuid) -> Result<(), QueueError> {
        self.drop_claim(&task_id.to_string()).await
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<ApplyTask>, QueueError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(task_key(task_id))
            .query_async(&mut conn)
            .await?;
        raw.map(|json| serde_json::from_str(&json).map_err(QueueError::from))
            .transpose()
    }

    async fn latest_for(
        &self,
        user_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<ApplyTask>, QueueError> {
        let mut conn = self.conn.clone();
        let raw_id: Option<String> = redis::cmd("GET")
            .arg(index_key(user_id, job_id))
            .query_async(&mut conn)
            .await?;
        match raw_id.and_then(|id| Uuid::parse_str(&id).ok()) {
            Some(task_id) => self.get(task_id).await,
            None => Ok(None),
        }
    }

    async fn failed(&self, limit: usize) -> Result<Vec<ApplyTask>, QueueError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let ids: Vec<String> = redis::cmd("LRANGE")
            .arg(FAILED_KEY)
            .arg(0)
            .arg(limit as i64 - 1)
            .query_async(&mut conn)
            .await?;

        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids.iter().filter_map(|id| Uuid::parse_str(id).ok()) {
            if let Some(task) = self.get(id).await? {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }
}
