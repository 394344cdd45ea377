//! Apply worker pool.
//!
//! ```text
//! worker ─► dequeue ─► status check ─► begin ─► submit (bounded) ─┬─► ack
//!                                                                 ├─► retry (backoff)
//!                                                                 └─► fail (attempts exhausted)
//! ```
//!
//! Each worker handles one task at a time; a slow or failing task only holds
//! the worker that picked it up. Shutdown is cooperative: a worker finishes
//! the task in hand, then exits.
//!
//! A queue error after `begin` leaves the claim unsettled. The task comes back
//! when its lease expires and is resumed, so a submission may run twice but
//! is never dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::apply::queue::{QueueError, TaskQueue};
use crate::apply::submitter::ApplicationSubmitter;
use crate::config::ApplyConfig;
use crate::models::task::{ApplyTask, TaskStatus};

const MAX_BACKOFF: Duration = Duration::from_secs(3600);
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);
/// Must outlast `SUBMIT_TIMEOUT` plus the queue calls around it.
pub const TASK_LEASE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub workers: usize,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub poll_interval: Duration,
    /// Wall-clock budget for one submission attempt.
    pub submit_timeout: Duration,
}

impl From<&ApplyConfig> for WorkerConfig {
    fn from(config: &ApplyConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base,
            poll_interval: config.poll_interval,
            submit_timeout: SUBMIT_TIMEOUT,
        }
    }
}

/// `base * 2^(attempt - 1)`, capped at one hour.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Nothing was ready.
    Idle,
    Succeeded(Uuid),
    /// Redelivered task already in a terminal state; not submitted again.
    AlreadyDone(Uuid),
    Retried {
        task_id: Uuid,
        attempt: u32,
        delay: Duration,
    },
    Failed(Uuid),
}

pub struct ApplyWorkerPool {
    queue: Arc<dyn TaskQueue>,
    submitter: Arc<dyn ApplicationSubmitter>,
    config: WorkerConfig,
}

impl ApplyWorkerPool {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        submitter: Arc<dyn ApplicationSubmitter>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            submitter,
            config,
        }
    }

    /// Spawns `config.workers` workers that run until `shutdown` is cancelled.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        info!(
            workers = self.config.workers,
            max_attempts = self.config.max_attempts,
            "Starting apply worker pool"
        );
        (0..self.config.workers)
            .map(|worker_id| {
                let pool = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.run_worker(worker_id, shutdown).await })
            })
            .collect()
    }

    async fn run_worker(&self, worker_id: usize, shutdown: CancellationToken) {
        debug!(worker_id, "Apply worker started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.run_once().await {
                Ok(TaskOutcome::Idle) => {}
                Ok(outcome) => {
                    debug!(worker_id, ?outcome, "Apply task processed");
                    continue;
                }
                Err(e) => error!(worker_id, error = %e, "Apply worker queue error"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
        debug!(worker_id, "Apply worker stopped");
    }

    /// Takes at most one task off the queue and drives it to its next state.
    pub async fn run_once(&self) -> Result<TaskOutcome, QueueError> {
        match self.queue.dequeue().await? {
            Some(task) => self.process_task(task).await,
            None => Ok(TaskOutcome::Idle),
        }
    }

    async fn process_task(&self, task: ApplyTask) -> Result<TaskOutcome, QueueError> {
        let task_id = task.task_id;

        if task.status.is_terminal() {
            debug!(task_id = %task_id, status = ?task.status, "Skipping redelivered task");
            self.queue.release(task_id).await?;
            return Ok(TaskOutcome::AlreadyDone(task_id));
        }
        if task.status == TaskStatus::InProgress {
            if task.attempts >= self.config.max_attempts {
                let error = format!("claim expired during final attempt {}", task.attempts);
                error!(task_id = %task_id, attempts = task.attempts, "Abandoning task: {error}");
                self.queue.fail(task_id, &error).await?;
                return Ok(TaskOutcome::Failed(task_id));
            }
            warn!(
                task_id = %task_id,
                attempts = task.attempts,
                "Task was left in progress; resuming"
            );
        }

        let task = self.queue.begin(task_id).await?;
        let result = tokio::time::timeout(
            self.config.submit_timeout,
            self.submitter.submit(task.user_id, task.job_id),
        )
        .await;

        let error = match result {
            Ok(Ok(())) => {
                self.queue.ack(task_id).await?;
                info!(
                    task_id = %task_id,
                    user_id = %task.user_id,
                    job_id = %task.job_id,
                    attempts = task.attempts,
                    "Application submitted"
                );
                return Ok(TaskOutcome::Succeeded(task_id));
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "submission timed out after {}s",
                self.config.submit_timeout.as_secs()
            ),
        };

        if task.attempts < self.config.max_attempts {
            let delay = backoff_delay(self.config.backoff_base, task.attempts);
            warn!(
                task_id = %task_id,
                attempt = task.attempts,
                delay_secs = delay.as_secs(),
                error = %error,
                "Application submission failed; will retry"
            );
            self.queue.retry(task_id, delay, &error).await?;
            Ok(TaskOutcome::Retried {
                task_id,
                attempt: task.attempts,
                delay,
            })
        } else {
            error!(
                task_id = %task_id,
                user_id = %task.user_id,
                job_id = %task.job_id,
                attempts = task.attempts,
                error = %error,
                "Application submission failed permanently"
            );
            self.queue.fail(task_id, &error).await?;
            Ok(TaskOutcome::Failed(task_id))
        }
    }
}
