//! Swipe Recorder: persists a decision, then hands accept transitions to the
//! apply queue.
//!
//! Dispatch rules:
//! - Only a write that moves the row into `accepted` enqueues a task, so a
//!   repeated right swipe never creates a second task.
//! - A left swipe after an accept does not retract an in-flight task.
//! - The decision write and the enqueue are not transactional. A crash (or a
//!   queue error) between them loses the task, and a repeated right swipe will
//!   not recover it because the stored action is already `accepted`.
//! - Without a queue backend the decision is still recorded and dispatch is
//!   skipped with a warning.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::apply::queue::TaskQueue;
use crate::errors::StorageError;
use crate::models::decision::SwipeAction;
use crate::swipes::store::DecisionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "task_id", rename_all = "snake_case")]
pub enum Dispatch {
    /// Not an accept transition.
    NotRequired,
    Enqueued(Uuid),
    /// No queue backend configured.
    Skipped,
    /// The queue backend rejected the enqueue.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwipeOutcome {
    pub action: SwipeAction,
    pub changed: bool,
    pub dispatch: Dispatch,
}

pub struct SwipeRecorder {
    decisions: Arc<dyn DecisionStore>,
    queue: Option<Arc<dyn TaskQueue>>,
}

impl SwipeRecorder {
    pub fn new(decisions: Arc<dyn DecisionStore>, queue: Option<Arc<dyn TaskQueue>>) -> Self {
        Self { decisions, queue }
    }

    /// Only a storage failure of the decision itself is returned to the caller.
    pub async fn record_swipe(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        action: SwipeAction,
    ) -> Result<SwipeOutcome, StorageError> {
        let change = self.decisions.upsert(user_id, job_id, action).await?;

        let dispatch = if !change.is_accept_transition() {
            Dispatch::NotRequired
        } else {
            match &self.queue {
                None => {
                    warn!(
                        user_id = %user_id,
                        job_id = %job_id,
                        "Auto-apply queue unavailable; accepted swipe recorded without dispatch"
                    );
                    Dispatch::Skipped
                }
                Some(queue) => match queue.enqueue(user_id, job_id).await {
                    Ok(task_id) => {
                        info!(
                            task_id = %task_id,
                            user_id = %user_id,
                            job_id = %job_id,
                            "Enqueued apply task"
                        );
                        Dispatch::Enqueued(task_id)
                    }
                    Err(e) => {
                        warn!(
                            user_id = %user_id,
                            job_id = %job_id,
                            error = %e,
                            "Failed to enqueue apply task; decision kept without dispatch"
                        );
                        Dispatch::Failed
                    }
                },
            }
        };

        Ok(SwipeOutcome {
            action,
            changed: change.changed,
            dispatch,
        })
    }
}
