use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

/// One queued "submit an application for this user to this job".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyTask {
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub job_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub attempts: u32,
    pub status: TaskStatus,
    pub last_error: Option<String>,
}

impl ApplyTask {
    pub fn new(user_id: Uuid, job_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4(),
            user_id,
            job_id,
            enqueued_at: now,
            updated_at: now,
            attempts: 0,
            status: TaskStatus::Pending,
            last_error: None,
        }
    }
}
