use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::decision::SwipeAction;
use crate::models::task::TaskStatus;
use crate::state::{AppState, UserIdQuery};
use crate::swipes::recorder::Dispatch;

#[derive(Debug, Deserialize)]
pub struct SwipeRequest {
    pub user_id: Uuid,
    pub job_id: Uuid,
    /// `swiped_left`/`swiped_right`; parsed in the handler so an unknown
    /// value is a validation error.
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct SwipeResponse {
    pub message: &'static str,
    pub action: SwipeAction,
    pub changed: bool,
    pub dispatch: Dispatch,
    /// When the stored action was last changed.
    pub decided_at: Option<DateTime<Utc>>,
}

/// POST /api/v1/jobs/swipe
/// Succeeds whenever the decision is stored, whatever happens to dispatch.
pub async fn handle_swipe(
    State(state): State<AppState>,
    body: Result<Json<SwipeRequest>, JsonRejection>,
) -> Result<Json<SwipeResponse>, AppError> {
    let Json(req) = body?;
    let action: SwipeAction = req.action.parse().map_err(AppError::Validation)?;
    if state.jobs.get(req.job_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Job {} not found", req.job_id)));
    }

    let outcome = state
        .recorder
        .record_swipe(req.user_id, req.job_id, action)
        .await?;
    let decided_at = state
        .decisions
        .get(req.user_id, req.job_id)
        .await?
        .map(|row| row.decided_at);

    Ok(Json(SwipeResponse {
        message: "Swipe recorded successfully",
        action: outcome.action,
        changed: outcome.changed,
        dispatch: outcome.dispatch,
        decided_at,
    }))
}

#[derive(Debug, Serialize)]
pub struct TaskView {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApplicationView {
    pub job_id: Uuid,
    pub title: String,
    pub company: String,
    pub location: String,
    pub decided_at: DateTime<Utc>,
    pub task: Option<TaskView>,
}

/// GET /api/v1/applications
/// Accepted jobs with the latest apply-task status, if the queue knows one.
pub async fn handle_applications(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<ApplicationView>>, AppError> {
    let accepted = state.decisions.accepted_jobs(params.user_id).await?;

    let mut views = Vec::with_capacity(accepted.len());
    for row in accepted {
        let task = match &state.task_queue {
            Some(queue) => match queue.latest_for(params.user_id, row.job_id).await {
                Ok(task) => task,
                Err(e) => {
                    tracing::warn!("Task status lookup failed for job {}: {e}", row.job_id);
                    None
                }
            },
            None => None,
        };

        views.push(ApplicationView {
            job_id: row.job_id,
            title: row.title,
            company: row.company,
            location: row.location,
            decided_at: row.decided_at,
            task: task.map(|t| TaskView {
                task_id: t.task_id,
                status: t.status,
                attempts: t.attempts,
                last_error: t.last_error,
            }),
        });
    }
    Ok(Json(views))
}
