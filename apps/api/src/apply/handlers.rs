use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::task::ApplyTask;
use crate::state::AppState;

const DEFAULT_FAILED_LIMIT: usize = 50;
const MAX_FAILED_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct FailedTasksQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/admin/tasks/failed
/// Terminally failed apply tasks, newest first. Empty when no queue backend is configured.
pub async fn handle_failed_tasks(
    State(state): State<AppState>,
    Query(params): Query<FailedTasksQuery>,
) -> Result<Json<Vec<ApplyTask>>, AppError> {
    let Some(queue) = &state.task_queue else {
        return Ok(Json(Vec::new()));
    };

    let limit = params
        .limit
        .unwrap_or(DEFAULT_FAILED_LIMIT)
        .min(MAX_FAILED_LIMIT);
    let tasks = queue
        .failed(limit)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok(Json(tasks))
}
