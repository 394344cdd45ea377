use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::preference::{PreferenceInput, UserPreference};
use crate::state::{AppState, UserIdQuery};

#[derive(Debug, Deserialize)]
pub struct UpsertPreferenceRequest {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub preferences: PreferenceInput,
}

/// GET /api/v1/preferences
pub async fn handle_get_preferences(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Option<UserPreference>>, AppError> {
    Ok(Json(state.preferences.get(params.user_id).await?))
}

/// POST /api/v1/preferences
pub async fn handle_upsert_preferences(
    State(state): State<AppState>,
    body: Result<Json<UpsertPreferenceRequest>, JsonRejection>,
) -> Result<Json<UserPreference>, AppError> {
    let Json(req) = body?;
    if let (Some(min), Some(max)) = (req.preferences.salary_min, req.preferences.salary_max) {
        if min > max {
            return Err(AppError::Validation(
                "salary_min cannot exceed salary_max".to_string(),
            ));
        }
    }

    let saved = state
        .preferences
        .upsert(req.user_id, req.preferences)
        .await?;
    Ok(Json(saved))
}
