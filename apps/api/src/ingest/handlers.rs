use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TriggerScrapeRequest {
    pub keywords: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TriggerScrapeResponse {
    pub started: bool,
    pub keywords: String,
    pub location: String,
}

/// POST /api/v1/admin/scrape
/// Fire-and-forget: responds as soon as the run is launched.
pub async fn handle_trigger_scrape(
    State(state): State<AppState>,
    body: Option<Json<TriggerScrapeRequest>>,
) -> Result<(StatusCode, Json<TriggerScrapeResponse>), AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let query = state
        .scheduler
        .trigger(req.keywords, req.location)
        .map_err(|e| AppError::ScrapeUnavailable(format!("{e:#}")))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerScrapeResponse {
            started: true,
            keywords: query.keywords,
            location: query.location,
        }),
    ))
}
