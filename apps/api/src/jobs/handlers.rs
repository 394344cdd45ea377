use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::job::{JobPosting, JobStats, JobSummary, NewJobPosting};
use crate::state::{AppState, UserIdQuery};

const LIST_DEFAULT_LIMIT: i64 = 10;
const LIST_MAX_LIMIT: i64 = 100;
const PUBLIC_DEFAULT_LIMIT: i64 = 5;
const PUBLIC_MAX_LIMIT: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PublicQuery {
    pub limit: Option<i64>,
}

/// `(offset, limit)` for a 1-based page.
fn page_window(page: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(LIST_DEFAULT_LIMIT).clamp(1, LIST_MAX_LIMIT);
    let page = page.unwrap_or(1).max(1);
    ((page - 1).saturating_mul(limit), limit)
}

/// GET /api/v1/jobs/matches
pub async fn handle_get_matches(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<JobSummary>>, AppError> {
    let jobs = state.matcher.match_jobs(params.user_id).await?;
    Ok(Json(jobs.iter().map(JobSummary::from).collect()))
}

/// GET /api/v1/jobs/list
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<JobPosting>>, AppError> {
    let (offset, limit) = page_window(params.page, params.limit);
    Ok(Json(state.jobs.list_page(offset, limit).await?))
}

/// GET /api/v1/jobs/public
/// Unauthenticated teaser of the newest postings.
pub async fn handle_public_jobs(
    State(state): State<AppState>,
    Query(params): Query<PublicQuery>,
) -> Result<Json<Vec<JobSummary>>, AppError> {
    let limit = params
        .limit
        .unwrap_or(PUBLIC_DEFAULT_LIMIT)
        .clamp(1, PUBLIC_MAX_LIMIT);
    let jobs = state.jobs.list_page(0, limit).await?;
    Ok(Json(jobs.iter().map(JobSummary::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    pub application_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub id: Uuid,
    pub message: String,
}

/// POST /api/v1/admin/jobs
pub async fn handle_create_job(
    State(state): State<AppState>,
    body: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateJobResponse>), AppError> {
    let Json(req) = body?;
    let title = req.title.trim();
    let company = req.company.trim();
    if title.is_empty() || company.is_empty() {
        return Err(AppError::Validation(
            "title and company are required".to_string(),
        ));
    }

    let posting = NewJobPosting {
        title: title.to_string(),
        company: company.to_string(),
        location: req.location.trim().to_string(),
        description: req.description,
        application_url: req.application_url.filter(|u| !u.trim().is_empty()),
        source: "manual".to_string(),
        source_id: Uuid::new_v4().to_string(),
    };
    let outcome = state.jobs.upsert_if_absent(&posting).await?;
    tracing::info!("Manual job posting created: {}", outcome.id);

    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            id: outcome.id,
            message: "Job created successfully".to_string(),
        }),
    ))
}

/// GET /api/v1/admin/stats
pub async fn handle_job_stats(State(state): State<AppState>) -> Result<Json<JobStats>, AppError> {
    Ok(Json(state.jobs.stats().await?))
}

#[derive(Debug, Serialize)]
pub struct SeedResponse {
    pub seeded: bool,
    pub inserted: usize,
}

fn seed_postings() -> Vec<NewJobPosting> {
    vec![
        NewJobPosting {
            title: "Software Engineer".to_string(),
            company: "Acme Corp".to_string(),
            location: "Remote".to_string(),
            description: "Build cool things".to_string(),
            application_url: Some("https://example.com/apply".to_string()),
            source: "seed".to_string(),
            source_id: "seed-dev-1".to_string(),
        },
        NewJobPosting {
            title: "Frontend Developer".to_string(),
            company: "Globex".to_string(),
            location: "New York, NY".to_string(),
            description: "React/Next.js role".to_string(),
            application_url: Some("https://example.com/apply2".to_string()),
            source: "seed".to_string(),
            source_id: "seed-dev-2".to_string(),
        },
    ]
}

/// POST /dev/seed
/// Mounted outside production only. Idempotent through the dedup key.
pub async fn handle_dev_seed(State(state): State<AppState>) -> Result<Json<SeedResponse>, AppError> {
    let mut inserted = 0;
    for posting in seed_postings() {
        if state.jobs.upsert_if_absent(&posting).await?.inserted {
            inserted += 1;
        }
    }
    Ok(Json(SeedResponse {
        seeded: inserted > 0,
        inserted,
    }))
}
