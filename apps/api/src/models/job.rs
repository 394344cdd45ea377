use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A stored job posting. `(source, source_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobPosting {
    pub id: Uuid,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub application_url: Option<String>,
    pub source: String,
    pub source_id: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A normalized posting ready for the dedup insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJobPosting {
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub application_url: Option<String>,
    pub source: String,
    pub source_id: String,
}

/// Result of `upsert_if_absent`. `inserted == false` is the expected dedup outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    pub inserted: bool,
    pub id: Uuid,
}

/// The projection returned to users browsing or matching.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobSummary {
    pub id: Uuid,
    pub title: String,
    pub company: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

impl From<&JobPosting> for JobSummary {
    fn from(job: &JobPosting) -> Self {
        Self {
            id: job.id,
            title: job.title.clone(),
            company: job.company.clone(),
            location: job.location.clone(),
            created_at: job.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct JobStats {
    pub jobs: i64,
    pub last_added: Option<DateTime<Utc>>,
}
