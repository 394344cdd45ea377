//! Matching Engine: stateless keyword matching of stored postings against a
//! user's preferences.
//!
//! Algorithm:
//! 1. Load the user's preference keywords (blank entries ignored).
//! 2. No keywords → browse mode: the `BROWSE_LIMIT` most recent active postings.
//! 3. Otherwise → active postings whose title or description contains any
//!    keyword (OR, case-insensitive), newest first, capped at `MATCH_LIMIT`.

use std::sync::Arc;

use uuid::Uuid;

use crate::errors::StorageError;
use crate::jobs::store::{clean_keywords, JobStore};
use crate::models::job::JobPosting;
use crate::preferences::store::PreferenceStore;

pub const BROWSE_LIMIT: i64 = 20;
pub const MATCH_LIMIT: i64 = 50;

pub struct MatchingEngine {
    jobs: Arc<dyn JobStore>,
    preferences: Arc<dyn PreferenceStore>,
}

impl MatchingEngine {
    pub fn new(jobs: Arc<dyn JobStore>, preferences: Arc<dyn PreferenceStore>) -> Self {
        Self { jobs, preferences }
    }

    pub async fn match_jobs(&self, user_id: Uuid) -> Result<Vec<JobPosting>, StorageError> {
        let keywords = self
            .preferences
            .get(user_id)
            .await?
            .map(|p| clean_keywords(&p.keywords))
            .unwrap_or_default();

        if keywords.is_empty() {
            return self.jobs.search(&[], BROWSE_LIMIT).await;
        }

        self.jobs.search(&keywords, MATCH_LIMIT).await
    }
}
