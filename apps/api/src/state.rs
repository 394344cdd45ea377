use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::apply::queue::TaskQueue;
use crate::config::Config;
use crate::ingest::scheduler::ScrapeScheduler;
use crate::jobs::matching::MatchingEngine;
use crate::jobs::store::JobStore;
use crate::preferences::store::PreferenceStore;
use crate::swipes::recorder::SwipeRecorder;
use crate::swipes::store::DecisionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub jobs: Arc<dyn JobStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub decisions: Arc<dyn DecisionStore>,
    pub matcher: Arc<MatchingEngine>,
    pub recorder: Arc<SwipeRecorder>,
    pub scheduler: Arc<ScrapeScheduler>,
    /// `None` when REDIS_URL is unset or unreachable at startup.
    pub task_queue: Option<Arc<dyn TaskQueue>>,
}

/// Stand-in for the authenticated user until auth sits in front of the API.
#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}
