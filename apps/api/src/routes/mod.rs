pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::apply::handlers as apply;
use crate::ingest::handlers as ingest;
use crate::jobs::handlers as jobs;
use crate::preferences::handlers as preferences;
use crate::state::AppState;
use crate::swipes::handlers as swipes;

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health::health_handler))
        // Preferences
        .route(
            "/api/v1/preferences",
            get(preferences::handle_get_preferences).post(preferences::handle_upsert_preferences),
        )
        // Jobs
        .route("/api/v1/jobs/matches", get(jobs::handle_get_matches))
        .route("/api/v1/jobs/list", get(jobs::handle_list_jobs))
        .route("/api/v1/jobs/public", get(jobs::handle_public_jobs))
        .route("/api/v1/jobs/swipe", post(swipes::handle_swipe))
        .route("/api/v1/applications", get(swipes::handle_applications))
        // Admin
        .route("/api/v1/admin/scrape", post(ingest::handle_trigger_scrape))
        .route("/api/v1/admin/jobs", post(jobs::handle_create_job))
        .route("/api/v1/admin/stats", get(jobs::handle_job_stats))
        .route(
            "/api/v1/admin/tasks/failed",
            get(apply::handle_failed_tasks),
        );

    if !state.config.is_production() {
        router = router.route("/dev/seed", post(jobs::handle_dev_seed));
    }

    router.with_state(state)
}
