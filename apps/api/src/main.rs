mod apply;
mod config;
mod db;
mod errors;
mod ingest;
mod jobs;
mod models;
mod preferences;
mod routes;
mod state;
mod swipes;

#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::apply::queue::{RedisTaskQueue, TaskQueue};
use crate::apply::submitter::{ApplicationSubmitter, DryRunSubmitter, WebhookSubmitter};
use crate::apply::worker::{ApplyWorkerPool, WorkerConfig, SUBMIT_TIMEOUT, TASK_LEASE};
use crate::config::Config;
use crate::db::create_pool;
use crate::ingest::indeed::IndeedSource;
use crate::ingest::ingestor::Ingestor;
use crate::ingest::scheduler::ScrapeScheduler;
use crate::ingest::source::ScrapeQuery;
use crate::jobs::matching::MatchingEngine;
use crate::jobs::store::PgJobStore;
use crate::preferences::store::PgPreferenceStore;
use crate::routes::build_router;
use crate::state::AppState;
use crate::swipes::recorder::SwipeRecorder;
use crate::swipes::store::PgDecisionStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration errors stop startup before anything binds
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting JobSwipe API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    let jobs = Arc::new(PgJobStore::new(db.clone()));
    let preferences = Arc::new(PgPreferenceStore::new(db.clone()));
    let decisions = Arc::new(PgDecisionStore::new(db));

    // Initialize the apply queue; auto-apply is optional
    let task_queue = connect_queue(&config).await;

    // Initialize ingestion
    let source = Arc::new(IndeedSource::new(
        &config.scrape.indeed_base_url,
        config.scrape.page_timeout,
    )?);
    let ingestor = Arc::new(Ingestor::new(
        source,
        jobs.clone(),
        config.scrape.page_timeout,
    ));
    let scheduler = Arc::new(ScrapeScheduler::new(
        ingestor,
        ScrapeQuery {
            keywords: config.scrape.default_keywords.clone(),
            location: config.scrape.default_location.clone(),
        },
        config.scrape.page_limit,
        config.scrape.run_timeout,
    ));
    scheduler.start(&config.scrape.cron_schedule).await?;

    // Start apply workers
    let shutdown = CancellationToken::new();
    let worker_handles = match &task_queue {
        Some(queue) => {
            let submitter: Arc<dyn ApplicationSubmitter> = match &config.apply.webhook_url {
                Some(url) => Arc::new(WebhookSubmitter::new(url.clone(), SUBMIT_TIMEOUT)?),
                None => {
                    warn!("APPLY_WEBHOOK_URL not set; apply tasks will be dry-run");
                    Arc::new(DryRunSubmitter)
                }
            };
            let pool = Arc::new(ApplyWorkerPool::new(
                queue.clone(),
                submitter,
                WorkerConfig::from(&config.apply),
            ));
            pool.start(shutdown.clone())
        }
        None => Vec::new(),
    };

    // Build app state
    let state = AppState {
        config: config.clone(),
        jobs: jobs.clone(),
        preferences: preferences.clone(),
        decisions: decisions.clone(),
        matcher: Arc::new(MatchingEngine::new(jobs, preferences)),
        recorder: Arc::new(SwipeRecorder::new(decisions, task_queue.clone())),
        scheduler: scheduler.clone(),
        task_queue,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down background services");
    scheduler.stop().await;
    shutdown.cancel();
    for handle in worker_handles {
        if let Err(e) = handle.await {
            warn!("Apply worker ended abnormally: {e}");
        }
    }

    Ok(())
}

/// Redis-backed queue, or `None` when it is not configured or not reachable.
async fn connect_queue(config: &Config) -> Option<Arc<dyn TaskQueue>> {
    let Some(url) = &config.redis_url else {
        warn!("REDIS_URL not set; auto-apply dispatch disabled");
        return None;
    };
    match RedisTaskQueue::connect(url, TASK_LEASE).await {
        Ok(queue) => Some(Arc::new(queue)),
        Err(e) => {
            warn!("Redis unavailable ({e}); auto-apply dispatch disabled");
            None
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
