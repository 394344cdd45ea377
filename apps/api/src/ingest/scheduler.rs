//! Scrape scheduler: cron firings plus manual triggers.
//!
//! Scheduled firings are single-flight: a firing that lands while the previous
//! scheduled run is still going is skipped. Manual triggers are not gated and
//! may overlap a scheduled run; the `(source, source_id)` constraint keeps
//! concurrent runs from duplicating postings.
//!
//! Every run executes on its own task under `run_timeout`. A run that fails,
//! times out or panics is logged; the scheduler keeps firing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::ingest::ingestor::{IngestReport, Ingestor};
use crate::ingest::source::ScrapeQuery;

pub struct ScrapeScheduler {
    ingestor: Arc<Ingestor>,
    defaults: ScrapeQuery,
    page_limit: u32,
    run_timeout: Duration,
    scheduled_running: AtomicBool,
    cron: Mutex<Option<JobScheduler>>,
}

/// Clears the single-flight flag however the scheduled firing ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ScrapeScheduler {
    pub fn new(
        ingestor: Arc<Ingestor>,
        defaults: ScrapeQuery,
        page_limit: u32,
        run_timeout: Duration,
    ) -> Self {
        Self {
            ingestor,
            defaults,
            page_limit,
            run_timeout,
            scheduled_running: AtomicBool::new(false),
            cron: Mutex::new(None),
        }
    }

    /// Registers the cron job and starts firing. `cron_expr` uses the
    /// six-field form (seconds first).
    pub async fn start(self: &Arc<Self>, cron_expr: &str) -> anyhow::Result<()> {
        let scheduler = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;

        let this = self.clone();
        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let this = this.clone();
            Box::pin(async move {
                this.fire_scheduled().await;
            })
        })
        .with_context(|| format!("Invalid scrape schedule '{cron_expr}'"))?;

        scheduler.add(job).await.context("Failed to add scrape job")?;
        scheduler
            .start()
            .await
            .context("Failed to start job scheduler")?;

        *self.cron.lock().await = Some(scheduler);
        info!("Scrape scheduler started with schedule '{cron_expr}'");
        Ok(())
    }

    pub async fn stop(&self) {
        if let Some(mut scheduler) = self.cron.lock().await.take() {
            if let Err(e) = scheduler.shutdown().await {
                warn!("Scrape scheduler shutdown failed: {e}");
            } else {
                info!("Scrape scheduler stopped");
            }
        }
    }

    /// One scheduled firing with the configured defaults.
    /// Returns `false` when skipped because the previous firing is still running.
    pub async fn fire_scheduled(self: &Arc<Self>) -> bool {
        if self
            .scheduled_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Previous scheduled scrape still running; skipping this firing");
            return false;
        }
        let _in_flight = InFlight(&self.scheduled_running);

        let handle = self.spawn_run(self.defaults.clone(), "scheduled");
        observe(handle, "scheduled").await;
        true
    }

    /// Launches a run in the background with caller overrides, falling back to
    /// the defaults for blank or missing values. Errors only when the run
    /// cannot be launched at all.
    pub fn trigger(
        self: &Arc<Self>,
        keywords: Option<String>,
        location: Option<String>,
    ) -> anyhow::Result<ScrapeQuery> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("No async runtime available to launch a scrape run")?;

        let query = self.resolve(keywords, location);
        let handle = self.spawn_run(query.clone(), "manual");
        runtime.spawn(observe(handle, "manual"));
        Ok(query)
    }

    fn resolve(&self, keywords: Option<String>, location: Option<String>) -> ScrapeQuery {
        fn pick(value: Option<String>, fallback: &str) -> String {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| fallback.to_string())
        }
        ScrapeQuery {
            keywords: pick(keywords, &self.defaults.keywords),
            location: pick(location, &self.defaults.location),
        }
    }

    fn spawn_run(
        self: &Arc<Self>,
        query: ScrapeQuery,
        trigger: &'static str,
    ) -> JoinHandle<Option<IngestReport>> {
        let this = self.clone();
        tokio::spawn(async move { this.run_bounded(query, trigger).await })
    }

    async fn run_bounded(&self, query: ScrapeQuery, trigger: &str) -> Option<IngestReport> {
        match tokio::time::timeout(self.run_timeout, self.ingestor.run(&query, self.page_limit))
            .await
        {
            Ok(report) => {
                if let Some(err) = &report.error {
                    error!("{trigger} scrape run failed: {err}");
                }
                Some(report)
            }
            Err(_) => {
                error!(
                    "{trigger} scrape run exceeded {}s and was abandoned",
                    self.run_timeout.as_secs()
                );
                None
            }
        }
    }
}

async fn observe(handle: JoinHandle<Option<IngestReport>>, trigger: &str) {
    if let Err(e) = handle.await {
        if e.is_panic() {
            error!("{trigger} scrape run panicked: {e}");
        } else {
            warn!("{trigger} scrape run was cancelled: {e}");
        }
    }
}
