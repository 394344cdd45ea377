//! In-memory doubles for unit tests. Each mirrors the contract of its
//! Postgres/Redis counterpart closely enough to exercise the pipeline
//! without external services.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use uuid::Uuid;

use crate::apply::queue::{QueueError, TaskQueue};
use crate::apply::submitter::{ApplicationSubmitter, SubmitError};
use crate::apply::worker::TASK_LEASE;
use crate::config::Config;
use crate::errors::StorageError;
use crate::ingest::ingestor::Ingestor;
use crate::ingest::scheduler::ScrapeScheduler;
use crate::ingest::source::{FetchError, ListingSource, RawListing, ScrapeQuery};
use crate::jobs::matching::MatchingEngine;
use crate::jobs::store::{clean_keywords, JobStore};
use crate::models::decision::{AcceptedJobRow, DecisionChange, DecisionRow, SwipeAction};
use crate::models::job::{JobPosting, JobStats, NewJobPosting, UpsertOutcome};
use crate::models::preference::{PreferenceInput, UserPreference};
use crate::models::task::{ApplyTask, TaskStatus};
use crate::preferences::store::PreferenceStore;
use crate::state::AppState;
use crate::swipes::recorder::SwipeRecorder;
use crate::swipes::store::DecisionStore;

pub fn new_posting(source: &str, source_id: &str, title: &str) -> NewJobPosting {
    NewJobPosting {
        title: title.to_string(),
        company: "Acme".to_string(),
        location: "Remote".to_string(),
        description: String::new(),
        application_url: None,
        source: source.to_string(),
        source_id: source_id.to_string(),
    }
}

pub fn raw_listing(source_id: &str, title: &str) -> RawListing {
    RawListing {
        title: Some(title.to_string()),
        url: Some(format!("https://jobs.example.com/{source_id}")),
        source_id: Some(source_id.to_string()),
        ..Default::default()
    }
}

// ── Job store ───────────────────────────────────────────────────────────────

/// Same predicate as the ILIKE search in `PgJobStore::search`.
fn posting_matches(posting: &JobPosting, keywords: &[String]) -> bool {
    let keywords = clean_keywords(keywords);
    if keywords.is_empty() {
        return true;
    }
    let title = posting.title.to_lowercase();
    let description = posting.description.to_lowercase();
    keywords.iter().any(|k| {
        let k = k.to_lowercase();
        title.contains(&k) || description.contains(&k)
    })
}

/// Rows are kept in insertion order; newest-first means reverse order.
#[derive(Default)]
pub struct InMemoryJobStore {
    rows: Mutex<Vec<JobPosting>>,
    rejected: Mutex<HashSet<String>>,
}

impl InMemoryJobStore {
    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn deactivate(&self, source: &str, source_id: &str) {
        for row in self.rows.lock().unwrap().iter_mut() {
            if row.source == source && row.source_id == source_id {
                row.is_active = false;
            }
        }
    }

    /// Makes every insert of this source id fail with a storage error.
    pub fn reject_source_id(&self, source_id: &str) {
        self.rejected.lock().unwrap().insert(source_id.to_string());
    }

    fn active_newest_first(&self) -> Vec<JobPosting> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|j| j.is_active)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn upsert_if_absent(
        &self,
        posting: &NewJobPosting,
    ) -> Result<UpsertOutcome, StorageError> {
        if self.rejected.lock().unwrap().contains(&posting.source_id) {
            return Err(StorageError::Transient("connection reset".to_string()));
        }

        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows
            .iter()
            .find(|j| j.source == posting.source && j.source_id == posting.source_id)
        {
            return Ok(UpsertOutcome {
                inserted: false,
                id: existing.id,
            });
        }

        let id = Uuid::new_v4();
        rows.push(JobPosting {
            id,
            title: posting.title.clone(),
            company: posting.company.clone(),
            location: posting.location.clone(),
            description: posting.description.clone(),
            application_url: posting.application_url.clone(),
            source: posting.source.clone(),
            source_id: posting.source_id.clone(),
            is_active: true,
            created_at: Utc::now(),
        });
        Ok(UpsertOutcome { inserted: true, id })
    }

    async fn search(
        &self,
        keywords: &[String],
        limit: i64,
    ) -> Result<Vec<JobPosting>, StorageError> {
        Ok(self
            .active_newest_first()
            .into_iter()
            .filter(|j| posting_matches(j, keywords))
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_page(&self, offset: i64, limit: i64) -> Result<Vec<JobPosting>, StorageError> {
        Ok(self
            .active_newest_first()
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobPosting>, StorageError> {
        Ok(self.rows.lock().unwrap().iter().find(|j| j.id == id).cloned())
    }

    async fn stats(&self) -> Result<JobStats, StorageError> {
        let rows = self.rows.lock().unwrap();
        Ok(JobStats {
            jobs: rows.len() as i64,
            last_added: rows.iter().map(|j| j.created_at).max(),
        })
    }
}

// ── Preference store ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryPreferenceStore {
    rows: Mutex<HashMap<Uuid, UserPreference>>,
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserPreference>, StorageError> {
        Ok(self.rows.lock().unwrap().get(&user_id).cloned())
    }

    async fn upsert(
        &self,
        user_id: Uuid,
        input: PreferenceInput,
    ) -> Result<UserPreference, StorageError> {
        let input = input.normalized();
        let row = UserPreference {
            user_id,
            keywords: input.keywords,
            preferred_locations: input.preferred_locations,
            preferred_contract_types: input.preferred_contract_types,
            salary_min: input.salary_min,
            salary_max: input.salary_max,
            updated_at: Utc::now(),
        };
        self.rows.lock().unwrap().insert(user_id, row.clone());
        Ok(row)
    }
}

// ── Decision store ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryDecisionStore {
    rows: Mutex<HashMap<(Uuid, Uuid), DecisionRow>>,
    jobs: Option<Arc<InMemoryJobStore>>,
}

impl InMemoryDecisionStore {
    /// Joins accepted decisions against `jobs`, as the SQL store does.
    pub fn with_jobs(jobs: Arc<InMemoryJobStore>) -> Self {
        Self {
            rows: Mutex::default(),
            jobs: Some(jobs),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl DecisionStore for InMemoryDecisionStore {
    async fn upsert(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        action: SwipeAction,
    ) -> Result<DecisionChange, StorageError> {
        let mut rows = self.rows.lock().unwrap();
        let changed = rows
            .get(&(user_id, job_id))
            .map_or(true, |row| row.action != action.as_str());
        if changed {
            rows.insert(
                (user_id, job_id),
                DecisionRow {
                    user_id,
                    job_id,
                    action: action.as_str().to_string(),
                    decided_at: Utc::now(),
                },
            );
        }
        Ok(DecisionChange { action, changed })
    }

    async fn get(&self, user_id: Uuid, job_id: Uuid) -> Result<Option<DecisionRow>, StorageError> {
        Ok(self.rows.lock().unwrap().get(&(user_id, job_id)).cloned())
    }

    async fn accepted_jobs(&self, user_id: Uuid) -> Result<Vec<AcceptedJobRow>, StorageError> {
        let Some(jobs) = &self.jobs else {
            return Ok(Vec::new());
        };
        let decisions: Vec<DecisionRow> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.user_id == user_id && d.action == SwipeAction::Accepted.as_str())
            .cloned()
            .collect();

        let mut accepted = Vec::new();
        for decision in decisions {
            if let Some(job) = jobs.get(decision.job_id).await? {
                accepted.push(AcceptedJobRow {
                    job_id: job.id,
                    title: job.title,
                    company: job.company,
                    location: job.location,
                    decided_at: decision.decided_at,
                });
            }
        }
        accepted.sort_by(|a, b| b.decided_at.cmp(&a.decided_at));
        Ok(accepted)
    }
}

// ── Task queue ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct QueueInner {
    tasks: HashMap<Uuid, ApplyTask>,
    ready: VecDeque<Uuid>,
    delayed: Vec<(Instant, Uuid)>,
    /// Claimed ids and when their lease runs out.
    processing: HashMap<Uuid, Instant>,
    failed: Vec<Uuid>,
    latest: HashMap<(Uuid, Uuid), Uuid>,
}

/// FIFO queue with delayed retries and claim leases on the tokio clock, so
/// paused-time tests can step through backoff and redelivery.
pub struct InMemoryTaskQueue {
    inner: Mutex<QueueInner>,
    lease: Duration,
    ack_failures: AtomicU32,
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self {
            inner: Mutex::default(),
            lease: TASK_LEASE,
            ack_failures: AtomicU32::new(0),
        }
    }
}

impl InMemoryTaskQueue {
    /// Claims not yet settled by ack, retry, fail or release.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().unwrap().processing.len()
    }

    /// The next `ack` fails with a backend error and changes nothing.
    pub fn fail_next_ack(&self) {
        self.ack_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn tasks_for(&self, user_id: Uuid, job_id: Uuid) -> Vec<ApplyTask> {
        self.inner
            .lock()
            .unwrap()
            .tasks
            .values()
            .filter(|t| t.user_id == user_id && t.job_id == job_id)
            .cloned()
            .collect()
    }

    fn update(
        &self,
        task_id: Uuid,
        f: impl FnOnce(&mut QueueInner, &mut ApplyTask),
    ) -> Result<ApplyTask, QueueError> {
        let mut inner = self.inner.lock().unwrap();
        let mut task = inner
            .tasks
            .get(&task_id)
            .cloned()
            .ok_or(QueueError::NotFound(task_id))?;
        task.updated_at = Utc::now();
        f(&mut inner, &mut task);
        inner.tasks.insert(task_id, task.clone());
        Ok(task)
    }

    /// Same transition as `update`, and the claim on the task is settled.
    fn settle(
        &self,
        task_id: Uuid,
        f: impl FnOnce(&mut QueueInner, &mut ApplyTask),
    ) -> Result<(), QueueError> {
        self.update(task_id, |inner, task| {
            inner.processing.remove(&task_id);
            f(inner, task);
        })
        .map(|_| ())
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, user_id: Uuid, job_id: Uuid) -> Result<Uuid, QueueError> {
        let task = ApplyTask::new(user_id, job_id);
        let task_id = task.task_id;
        let mut inner = self.inner.lock().unwrap();
        inner.tasks.insert(task_id, task);
        inner.latest.insert((user_id, job_id), task_id);
        inner.ready.push_back(task_id);
        Ok(task_id)
    }

    async fn dequeue(&self) -> Result<Option<ApplyTask>, QueueError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let (due, waiting): (Vec<_>, Vec<_>) =
            inner.delayed.drain(..).partition(|(at, _)| *at <= now);
        inner.delayed = waiting;
        inner.ready.extend(due.into_iter().map(|(_, id)| id));

        let mut expired: Vec<(Instant, Uuid)> = inner
            .processing
            .iter()
            .filter(|(_, until)| **until <= now)
            .map(|(id, until)| (*until, *id))
            .collect();
        expired.sort();
        for (_, id) in expired.into_iter().rev() {
            inner.processing.remove(&id);
            inner.ready.push_front(id);
        }

        while let Some(task_id) = inner.ready.pop_front() {
            let Some(task) = inner.tasks.get(&task_id).cloned() else {
                continue;
            };
            inner.processing.insert(task_id, now + self.lease);
            return Ok(Some(task));
        }
        Ok(None)
    }

    async fn begin(&self, task_id: Uuid) -> Result<ApplyTask, QueueError> {
        self.update(task_id, |_, task| {
            task.status = TaskStatus::InProgress;
            task.attempts += 1;
        })
    }

    async fn ack(&self, task_id: Uuid) -> Result<(), QueueError> {
        let failing = self
            .ack_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(unavailable());
        }
        self.settle(task_id, |_, task| {
            task.status = TaskStatus::Succeeded;
            task.last_error = None;
        })
    }

    async fn retry(&self, task_id: Uuid, delay: Duration, error: &str) -> Result<(), QueueError> {
        self.settle(task_id, |inner, task| {
            task.status = TaskStatus::Pending;
            task.last_error = Some(error.to_string());
            inner.delayed.push((Instant::now() + delay, task_id));
        })
    }

    async fn fail(&self, task_id: Uuid, error: &str) -> Result<(), QueueError> {
        self.settle(task_id, |inner, task| {
            task.status = TaskStatus::Failed;
            task.last_error = Some(error.to_string());
            inner.failed.insert(0, task_id);
        })
    }

    async fn release(&self, task_id: Uuid) -> Result<(), QueueError> {
        self.inner.lock().unwrap().processing.remove(&task_id);
        Ok(())
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<ApplyTask>, QueueError> {
        Ok(self.inner.lock().unwrap().tasks.get(&task_id).cloned())
    }

    async fn latest_for(
        &self,
        user_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<ApplyTask>, QueueError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .latest
            .get(&(user_id, job_id))
            .and_then(|id| inner.tasks.get(id))
            .cloned())
    }

    async fn failed(&self, limit: usize) -> Result<Vec<ApplyTask>, QueueError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .failed
            .iter()
            .take(limit)
            .filter_map(|id| inner.tasks.get(id).cloned())
            .collect())
    }
}

/// A queue backend that is configured but unreachable.
pub struct UnavailableQueue;

fn unavailable() -> QueueError {
    QueueError::Backend(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "connection refused",
    )))
}

#[async_trait]
impl TaskQueue for UnavailableQueue {
    async fn enqueue(&self, _: Uuid, _: Uuid) -> Result<Uuid, QueueError> {
        Err(unavailable())
    }
    async fn dequeue(&self) -> Result<Option<ApplyTask>, QueueError> {
        Err(unavailable())
    }
    async fn begin(&self, _: Uuid) -> Result<ApplyTask, QueueError> {
        Err(unavailable())
    }
    async fn ack(&self, _: Uuid) -> Result<(), QueueError> {
        Err(unavailable())
    }
    async fn retry(&self, _: Uuid, _: Duration, _: &str) -> Result<(), QueueError> {
        Err(unavailable())
    }
    async fn fail(&self, _: Uuid, _: &str) -> Result<(), QueueError> {
        Err(unavailable())
    }
    async fn release(&self, _: Uuid) -> Result<(), QueueError> {
        Err(unavailable())
    }
    async fn get(&self, _: Uuid) -> Result<Option<ApplyTask>, QueueError> {
        Err(unavailable())
    }
    async fn latest_for(&self, _: Uuid, _: Uuid) -> Result<Option<ApplyTask>, QueueError> {
        Err(unavailable())
    }
    async fn failed(&self, _: usize) -> Result<Vec<ApplyTask>, QueueError> {
        Err(unavailable())
    }
}

// ── Listing sources ─────────────────────────────────────────────────────────

/// Serves fixed pages; page `n` is `pages[n]`, missing pages are empty.
pub struct StaticSource {
    name: String,
    pages: Vec<Vec<RawListing>>,
    calls: AtomicU32,
    last_query: Mutex<Option<ScrapeQuery>>,
}

impl StaticSource {
    pub fn new(name: &str, pages: Vec<Vec<RawListing>>) -> Self {
        Self {
            name: name.to_string(),
            pages,
            calls: AtomicU32::new(0),
            last_query: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<ScrapeQuery> {
        self.last_query.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingSource for StaticSource {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn fetch_listings(
        &self,
        query: &ScrapeQuery,
        page: u32,
    ) -> Result<Vec<RawListing>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(query.clone());
        Ok(self.pages.get(page as usize).cloned().unwrap_or_default())
    }
}

pub struct FailingSource;

#[async_trait]
impl ListingSource for FailingSource {
    fn source_name(&self) -> &str {
        "indeed"
    }

    async fn fetch_listings(&self, _: &ScrapeQuery, _: u32) -> Result<Vec<RawListing>, FetchError> {
        Err(FetchError::Status(503))
    }
}

/// Never answers.
pub struct HangingSource;

#[async_trait]
impl ListingSource for HangingSource {
    fn source_name(&self) -> &str {
        "indeed"
    }

    async fn fetch_listings(&self, _: &ScrapeQuery, _: u32) -> Result<Vec<RawListing>, FetchError> {
        std::future::pending().await
    }
}

pub struct PanickingSource;

#[async_trait]
impl ListingSource for PanickingSource {
    fn source_name(&self) -> &str {
        "indeed"
    }

    async fn fetch_listings(&self, _: &ScrapeQuery, _: u32) -> Result<Vec<RawListing>, FetchError> {
        panic!("listing source exploded")
    }
}

/// Each fetch blocks until the test calls `release()` once for it.
pub struct GatedSource {
    listings: Vec<RawListing>,
    gate: Semaphore,
    calls: AtomicU32,
}

impl GatedSource {
    pub fn new(listings: Vec<RawListing>) -> Self {
        Self {
            listings,
            gate: Semaphore::new(0),
            calls: AtomicU32::new(0),
        }
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingSource for GatedSource {
    fn source_name(&self) -> &str {
        "indeed"
    }

    async fn fetch_listings(
        &self,
        _: &ScrapeQuery,
        page: u32,
    ) -> Result<Vec<RawListing>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        Ok(if page == 0 {
            self.listings.clone()
        } else {
            Vec::new()
        })
    }
}

// ── Submitter ───────────────────────────────────────────────────────────────

enum Script {
    FailFirst(AtomicU32),
    FailFor(Uuid),
    Hang,
}

pub struct ScriptedSubmitter {
    script: Script,
    calls: AtomicU32,
}

impl ScriptedSubmitter {
    pub fn succeeding() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(failures: u32) -> Self {
        Self {
            script: Script::FailFirst(AtomicU32::new(failures)),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing_for(job_id: Uuid) -> Self {
        Self {
            script: Script::FailFor(job_id),
            calls: AtomicU32::new(0),
        }
    }

    pub fn hanging() -> Self {
        Self {
            script: Script::Hang,
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApplicationSubmitter for ScriptedSubmitter {
    async fn submit(&self, _user_id: Uuid, job_id: Uuid) -> Result<(), SubmitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::FailFirst(left) => {
                let failing = left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if failing {
                    Err(SubmitError::Rejected {
                        status: 409,
                        body: "board rejected application".to_string(),
                    })
                } else {
                    Ok(())
                }
            }
            Script::FailFor(bad) if *bad == job_id => {
                Err(SubmitError::Rejected {
                    status: 410,
                    body: "listing closed".to_string(),
                })
            }
            Script::FailFor(_) => Ok(()),
            Script::Hang => std::future::pending().await,
        }
    }
}

// ── App state ───────────────────────────────────────────────────────────────

pub struct TestHarness {
    pub state: AppState,
    pub jobs: Arc<InMemoryJobStore>,
    pub decisions: Arc<InMemoryDecisionStore>,
    pub queue: Arc<InMemoryTaskQueue>,
}

pub fn test_state(production: bool) -> TestHarness {
    let app_env = if production { "production" } else { "development" };
    let config = Config::from_lookup(|key: &str| match key {
        "DATABASE_URL" => Some("postgres://localhost/jobswipe_test".to_string()),
        "APP_ENV" => Some(app_env.to_string()),
        _ => None,
    })
    .unwrap();

    let jobs = Arc::new(InMemoryJobStore::default());
    let preferences = Arc::new(InMemoryPreferenceStore::default());
    let decisions = Arc::new(InMemoryDecisionStore::with_jobs(jobs.clone()));
    let queue = Arc::new(InMemoryTaskQueue::default());
    let task_queue: Arc<dyn TaskQueue> = queue.clone();

    let ingestor = Arc::new(Ingestor::new(
        Arc::new(StaticSource::new("indeed", Vec::new())),
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

    let state = AppState {
        config,
        jobs: jobs.clone(),
        preferences: preferences.clone(),
        decisions: decisions.clone(),
        matcher: Arc::new(MatchingEngine::new(jobs.clone(), preferences)),
        recorder: Arc::new(SwipeRecorder::new(
            decisions.clone(),
            Some(task_queue.clone()),
        )),
        scheduler,
        task_queue: Some(task_queue),
    };

    TestHarness {
        state,
        jobs,
        decisions,
        queue,
    }
}
