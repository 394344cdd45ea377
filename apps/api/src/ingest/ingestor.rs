//! Ingestor: fetch → normalize → dedup-insert.
//!
//! A run never returns an error. Fetch failures (including a page that
//! exceeds its time budget) come back as an empty report carrying the error;
//! a bad entry is counted in `failed` and the rest of the run continues.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::ingest::source::{FetchError, ListingSource, RawListing, ScrapeQuery};
use crate::jobs::store::JobStore;
use crate::models::job::NewJobPosting;

/// Upper bound on listings handled per run, across all pages.
pub const MAX_RESULTS_PER_RUN: usize = 20;

const DEFAULT_TITLE: &str = "Job";
const DEFAULT_COMPANY: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub scraped: usize,
    pub saved: usize,
    /// Malformed entries plus entries the store refused.
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Ingestor {
    source: Arc<dyn ListingSource>,
    jobs: Arc<dyn JobStore>,
    page_timeout: Duration,
}

impl Ingestor {
    pub fn new(
        source: Arc<dyn ListingSource>,
        jobs: Arc<dyn JobStore>,
        page_timeout: Duration,
    ) -> Self {
        Self {
            source,
            jobs,
            page_timeout,
        }
    }

    pub async fn run(&self, query: &ScrapeQuery, page_limit: u32) -> IngestReport {
        let source = self.source.source_name().to_string();
        info!(
            "Ingest run started: source={source} keywords='{}' location='{}'",
            query.keywords, query.location
        );

        let listings = match self.fetch(query, page_limit).await {
            Ok(listings) => listings,
            Err(e) => {
                error!("Ingest fetch from {source} failed: {e}");
                return IngestReport {
                    error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let mut report = IngestReport {
            scraped: listings.len(),
            ..Default::default()
        };

        for raw in listings {
            let Some(posting) = normalize(raw, &source, query) else {
                warn!("Skipping {source} listing with neither url nor source id");
                report.failed += 1;
                continue;
            };

            match self.jobs.upsert_if_absent(&posting).await {
                Ok(outcome) if outcome.inserted => report.saved += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "Failed to save {source} listing {}: {e}",
                        posting.source_id
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            "Ingest run finished: source={source} scraped={} saved={} failed={}",
            report.scraped, report.saved, report.failed
        );
        report
    }

    async fn fetch(
        &self,
        query: &ScrapeQuery,
        page_limit: u32,
    ) -> Result<Vec<RawListing>, FetchError> {
        let mut listings = Vec::new();
        for page in 0..page_limit.max(1) {
            let batch = tokio::time::timeout(
                self.page_timeout,
                self.source.fetch_listings(query, page),
            )
            .await
            .map_err(|_| FetchError::Timeout(self.page_timeout.as_secs()))??;

            if batch.is_empty() {
                break;
            }
            listings.extend(batch);
            if listings.len() >= MAX_RESULTS_PER_RUN {
                listings.truncate(MAX_RESULTS_PER_RUN);
                break;
            }
        }
        Ok(listings)
    }
}

/// Fills defaults. `None` when the listing has no usable identity.
pub fn normalize(raw: RawListing, source: &str, query: &ScrapeQuery) -> Option<NewJobPosting> {
    let url = non_blank(raw.url);
    let source_id = non_blank(raw.source_id).or_else(|| url.clone())?;

    Some(NewJobPosting {
        title: non_blank(raw.title).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        company: non_blank(raw.company).unwrap_or_else(|| DEFAULT_COMPANY.to_string()),
        location: non_blank(raw.location).unwrap_or_else(|| query.location.clone()),
        description: raw.description.unwrap_or_default(),
        application_url: url,
        source: source.to_string(),
        source_id,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
