use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What to search for on the external board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeQuery {
    pub keywords: String,
    pub location: String,
}

/// A listing as the source reported it, before normalization.
/// Every field may be missing; the ingestor fills in defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawListing {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub source_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to listing source failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Listing source returned status {0}")]
    Status(u16),

    #[error("Listing page fetch timed out after {0}s")]
    Timeout(u64),

    #[error("Listing page has an unexpected shape: {0}")]
    Shape(String),
}

/// Pluggable external job board.
///
/// Implementations own whatever session they need per call and release it
/// before returning, on success and on error alike.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Stored as `job_postings.source`; half of the dedup key.
    fn source_name(&self) -> &str;

    /// One result page. `page` is zero-based.
    async fn fetch_listings(
        &self,
        query: &ScrapeQuery,
        page: u32,
    ) -> Result<Vec<RawListing>, FetchError>;
}
