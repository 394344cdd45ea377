use std::collections::HashSet;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use scraper::{Html, Selector};
use tracing::debug;

use crate::ingest::source::{FetchError, ListingSource, RawListing, ScrapeQuery};

const RESULT_ANCHORS: &str = r#"a[href*="/pagead/clk"], a[href*="/rc/clk"]"#;
const RESULTS_PER_PAGE: u32 = 10;
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Indeed search results over plain HTTP.
pub struct IndeedSource {
    client: Client,
    base_url: Url,
}

impl IndeedSource {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid INDEED_BASE_URL '{base_url}'"))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client for listing source")?;
        Ok(Self { client, base_url })
    }

    fn search_url(&self, query: &ScrapeQuery, page: u32) -> Result<Url, FetchError> {
        let start = (page * RESULTS_PER_PAGE).to_string();
        let mut url = self
            .base_url
            .join("/jobs")
            .map_err(|e| FetchError::Shape(format!("bad search url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("q", &query.keywords)
            .append_pair("l", &query.location)
            .append_pair("start", &start);
        Ok(url)
    }
}

#[async_trait]
impl ListingSource for IndeedSource {
    fn source_name(&self) -> &str {
        "indeed"
    }

    async fn fetch_listings(
        &self,
        query: &ScrapeQuery,
        page: u32,
    ) -> Result<Vec<RawListing>, FetchError> {
        let url = self.search_url(query, page)?;
        debug!("Fetching listings from {url}");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response.text().await?;

        // `Html` is not Send, so parsing stays out of the async body.
        parse_listings(&body, &self.base_url)
    }
}

/// Extracts result anchors from a search page. Title is the anchor text;
/// the resolved link doubles as `source_id`.
pub fn parse_listings(html: &str, base_url: &Url) -> Result<Vec<RawListing>, FetchError> {
    let selector =
        Selector::parse(RESULT_ANCHORS).map_err(|e| FetchError::Shape(e.to_string()))?;
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut listings = Vec::new();
    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(url) = base_url.join(href) else {
            continue;
        };
        let url = url.to_string();
        if !seen.insert(url.clone()) {
            continue;
        }

        let title = anchor
            .text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ");

        listings.push(RawListing {
            title: Some(title).filter(|t| !t.is_empty()),
            url: Some(url.clone()),
            source_id: Some(url),
            ..Default::default()
        });
    }
    Ok(listings)
}
