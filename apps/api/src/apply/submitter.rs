use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Submission request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Submission rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// The mechanism that actually submits an application.
#[async_trait]
pub trait ApplicationSubmitter: Send + Sync {
    async fn submit(&self, user_id: Uuid, job_id: Uuid) -> Result<(), SubmitError>;
}

#[derive(Serialize)]
struct SubmitPayload {
    user_id: Uuid,
    job_id: Uuid,
}

/// Delegates submission to an external service over HTTP.
/// Any non-2xx response counts as a failed attempt.
pub struct WebhookSubmitter {
    client: Client,
    url: String,
}

impl WebhookSubmitter {
    pub fn new(url: String, timeout: Duration) -> Result<Self, SubmitError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ApplicationSubmitter for WebhookSubmitter {
    async fn submit(&self, user_id: Uuid, job_id: Uuid) -> Result<(), SubmitError> {
        let response = self
            .client
            .post(&self.url)
            .json(&SubmitPayload { user_id, job_id })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SubmitError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }
        Ok(())
    }
}

/// Used when no webhook is configured.
pub struct DryRunSubmitter;

#[async_trait]
impl ApplicationSubmitter for DryRunSubmitter {
    async fn submit(&self, user_id: Uuid, job_id: Uuid) -> Result<(), SubmitError> {
        info!(user_id = %user_id, job_id = %job_id, "Dry-run submission (no APPLY_WEBHOOK_URL)");
        Ok(())
    }
}
