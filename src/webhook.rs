//! Delivery of enriched jobs to the caller-provided webhook, one POST per
//! job with bounded exponential backoff.

use std::time::Duration;

use rand::Rng;

use crate::models::job::EnrichedJob;

pub const MAX_ATTEMPTS: u32 = 3;
pub const BASE_DELAY: Duration = Duration::from_secs(1);
const BACKOFF_FACTOR: u32 = 2;
const MAX_JITTER_MS: u64 = 250;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook request failed: {0}")]
    Request(String),

    #[error("webhook returned {0}")]
    Status(u16),
}

pub struct WebhookEmitter {
    http: reqwest::Client,
    url: String,
    max_attempts: u32,
    base_delay: Duration,
}

impl WebhookEmitter {
    pub fn new(
        url: String,
        timeout: Duration,
        max_attempts: u32,
        base_delay: Duration,
    ) -> Result<WebhookEmitter, WebhookError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WebhookError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(WebhookEmitter {
            http,
            url,
            max_attempts: max_attempts.max(1),
            base_delay,
        })
    }

    /// POST one enriched job. Retries transient failures with exponential
    /// backoff and jitter; the final error is the caller's to count. The
    /// emitter keeps no delivery state, so idempotency on re-POST belongs
    /// to the receiver.
    pub async fn deliver(&self, job: &EnrichedJob) -> Result<(), WebhookError> {
        let mut delay = self.base_delay;
        let mut attempt = 1;

        loop {
            match self.post(job).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    tracing::warn!(
                        job_id = %job.job.job_id,
                        attempt,
                        error = %err,
                        "webhook delivery failed, retrying"
                    );
                    tokio::time::sleep(delay + jitter()).await;
                    delay *= BACKOFF_FACTOR;
                    attempt += 1;
                }
            }
        }
    }

    async fn post(&self, job: &EnrichedJob) -> Result<(), WebhookError> {
        let response = self
            .http
            .post(&self.url)
            .json(job)
            .send()
            .await
            .map_err(|e| WebhookError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebhookError::Status(status.as_u16()));
        }
        Ok(())
    }
}

fn jitter() -> Duration {
    Duration::from_millis(rand::rng().random_range(0..=MAX_JITTER_MS))
}
