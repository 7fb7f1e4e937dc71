//! Extraction job poller for the Apify web scraper.
//!
//! Extraction is an asynchronous job: the scraper is started against the
//! article URL, polled until it finishes, and its dataset is then read back.
//!
//! ```text
//! SUBMIT ──► POLLING ──► EXTRACTED
//!               │
//!               ├──► JOB_FAILED  (FAILED / ABORTED)
//!               └──► TIMED_OUT   (no terminal status within the timeout)
//! ```
//!
//! # Endpoints
//!
//! - `POST {base}/v2/acts/{actor}/runs?token=…` starts the job
//! - `GET {base}/v2/actor-runs/{id}?token=…` reports its status
//! - `GET {base}/v2/datasets/{dataset}/items?token=…` returns its records

use crate::api::{RetryingClient, ServiceRequest, Transport};
use crate::config::ExtractionSettings;
use crate::errors::PipelineError;
use crate::models::{ArticleRecord, ExtractedItem, ExtractionJob, JobStatus, Provenance, RunEnvelope};
use crate::prompts::PAGE_FUNCTION;
use crate::utils::headline_rejection;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Runs extraction jobs and turns their results into [`ArticleRecord`]s.
pub struct ExtractionPoller<T> {
    client: Arc<RetryingClient<T>>,
    settings: ExtractionSettings,
    token: String,
}

impl<T> ExtractionPoller<T>
where
    T: Transport,
{
    pub fn new(client: Arc<RetryingClient<T>>, settings: ExtractionSettings, token: &str) -> Self {
        Self {
            client,
            settings,
            token: token.to_string(),
        }
    }

    /// Submit, poll, and fetch in one go.
    pub async fn extract(&self, article_url: &str) -> Result<ArticleRecord, PipelineError> {
        let job = self.submit(article_url).await?;
        let job = self.await_completion(job).await?;
        self.fetch_article(&job, article_url).await
    }

    /// Start an extraction job for `article_url`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::SubmissionError`] when the service accepts the request
    /// but returns no job id or results location.
    #[instrument(level = "info", skip_all, fields(%article_url))]
    pub async fn submit(&self, article_url: &str) -> Result<ExtractionJob, PipelineError> {
        let url = self.endpoint(&format!("v2/acts/{}/runs", self.settings.actor))?;
        let payload = json!({
            "startUrls": [{ "url": article_url }],
            "pageFunction": PAGE_FUNCTION,
        });
        let value = self
            .client
            .send(&ServiceRequest::post_json("extraction.submit", url, payload))
            .await?;

        let data = serde_json::from_value::<RunEnvelope>(value)
            .map(|e| e.data)
            .unwrap_or_default();
        let (Some(job_id), Some(results_location)) = (
            data.id.filter(|id| !id.is_empty()),
            data.defaultDatasetId.filter(|ds| !ds.is_empty()),
        ) else {
            warn!("Extraction service returned no job id");
            return Err(PipelineError::SubmissionError);
        };

        info!(%job_id, "Extraction job submitted");
        Ok(ExtractionJob {
            job_id,
            results_location,
            status: data.status.unwrap_or(JobStatus::Pending),
            submitted_at: Utc::now(),
        })
    }

    /// Poll `job` until it reaches a terminal status or the timeout elapses.
    ///
    /// The timeout is measured from the moment polling starts, which directly
    /// follows submission.
    #[instrument(level = "info", skip_all, fields(job_id = %job.job_id))]
    pub async fn await_completion(
        &self,
        mut job: ExtractionJob,
    ) -> Result<ExtractionJob, PipelineError> {
        let started = Instant::now();
        let timeout = self.settings.timeout();
        let url = self.endpoint(&format!("v2/actor-runs/{}", job.job_id))?;
        let request = ServiceRequest::get("extraction.status", url);
        let mut polls = 0usize;

        loop {
            let elapsed = started.elapsed();
            if elapsed > timeout {
                warn!(polls, ?elapsed, "Extraction job timed out");
                return Err(PipelineError::TimedOut {
                    job_id: job.job_id,
                    elapsed,
                });
            }

            let value = self.client.send(&request).await?;
            polls += 1;
            job.status = serde_json::from_value::<RunEnvelope>(value)
                .ok()
                .and_then(|e| e.data.status)
                .unwrap_or(JobStatus::Pending);
            debug!(polls, status = %job.status, "Polled extraction job");

            if !job.status.is_terminal() {
                sleep(self.settings.poll_interval()).await;
                continue;
            }
            match job.status {
                JobStatus::Succeeded => {
                    info!(
                        polls,
                        elapsed_ms = started.elapsed().as_millis(),
                        submitted_at = %job.submitted_at,
                        "Extraction job succeeded"
                    );
                    return Ok(job);
                }
                _ => {
                    warn!(polls, status = %job.status, "Extraction job failed");
                    return Err(PipelineError::JobFailed {
                        job_id: job.job_id,
                        status: job.status,
                    });
                }
            }
        }
    }

    /// Read the first record of a finished job and validate its headline.
    #[instrument(level = "info", skip_all, fields(job_id = %job.job_id))]
    pub async fn fetch_article(
        &self,
        job: &ExtractionJob,
        article_url: &str,
    ) -> Result<ArticleRecord, PipelineError> {
        let url = self.endpoint(&format!("v2/datasets/{}/items", job.results_location))?;
        let value = self
            .client
            .send(&ServiceRequest::get("extraction.results", url))
            .await?;

        let items: Vec<ExtractedItem> = serde_json::from_value(value).unwrap_or_default();
        let Some(item) = items.into_iter().next() else {
            return Err(PipelineError::InvalidExtraction {
                reason: "empty result set".to_string(),
            });
        };

        let headline = item.headline.unwrap_or_default();
        if let Some(reason) = headline_rejection(&headline) {
            warn!(%headline, reason, "Rejected extracted headline");
            return Err(PipelineError::InvalidExtraction {
                reason: reason.to_string(),
            });
        }

        let headline = headline.trim().to_string();
        let display_title = item
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| headline.clone());
        info!(%headline, "Extracted headline");

        Ok(ArticleRecord {
            source_url: article_url.to_string(),
            headline,
            display_title,
            provenance: Provenance::Extracted,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PipelineError> {
        let mut url = Url::parse(&format!(
            "{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            path
        ))?;
        url.query_pairs_mut().append_pair("token", &self.token);
        Ok(url)
    }
}
