//! HTTP service access with exponential backoff retry logic.
//!
//! Every call the pipeline makes to an external service goes through this
//! module, so transient failures are handled the same way everywhere.
//!
//! # Architecture
//!
//! The module uses a trait-based design for flexibility:
//! - [`Transport`]: Core trait performing one HTTP exchange
//! - [`ReqwestTransport`]: The production transport built on `reqwest`
//! - [`RetryingClient`]: Decorator that adds retry logic to any `Transport`
//!
//! # Retry Strategy
//!
//! - `max_retries` retries after the first attempt (3 by default)
//! - Exponential backoff starting at the initial delay (1s, 2s, 4s, ...)
//! - Delay capped at `max_delay`
//! - Optional random jitter, off by default

use crate::errors::PipelineError;
use crate::utils::truncate_for_log;
use rand::{Rng, rng};
use reqwest::Method;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};
use url::Url;

/// Errors from a single HTTP exchange. These are always considered retryable.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The service answered with a non-2xx status.
    #[error("HTTP error! status: {status}")]
    Status { status: u16, body: String },

    /// The request never completed (DNS, TLS, connection, timeout) or the
    /// body was not JSON.
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
}

// Request URLs carry credentials in their query string, so the URL is
// stripped before the error can reach a log line or a user message.
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Request(err.without_url())
    }
}

/// One logical request to an external service.
#[derive(Clone)]
pub struct ServiceRequest {
    /// Short label used in logs, e.g. `extraction.status`.
    pub operation: &'static str,
    pub method: Method,
    pub url: Url,
    pub body: Option<Value>,
}

impl ServiceRequest {
    pub fn get(operation: &'static str, url: Url) -> Self {
        Self {
            operation,
            method: Method::GET,
            url,
            body: None,
        }
    }

    pub fn post_json(operation: &'static str, url: Url, body: Value) -> Self {
        Self {
            operation,
            method: Method::POST,
            url,
            body: Some(body),
        }
    }
}

// Query strings carry API keys, so only the path is ever printed.
impl fmt::Debug for ServiceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRequest")
            .field("operation", &self.operation)
            .field("method", &self.method)
            .field("host", &self.url.host_str())
            .field("path", &self.url.path())
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Trait for performing one HTTP exchange and decoding the JSON reply.
///
/// Implementors do not retry; wrap them in a [`RetryingClient`] for that.
pub trait Transport: Send + Sync {
    /// Send `request` once and return the decoded JSON body.
    fn send(
        &self,
        request: &ServiceRequest,
    ) -> impl Future<Output = Result<Value, TransportError>> + Send;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    #[instrument(level = "debug", skip_all, fields(operation = request.operation))]
    async fn send(&self, request: &ServiceRequest) -> Result<Value, TransportError> {
        let t0 = Instant::now();
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!(
                status = status.as_u16(),
                elapsed_ms = t0.elapsed().as_millis(),
                body = %truncate_for_log(&body, 300),
                "Service returned an error status"
            );
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body, 1000),
            });
        }

        let value = response.json::<Value>().await?;
        debug!(elapsed_ms = t0.elapsed().as_millis(), "Service call succeeded");
        Ok(value)
    }
}

/// Backoff parameters for [`RetryingClient`].
///
/// The delay before retry `n` (1-based) is:
/// ```text
/// delay = min(initial_delay * 2^(n-1), max_delay) + random_jitter(0..=max_jitter)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::ZERO,
        }
    }
}

/// Callback run once when a request exhausts its retries.
pub type ExhaustedHook = Arc<dyn Fn(&PipelineError) + Send + Sync>;

/// Wrapper that adds exponential backoff retry logic to any [`Transport`].
///
/// On final failure the request fails with
/// [`PipelineError::ServiceUnavailable`] carrying the last transport error,
/// and the exhaustion hook (if any) is invoked so the caller can clear its
/// loading indicator.
pub struct RetryingClient<T> {
    /// The underlying transport to wrap.
    inner: T,
    policy: RetryPolicy,
    on_exhausted: Option<ExhaustedHook>,
}

impl<T> RetryingClient<T>
where
    T: Transport,
{
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            on_exhausted: None,
        }
    }

    /// Install a callback that runs whenever a request exhausts its retries.
    pub fn with_exhausted_hook(mut self, hook: ExhaustedHook) -> Self {
        self.on_exhausted = Some(hook);
        self
    }

    /// Send `request` using the client's default retry policy.
    pub async fn send(&self, request: &ServiceRequest) -> Result<Value, PipelineError> {
        self.send_with(request, self.policy.max_retries, self.policy.initial_delay)
            .await
    }

    /// Send `request`, retrying up to `max_retries` times with the delay
    /// doubling after every failed attempt.
    #[instrument(level = "info", skip_all, fields(operation = request.operation))]
    pub async fn send_with(
        &self,
        request: &ServiceRequest,
        max_retries: usize,
        initial_delay: Duration,
    ) -> Result<Value, PipelineError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.send(request).await {
                Ok(resp) => {
                    return Ok(resp);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > max_retries {
                        error!(
                            attempt,
                            max = max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "API call failed after multiple retries"
                        );
                        let err = PipelineError::ServiceUnavailable {
                            operation: request.operation,
                            attempts: attempt,
                            source: e,
                        };
                        if let Some(hook) = &self.on_exhausted {
                            hook(&err);
                        }
                        return Err(err);
                    }

                    let delay = self.backoff_delay(initial_delay, attempt);
                    warn!(
                        attempt,
                        max = max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    fn backoff_delay(&self, initial_delay: Duration, attempt: usize) -> Duration {
        let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX).min(31);
        let delay = initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.policy.max_delay);
        let max_jitter_ms = u64::try_from(self.policy.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max_jitter_ms == 0 {
            return delay;
        }
        let jitter_ms: u64 = rng().random_range(0..=max_jitter_ms);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryingClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingClient")
            .field("policy", &self.policy)
            .field("has_exhausted_hook", &self.on_exhausted.is_some())
            .finish()
    }
}
