//! Retrying task fetcher

use super::retry_formatter::RetryContext;
use super::{Endpoint, FetchError, FetchResult, Transport};
use crate::extract::{Payload, PayloadFormat, DEFAULT_LIST_KEY};
use crate::harvest::config::{RetryPolicy, DEFAULT_TIMEOUT_SECS, MAX_RETRY_AFTER_SECS};
use crate::harvest::task::FetchTask;
use crate::metrics::{self, HttpRequestMetrics};
use crate::shutdown::SharedShutdown;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-call fetch settings
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Per-request timeout
    pub timeout: Duration,
    /// Retry policy
    pub retry: RetryPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Fetches one task at a time with bounded retries
///
/// Touches no shared mutable state: each call owns its attempt counter and
/// returns exactly one [`FetchResult`].
#[derive(Clone)]
pub struct TaskFetcher {
    source: String,
    transport: Arc<dyn Transport>,
    endpoint: Endpoint,
    format: PayloadFormat,
    list_key: String,
    shutdown: Option<SharedShutdown>,
}

impl TaskFetcher {
    /// Create a fetcher
    ///
    /// # Arguments
    /// * `source` - Source name used in logs and metric labels
    /// * `transport` - HTTP transport
    /// * `endpoint` - URL template
    /// * `format` - Expected payload format
    pub fn new(
        source: impl Into<String>,
        transport: Arc<dyn Transport>,
        endpoint: Endpoint,
        format: PayloadFormat,
    ) -> Self {
        Self {
            source: source.into(),
            transport,
            endpoint,
            format,
            list_key: DEFAULT_LIST_KEY.to_string(),
            shutdown: None,
        }
    }

    /// Override the key holding the record list in JSON objects
    pub fn with_list_key(mut self, list_key: impl Into<String>) -> Self {
        self.list_key = list_key.into();
        self
    }

    /// Abandon retry backoffs when shutdown is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Source name
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Endpoint template
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Fetch `task`, retrying per `options.retry`
    ///
    /// Retries are not attempted for errors the policy's predicate rejects
    /// (parse errors and 4xx by default). A 429 waits for the larger of the
    /// backoff delay and the server's `Retry-After`, the latter capped at
    /// [`MAX_RETRY_AFTER_SECS`]. When shutdown is
    /// requested during a backoff the last outcome is returned at once.
    pub async fn fetch(&self, task: &FetchTask, options: &FetchOptions) -> FetchResult {
        let url = match self.endpoint.url_for(task) {
            Ok(url) => url,
            Err(error) => return FetchResult::Failure { error, attempts: 0 },
        };
        let label = task.to_string();
        let max_attempts = options.retry.max_attempts();

        let mut attempt = 1;
        let mut previous: Option<FetchError> = None;
        loop {
            let started = Instant::now();
            let error = match self.attempt(&url, options.timeout, attempt).await {
                Ok(payload) => {
                    if let Some(previous) = &previous {
                        let ctx =
                            RetryContext::new(attempt, max_attempts, previous, Duration::ZERO, &label, &url);
                        info!("{}", ctx.format_success());
                    }
                    return FetchResult::Success {
                        payload,
                        latency: started.elapsed(),
                        attempts: attempt,
                    };
                }
                Err(error) => error,
            };

            if !options.retry.should_retry(&error, attempt) {
                if attempt > 1 || error.is_retryable() {
                    let ctx = RetryContext::new(attempt, max_attempts, &error, Duration::ZERO, &label, &url);
                    warn!("{}", ctx.format_failure());
                } else {
                    debug!(task = %label, error = %error, "Not retrying");
                }
                return terminal(error, attempt);
            }

            let mut backoff = options.retry.backoff.delay(attempt);
            if let FetchError::RateLimited {
                retry_after: Some(retry_after),
            } = &error
            {
                backoff = backoff.max(cap_retry_after(*retry_after, &label));
            }

            let ctx = RetryContext::new(attempt, max_attempts, &error, backoff, &label, &url);
            warn!(
                task = %label,
                attempt = attempt,
                backoff_ms = backoff.as_millis() as u64,
                "{}",
                ctx.format_retry()
            );
            metrics::record_retry_backoff(backoff, attempt);

            if self.sleep_or_cancel(backoff).await {
                debug!(task = %label, "Shutdown requested during backoff");
                return terminal(error, attempt);
            }
            previous = Some(error);
            attempt += 1;
        }
    }

    async fn attempt(&self, url: &str, timeout: Duration, attempt: u32) -> Result<Payload, FetchError> {
        let request_metrics = HttpRequestMetrics::start(&self.source, attempt);

        let response = match tokio::time::timeout(timeout, self.transport.get(url, timeout)).await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                request_metrics.record_network_error(network_kind(&error));
                return Err(error);
            }
            Err(_) => {
                request_metrics.record_network_error("timeout");
                return Err(FetchError::Timeout(timeout));
            }
        };
        request_metrics.record_complete(response.status);

        match response.status {
            200 => Payload::decode_bytes(&response.body, self.format, &self.list_key)
                .map_err(|e| FetchError::Parse(e.to_string())),
            429 => Err(FetchError::RateLimited {
                retry_after: response.retry_after,
            }),
            status => Err(FetchError::status(status, &String::from_utf8_lossy(&response.body))),
        }
    }

    /// Sleep for `delay`; returns true if shutdown was requested first
    async fn sleep_or_cancel(&self, delay: Duration) -> bool {
        let Some(shutdown) = &self.shutdown else {
            tokio::time::sleep(delay).await;
            return false;
        };
        if shutdown.is_shutdown_requested() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = shutdown.wait_for_shutdown() => true,
        }
    }
}

/// Clamp a server-requested wait to [`MAX_RETRY_AFTER_SECS`]
fn cap_retry_after(retry_after: Duration, label: &str) -> Duration {
    let cap = Duration::from_secs(MAX_RETRY_AFTER_SECS);
    if retry_after > cap {
        warn!(
            task = %label,
            retry_after_secs = retry_after.as_secs(),
            cap_secs = MAX_RETRY_AFTER_SECS,
            "Retry-After exceeds cap, waiting the cap instead"
        );
        return cap;
    }
    retry_after
}

fn terminal(error: FetchError, attempts: u32) -> FetchResult {
    match error {
        FetchError::RateLimited { retry_after } => FetchResult::RateLimited {
            retry_after,
            attempts,
        },
        error => FetchResult::Failure { error, attempts },
    }
}

fn network_kind(error: &FetchError) -> &'static str {
    match error {
        FetchError::Timeout(_) => "timeout",
        _ => "network_error",
    }
}
