//! Run observability metrics
//!
//! Counters and histograms for requests, 429 responses, retries, task
//! outcomes and sink rows.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Optional Prometheus exporter for a scrape endpoint (`--metrics-addr`)
//! - Without an installed recorder every call is a no-op

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: later calls are ignored.
///
/// # Arguments
/// * `addr` - Socket address to bind the Prometheus scrape endpoint (e.g., "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to chart endpoints"
    );
    describe_counter!(
        "http_429_errors_total",
        Unit::Count,
        "Total number of 429 rate limit responses received"
    );
    describe_counter!("http_retries_total", Unit::Count, "Total number of retry attempts");
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );
    describe_counter!("tasks_completed_total", Unit::Count, "Tasks fetched successfully");
    describe_counter!("tasks_failed_total", Unit::Count, "Tasks that failed terminally");
    describe_counter!("records_extracted_total", Unit::Count, "Records extracted from payloads");
    describe_counter!("sink_rows_inserted_total", Unit::Count, "Rows written to the relational sink");
    describe_counter!("sink_row_errors_total", Unit::Count, "Rows the relational sink rejected");

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Record an HTTP request with timing
pub struct HttpRequestMetrics {
    source: String,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording a new HTTP request
    pub fn start(source: impl Into<String>, attempt: u32) -> Self {
        let source = source.into();
        let correlation_id = generate_correlation_id();

        debug!(
            correlation_id = %correlation_id,
            source = %source,
            attempt = attempt,
            "Starting HTTP request metrics"
        );

        Self {
            source,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record completion of the HTTP request
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "source" => self.source.clone(),
            "status" => status_code.to_string(),
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "source" => self.source.clone(),
        )
        .record(duration.as_secs_f64());

        if status_code == 429 {
            counter!(
                "http_429_errors_total",
                "source" => self.source.clone(),
            )
            .increment(1);

            warn!(
                correlation_id = %self.correlation_id,
                source = %self.source,
                attempt = self.attempt,
                duration_ms = duration.as_millis() as u64,
                "Rate limit error (429) recorded"
            );
        }

        debug!(
            correlation_id = %self.correlation_id,
            source = %self.source,
            status = status_code,
            duration_ms = duration.as_millis() as u64,
            "HTTP request completed"
        );
    }

    /// Record a network error or timeout (no status code)
    pub fn record_network_error(&self, kind: &'static str) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "source" => self.source.clone(),
            "status" => kind,
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "source" => self.source.clone(),
        )
        .record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            source = %self.source,
            attempt = self.attempt,
            kind = kind,
            duration_ms = duration.as_millis() as u64,
            "Request failed without a response"
        );
    }

    /// Get the correlation ID for this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record retry backoff duration
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!(
        "http_retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!("retry_backoff_duration_seconds").record(duration.as_secs_f64());

    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis() as u64,
        "Retry backoff recorded"
    );
}

/// Record the terminal outcome of one task
pub fn record_task_outcome(source: &str, succeeded: bool, records: usize) {
    if succeeded {
        counter!("tasks_completed_total", "source" => source.to_string()).increment(1);
        counter!("records_extracted_total", "source" => source.to_string()).increment(records as u64);
    } else {
        counter!("tasks_failed_total", "source" => source.to_string()).increment(1);
    }
}

/// Record one relational-sink batch
pub fn record_sink_batch(inserted: usize, errors: usize) {
    counter!("sink_rows_inserted_total").increment(inserted as u64);
    if errors > 0 {
        counter!("sink_row_errors_total").increment(errors as u64);
    }
}

/// Metrics setup errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed (address in use, recorder already set)
    #[error("failed to install Prometheus exporter: {0}")]
    Install(String),
}
