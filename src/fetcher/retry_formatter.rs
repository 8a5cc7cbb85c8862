//! Retry message formatting.
//!
//! Keeps retry, recovery and terminal-failure log lines consistent across
//! every fetch call site.

use super::FetchError;
use std::time::Duration;

/// Classification of retry errors for user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Request did not complete within the per-task timeout
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// HTTP 404
    NotFound,
    /// Other client errors (4xx, except 429)
    ClientError(u16),
    /// 200 with an unexpected body
    Parse,
    /// Template could not produce a URL, or a request header was malformed
    Endpoint,
}

impl RetryErrorType {
    /// Classify a fetch error.
    pub fn from_error(error: &FetchError) -> Self {
        match error {
            FetchError::Timeout(_) => Self::NetworkTimeout,
            FetchError::Network(_) => Self::NetworkOffline,
            FetchError::RateLimited { .. } => Self::RateLimit,
            FetchError::Status { status: 404, .. } => Self::NotFound,
            FetchError::Status { status, .. } if *status >= 500 => Self::ServerError(*status),
            FetchError::Status { status, .. } => Self::ClientError(*status),
            FetchError::Parse(_) => Self::Parse,
            FetchError::InvalidEndpoint(_) | FetchError::InvalidHeader(_) => Self::Endpoint,
        }
    }

    /// User-friendly description string used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::NotFound => "chart not found",
            Self::ClientError(_) => "client error",
            Self::Parse => "unexpected response body",
            Self::Endpoint => "invalid endpoint",
        }
    }

    /// Suggested remediation presented with actionable guidance after failures.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Increase --timeout-secs or check your network connection",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::RateLimit => "Lower --workers or raise --delay-ms, then retry later",
            Self::ServerError(_) => "The chart service may be degraded, try again later",
            Self::NotFound => "Check that the category exists for this country",
            Self::ClientError(_) => "Review the endpoint template and task parameters",
            Self::Parse => "The endpoint may have changed its response format",
            Self::Endpoint => "Fix the endpoint template in the catalog",
        }
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Type of error that triggered retry
    pub error_type: RetryErrorType,
    /// Backoff duration until next attempt
    pub backoff_duration: Duration,
    /// Task label (e.g. "US - top")
    pub task: String,
    /// Original error message for details
    pub error_message: String,
    /// URL that failed
    pub endpoint: String,
}

impl RetryContext {
    /// Build a context from the error of a failed attempt.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        error: &FetchError,
        backoff_duration: Duration,
        task: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type: RetryErrorType::from_error(error),
            backoff_duration,
            task: task.into(),
            error_message: error.to_string(),
            endpoint: endpoint.into(),
        }
    }

    /// Format standardized retry message with attempt counters and context.
    pub fn format_retry(&self) -> String {
        let mut message = format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.attempt + 1,
            self.max_attempts,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64()
        );
        append_task(&mut message, &self.task);
        message
    }

    /// Format retry success message when a previous attempt eventually works.
    pub fn format_success(&self) -> String {
        let mut message = format!(
            "Retry attempt {}/{} succeeded",
            self.attempt, self.max_attempts
        );
        append_task(&mut message, &self.task);
        message
    }

    /// Format final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("[FAILED] Fetch failed after {} attempts", self.attempt));
        lines.push(format!("  Last error: {}", self.error_message));

        let task_display = if self.task.is_empty() { "unknown" } else { &self.task };
        lines.push(format!("  Task: {task_display}"));
        lines.push(format!("  Endpoint: {}", self.endpoint));
        lines.push("  Suggestions:".to_string());

        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }

        lines.join("\n")
    }

    /// Derive suggestions tailored to the current retry context.
    pub fn format_suggestions(&self) -> Vec<String> {
        let mut suggestions = vec![self.error_type.suggestion().to_string()];
        if self.attempt >= self.max_attempts {
            suggestions.push(format!(
                "Try increasing --max-retries (current: {})",
                self.max_attempts.saturating_sub(1)
            ));
        }
        suggestions
    }
}

fn append_task(buffer: &mut String, task: &str) {
    if !task.is_empty() {
        buffer.push_str(" (");
        buffer.push_str(task);
        buffer.push(')');
    }
}
