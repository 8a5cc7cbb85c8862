//! HTTP fetching with bounded retries
//!
//! The [`Transport`] trait is the seam between the retry logic and the
//! network: production runs use [`http::ReqwestTransport`], tests script
//! responses in memory.

use crate::extract::Payload;
use async_trait::async_trait;
use std::time::Duration;

pub mod client;
pub mod endpoint;
pub mod http;
pub mod retry_formatter;

pub use client::{FetchOptions, TaskFetcher};
pub use endpoint::Endpoint;
pub use http::ReqwestTransport;

/// Longest response body excerpt kept in error messages
pub const BODY_SNIPPET_CHARS: usize = 200;

/// Fetch errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Connection refused, DNS failure, reset
    #[error("network error: {0}")]
    Network(String),

    /// No complete response within the per-request timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-200, non-429 status
    #[error("HTTP {status}: {snippet}")]
    Status {
        /// Status code
        status: u16,
        /// Leading part of the response body
        snippet: String,
    },

    /// HTTP 429
    #[error("rate limited (429)")]
    RateLimited {
        /// Server-provided `Retry-After`, if any
        retry_after: Option<Duration>,
    },

    /// 200 with a body that does not decode to the expected shape
    #[error("parse error: {0}")]
    Parse(String),

    /// Endpoint template could not produce a URL for the task
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Extra request header could not be parsed
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

impl FetchError {
    /// Default retry predicate: network trouble, timeouts, 429 and 5xx retry;
    /// parse errors and other 4xx do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout(_) | FetchError::RateLimited { .. } => {
                true
            }
            FetchError::Status { status, .. } => *status >= 500 || *status == 408,
            FetchError::Parse(_) | FetchError::InvalidEndpoint(_) | FetchError::InvalidHeader(_) => false,
        }
    }

    /// Build a status error, keeping a short excerpt of the body for diagnosis
    pub fn status(status: u16, body: &str) -> Self {
        FetchError::Status {
            status,
            snippet: snippet(body),
        }
    }
}

/// Collapse whitespace and cut a body down to [`BODY_SNIPPET_CHARS`]
pub fn snippet(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= BODY_SNIPPET_CHARS {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(BODY_SNIPPET_CHARS).collect();
    cut.push_str("...");
    cut
}

/// Status, `Retry-After` and body of one HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed `Retry-After` header
    pub retry_after: Option<Duration>,
    /// Raw response body; may still be gzip-compressed
    pub body: Vec<u8>,
}

impl RawResponse {
    /// 200 response with a body
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            retry_after: None,
            body: body.into(),
        }
    }

    /// Response with an arbitrary status and empty body
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            retry_after: None,
            body: Vec::new(),
        }
    }

    /// 429 response with an optional `Retry-After`
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            status: 429,
            retry_after,
            body: Vec::new(),
        }
    }
}

/// One GET request
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET against `url`, giving up after `timeout`
    async fn get(&self, url: &str, timeout: Duration) -> Result<RawResponse, FetchError>;
}

/// Outcome of fetching one task, after retries
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// 200 with a decodable body
    Success {
        /// Decoded body
        payload: Payload,
        /// Duration of the successful attempt
        latency: Duration,
        /// Attempts used, including the successful one
        attempts: u32,
    },
    /// Still rate-limited when retries ran out
    RateLimited {
        /// Last `Retry-After` the server sent
        retry_after: Option<Duration>,
        /// Attempts used
        attempts: u32,
    },
    /// Terminal failure
    Failure {
        /// Last error seen
        error: FetchError,
        /// Attempts used
        attempts: u32,
    },
}

impl FetchResult {
    /// Whether the fetch succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success { .. })
    }

    /// Whether the fetch ended rate-limited
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchResult::RateLimited { .. })
    }

    /// Attempts used
    pub fn attempts(&self) -> u32 {
        match self {
            FetchResult::Success { attempts, .. }
            | FetchResult::RateLimited { attempts, .. }
            | FetchResult::Failure { attempts, .. } => *attempts,
        }
    }

    /// Error message for unsuccessful outcomes
    pub fn error_message(&self) -> Option<String> {
        match self {
            FetchResult::Success { .. } => None,
            FetchResult::RateLimited { retry_after, .. } => Some(match retry_after {
                Some(wait) => format!("rate limited (429), retry after {}s", wait.as_secs()),
                None => "rate limited (429)".to_string(),
            }),
            FetchResult::Failure { error, .. } => Some(error.to_string()),
        }
    }
}
