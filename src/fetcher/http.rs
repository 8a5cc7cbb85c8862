//! reqwest-backed transport
//!
//! A single HTTP client is shared by every transport so connection pooling
//! works across all tasks of a run.

use super::{FetchError, RawResponse, Transport};
use crate::extract::PayloadFormat;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, RETRY_AFTER, USER_AGENT};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// HTTP connect timeout (seconds) - time to establish TCP connection
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// `User-Agent` sent when the catalog does not name one
pub const DEFAULT_USER_AGENT: &str = concat!("chart-harvester/", env!("CARGO_PKG_VERSION"));

/// Global HTTP client shared by all transports
///
/// No client-wide request timeout is set: every request carries the
/// caller's per-task timeout instead.
pub static GLOBAL_HTTP_CLIENT: Lazy<Arc<Client>> = Lazy::new(|| {
    Arc::new(
        Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .gzip(true)
            .build()
            .unwrap_or_else(|e| {
                panic!("FATAL: Failed to build HTTP client: {}. Check system TLS configuration.", e);
            }),
    )
});

/// Get the global HTTP client
pub fn global_http_client() -> Arc<Client> {
    GLOBAL_HTTP_CLIENT.clone()
}

/// [`Transport`] issuing real GET requests
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Arc<Client>,
    user_agent: String,
    accept: &'static str,
    headers: HeaderMap,
}

impl ReqwestTransport {
    /// Transport on the shared client with the given `User-Agent` and an
    /// `Accept` header matching `format`
    pub fn new(user_agent: impl Into<String>, format: PayloadFormat) -> Self {
        Self::with_client(global_http_client(), user_agent, format)
    }

    /// Transport on an explicit client
    pub fn with_client(client: Arc<Client>, user_agent: impl Into<String>, format: PayloadFormat) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            accept: format.accept_header(),
            headers: HeaderMap::new(),
        }
    }

    /// Send `headers` with every request, replacing any default of the
    /// same name (API keys, auth timestamps)
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Extra headers sent with every request
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Parse `Name: value` lines into a header map
///
/// # Errors
///
/// Returns [`FetchError::InvalidHeader`] for a line without a colon or with
/// an invalid name or value.
pub fn parse_headers<S: AsRef<str>>(lines: &[S]) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();
    for line in lines {
        let line = line.as_ref();
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FetchError::InvalidHeader(format!("{line}: expected `Name: value`")))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| FetchError::InvalidHeader(format!("{line}: {e}")))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|e| FetchError::InvalidHeader(format!("{line}: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<RawResponse, FetchError> {
        debug!(url = %url, timeout_ms = timeout.as_millis() as u64, "GET");

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, self.accept)
            .headers(self.headers.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after_header(response.headers(), Utc::now());
        let body = response.bytes().await.map_err(|e| classify(e, timeout))?.to_vec();

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::Network(err.to_string())
    }
}

fn parse_retry_after_header(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after(value, now)
}

/// Parse a `Retry-After` value: delta-seconds or an HTTP date
///
/// Dates in the past yield a zero wait.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
