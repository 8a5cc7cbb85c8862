//! Harvest configuration constants and retry policy

use crate::fetcher::FetchError;
use std::fmt;
use std::time::Duration;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000; // 30 seconds

/// Longest server-requested `Retry-After` wait honored before a retry.
pub const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Delay inserted between tasks in sequential runs, in milliseconds.
pub const SEQUENTIAL_DELAY_MS: u64 = 500;

/// Default parallel worker count.
pub const DEFAULT_WORKERS: usize = 50;

/// Upper bound on parallel workers.
pub const MAX_WORKERS: usize = 200;

/// Consecutive rate-limited tasks that stop an abort-on-429 run.
pub const RATE_LIMIT_ABORT_THRESHOLD: u32 = 3;

/// Upper bound for the adaptive pacer delay, in milliseconds.
pub const PACER_MAX_DELAY_MS: u64 = 30_000;

/// Consecutive successes before the adaptive pacer shrinks its delay.
pub const PACER_RECOVERY_STREAK: u32 = 10;

/// Flush interval for CSV writers (flush every N rows)
pub const FLUSH_INTERVAL: usize = 1_000;

/// Maps a 1-based retry number to the wait before that retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// Same delay before every retry
    Fixed(Duration),
    /// `base * retry`, capped at `max`
    Linear {
        /// Delay before the first retry
        base: Duration,
        /// Cap
        max: Duration,
    },
    /// `base * 2^(retry - 1)`, capped at `max`
    Exponential {
        /// Delay before the first retry
        base: Duration,
        /// Cap
        max: Duration,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base: Duration::from_millis(INITIAL_BACKOFF_MS),
            max: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (1 = first retry)
    pub fn delay(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        match *self {
            BackoffPolicy::Fixed(delay) => delay,
            BackoffPolicy::Linear { base, max } => base.saturating_mul(retry).min(max),
            BackoffPolicy::Exponential { base, max } => {
                let factor = 2u32.checked_pow(retry - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Predicate deciding whether an error is worth another attempt
pub type Retryable = fn(&FetchError) -> bool;

/// Retry policy shared by every fetch call site
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Wait before each retry
    pub backoff: BackoffPolicy,
    /// Which errors are retried
    pub retryable: Retryable,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: BackoffPolicy::default(),
            retryable: FetchError::is_retryable,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Override the retry count
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the backoff policy
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Override the retryable predicate
    pub fn with_retryable(mut self, retryable: Retryable) -> Self {
        self.retryable = retryable;
        self
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether attempt number `attempt` (1-based) that failed with `error` gets another try
    pub fn should_retry(&self, error: &FetchError, attempt: u32) -> bool {
        attempt < self.max_attempts() && (self.retryable)(error)
    }
}

/// What a run does when tasks come back rate-limited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitResponse {
    /// Stop dispatching after this many consecutive rate-limited tasks
    Abort {
        /// Consecutive rate-limited outcomes that trip the stop
        after_consecutive: u32,
    },
    /// Keep going, stretching the inter-task delay
    #[default]
    SlowDown,
}
