//! Run summary

use super::task::FetchTask;
use crate::fetcher::FetchResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Final status of one task after the retry pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Fetched and extracted at least one record
    Succeeded,
    /// Fetched but extracted nothing
    Empty,
    /// Still rate-limited after retries
    RateLimited,
    /// Terminal failure
    Failed,
}

impl TaskStatus {
    /// Classify a fetch outcome plus the number of records it produced
    pub fn of(result: &FetchResult, records: usize) -> Self {
        match result {
            FetchResult::Success { .. } if records == 0 => TaskStatus::Empty,
            FetchResult::Success { .. } => TaskStatus::Succeeded,
            FetchResult::RateLimited { .. } => TaskStatus::RateLimited,
            FetchResult::Failure { .. } => TaskStatus::Failed,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Empty => "empty",
            TaskStatus::RateLimited => "rate_limited",
            TaskStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A task that did not end in success
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Task label
    pub task: String,
    /// Final status
    pub kind: TaskStatus,
    /// Diagnostic message
    pub message: String,
    /// Attempts used across both passes
    pub attempts: u32,
}

/// Counts and diagnostics for one run
///
/// Task counts are over final statuses, so
/// `attempted == succeeded + empty + rate_limited + failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Source name
    pub source: String,
    /// Tasks dispatched at least once
    pub attempted: usize,
    /// Tasks that produced records
    pub succeeded: usize,
    /// Tasks that fetched fine but produced no records
    pub empty: usize,
    /// Tasks still rate-limited at the end
    pub rate_limited: usize,
    /// Tasks that failed terminally
    pub failed: usize,
    /// Tasks that joined the retry pass
    pub retried: usize,
    /// HTTP requests sent, including retries
    pub requests: u64,
    /// Records kept in the output list
    pub records: usize,
    /// Unique non-empty identifiers
    pub unique_ids: usize,
    /// Rows the relational sink inserted
    pub inserted: usize,
    /// Rows the relational sink rejected
    pub insert_errors: usize,
    /// Tasks never dispatched because the run was stopped
    pub skipped: usize,
    /// Whether the run stopped early
    pub cancelled: bool,
    /// Why the run stopped early
    pub cancel_reason: Option<String>,
    /// Wall-clock duration in milliseconds
    pub elapsed_ms: u64,
    /// 1-based dispatch index of the first rate-limited task, if any
    pub first_rate_limited: Option<usize>,
    /// Non-successful tasks with messages
    pub failures: Vec<TaskFailure>,
    /// Records kept per task label
    pub per_task: BTreeMap<String, usize>,
}

impl RunSummary {
    /// Empty summary for `source`
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Fold in the final status of one task
    ///
    /// The status is classified on the records the task `extracted`; `kept`
    /// is what survived deduplication and is what `per_task` reports. A
    /// task whose records were all seen earlier still counts as succeeded.
    pub fn record_final(
        &mut self,
        task: &FetchTask,
        result: &FetchResult,
        extracted: usize,
        kept: usize,
        attempts: u32,
    ) {
        self.attempted += 1;
        let status = TaskStatus::of(result, extracted);
        match status {
            TaskStatus::Succeeded => self.succeeded += 1,
            TaskStatus::Empty => self.empty += 1,
            TaskStatus::RateLimited => self.rate_limited += 1,
            TaskStatus::Failed => self.failed += 1,
        }
        self.per_task.insert(task.to_string(), kept);

        if let Some(message) = result.error_message() {
            self.failures.push(TaskFailure {
                task: task.to_string(),
                kind: status,
                message,
                attempts,
            });
        }
    }

    /// Requests per second over the run
    pub fn requests_per_second(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return 0.0;
        }
        self.requests as f64 / (self.elapsed_ms as f64 / 1000.0)
    }

    /// Whether the per-status counts add up to the attempted count
    pub fn is_consistent(&self) -> bool {
        self.attempted == self.succeeded + self.empty + self.rate_limited + self.failed
    }
}
