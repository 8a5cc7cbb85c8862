//! Run reports in human and JSON form

use super::OutputFormat;
use crate::harvest::RunSummary;
use crate::reconcile::Delta;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::error;

/// Failures listed in human output before the rest are elided
const MAX_LISTED_FAILURES: usize = 20;

/// Delta sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeltaCounts {
    /// Identifiers only in the fresh set
    pub new_only: usize,
    /// Identifiers only in the snapshot
    pub snapshot_only: usize,
    /// Identifiers in both
    pub common: usize,
}

impl From<&Delta> for DeltaCounts {
    fn from(delta: &Delta) -> Self {
        Self {
            new_only: delta.new_only.len(),
            snapshot_only: delta.snapshot_only.len(),
            common: delta.common.len(),
        }
    }
}

/// Files a command wrote, keyed by role (`records`, `ids`, `delta`, ...)
#[derive(Debug, Clone, Default, Serialize)]
pub struct WrittenFiles(BTreeMap<&'static str, PathBuf>);

impl WrittenFiles {
    /// Record that `path` was written for `role`
    pub fn add(&mut self, role: &'static str, path: &Path) {
        self.0.insert(role, path.to_path_buf());
    }

    /// Whether nothing was written
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Print a harvest run report
pub fn output_run(
    format: OutputFormat,
    summary: &RunSummary,
    delta: Option<&Delta>,
    files: &WrittenFiles,
    failure: Option<&str>,
) {
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "success": failure.is_none(),
                "summary": summary,
                "delta": delta.map(DeltaCounts::from),
                "files": files,
                "error": failure,
            });
            print_json(&output);
        }
        OutputFormat::Human => output_run_human(summary, delta, files, failure),
    }
}

fn output_run_human(summary: &RunSummary, delta: Option<&Delta>, files: &WrittenFiles, failure: Option<&str>) {
    match failure {
        None if summary.cancelled => println!("\nHarvest stopped early ({})", reason(summary)),
        None => println!("\nHarvest completed"),
        Some(_) => eprintln!("\nHarvest aborted"),
    }
    println!("Source: {}", summary.source);
    println!("Tasks attempted: {}", summary.attempted);
    println!("  Succeeded: {}", summary.succeeded);
    println!("  Empty: {}", summary.empty);
    println!("  Rate limited: {}", summary.rate_limited);
    println!("  Failed: {}", summary.failed);
    if summary.retried > 0 {
        println!("  Retried at end of run: {}", summary.retried);
    }
    if summary.skipped > 0 {
        println!("  Not dispatched: {}", summary.skipped);
    }
    println!("Requests: {}", summary.requests);
    println!("Records: {}", summary.records);
    println!("Unique identifiers: {}", summary.unique_ids);
    if summary.inserted > 0 || summary.insert_errors > 0 {
        println!("Rows inserted: {}", summary.inserted);
        println!("Row errors: {}", summary.insert_errors);
    }
    println!("Elapsed: {:.1}s", summary.elapsed_ms as f64 / 1000.0);

    if let Some(delta) = delta {
        let counts = DeltaCounts::from(delta);
        println!(
            "Delta: {} new, {} snapshot only, {} common",
            counts.new_only, counts.snapshot_only, counts.common
        );
    }
    for (role, path) in &files.0 {
        println!("Wrote {role}: {}", path.display());
    }

    if !summary.failures.is_empty() {
        println!("\nUnsuccessful tasks:");
        for failure in summary.failures.iter().take(MAX_LISTED_FAILURES) {
            println!(
                "  [{}] {} ({} attempts): {}",
                failure.kind, failure.task, failure.attempts, failure.message
            );
        }
        if summary.failures.len() > MAX_LISTED_FAILURES {
            println!("  ... and {} more", summary.failures.len() - MAX_LISTED_FAILURES);
        }
    }

    if let Some(message) = failure {
        eprintln!("Error: {message}");
    }
}

/// Print a rate-limit probe report
pub fn output_stress(format: OutputFormat, summary: &RunSummary) {
    let rate_limited = summary.rate_limited;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "source": summary.source,
                "elapsed_ms": summary.elapsed_ms,
                "requests": summary.requests,
                "requests_per_second": summary.requests_per_second(),
                "succeeded": summary.succeeded,
                "rate_limited": rate_limited,
                "failed": summary.failed,
                "not_dispatched": summary.skipped,
                "first_rate_limited": summary.first_rate_limited,
            });
            print_json(&output);
        }
        OutputFormat::Human => {
            println!("\nRate-limit probe finished");
            println!("Source: {}", summary.source);
            println!("Elapsed: {:.2}s", summary.elapsed_ms as f64 / 1000.0);
            println!("Requests sent: {}", summary.requests);
            println!("Requests/sec: {:.2}", summary.requests_per_second());
            println!("Succeeded: {}", summary.succeeded);
            println!("Failed: {}", summary.failed);
            match summary.first_rate_limited {
                Some(index) => println!("First 429 at request #{index} ({rate_limited} rate limited in total)"),
                None => println!("No 429 observed"),
            }
            if summary.skipped > 0 {
                println!("Not dispatched after the boundary: {}", summary.skipped);
            }
        }
    }
}

/// Print a reconciliation report
pub fn output_compare(format: OutputFormat, fresh: usize, snapshot: usize, delta: &Delta, files: &WrittenFiles) {
    let counts = DeltaCounts::from(delta);
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "fresh": fresh,
                "snapshot": snapshot,
                "delta": counts,
                "files": files,
            });
            print_json(&output);
        }
        OutputFormat::Human => {
            println!("Fresh identifiers: {fresh}");
            println!("Snapshot identifiers: {snapshot}");
            println!("New: {}", counts.new_only);
            println!("Snapshot only: {}", counts.snapshot_only);
            println!("Common: {}", counts.common);
            for (role, path) in &files.0 {
                println!("Wrote {role}: {}", path.display());
            }
        }
    }
}

fn reason(summary: &RunSummary) -> &str {
    summary.cancel_reason.as_deref().unwrap_or("cancelled")
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => error!("Failed to serialize report: {}", e),
    }
}
