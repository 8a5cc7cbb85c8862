//! CLI error types and conversions

use crate::extract::ExtractError;
use crate::fetcher::FetchError;
use crate::harvest::HarvestError;
use crate::metrics::MetricsError;
use crate::output::OutputError;
use crate::registry::RegistryError;
use crate::snapshot::SnapshotError;

/// CLI errors
///
/// Anything reaching `main` as a `CliError` ends the process with exit
/// status 1. Per-task fetch failures never get here; they live in the run
/// summary.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Registry error
    #[error("registry error: {0}")]
    RegistryError(#[from] RegistryError),

    /// Harvest error (bad source definition or fatal sink failure)
    #[error("harvest error: {0}")]
    HarvestError(#[from] HarvestError),

    /// Fetch error outside a harvest run (sitemap index)
    #[error("fetch error: {0}")]
    FetchError(#[from] FetchError),

    /// Payload error outside a harvest run
    #[error("extract error: {0}")]
    ExtractError(#[from] ExtractError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Snapshot error
    #[error("snapshot error: {0}")]
    SnapshotError(#[from] SnapshotError),

    /// Metrics exporter error
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
