//! CLI command implementations

pub mod charts;
pub mod compare;
pub mod error;
pub mod report;
pub mod run;
pub mod sitemap;
pub mod sources;
pub mod stress;

pub use charts::ChartsArgs;
pub use compare::CompareArgs;
pub use error::CliError;
pub use run::{OutputArgs, SnapshotArgs};
pub use sitemap::SitemapArgs;
pub use sources::SourcesCommand;
pub use stress::StressArgs;

use crate::harvest::config::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS};
use crate::harvest::HarvestOptions;
use crate::registry::Catalog;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Podcast chart harvester CLI
#[derive(Parser, Debug)]
#[command(name = "chart-harvester")]
#[command(about = "Bulk-fetch podcast charts, deduplicate show identifiers and reconcile against snapshots", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Maximum number of retries per task (0-20)
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_RETRIES, value_parser = clap::value_parser!(u32).range(0..=20))]
    pub max_retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=300))]
    pub timeout_secs: u64,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Catalog file whose sources and country names override the embedded ones
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,
}

impl Cli {
    /// Embedded catalog merged with `--catalog`, if given
    pub fn load_catalog(&self) -> Result<Catalog, CliError> {
        Ok(Catalog::with_override(self.catalog.as_deref())?)
    }

    /// Apply the global retry and timeout flags to `options`
    pub fn tune(&self, options: HarvestOptions) -> HarvestOptions {
        options
            .with_max_retries(self.max_retries)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }

    /// Whether to draw progress bars
    pub fn show_progress(&self) -> bool {
        matches!(self.output_format, OutputFormat::Human)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch country x category chart pages
    Charts(ChartsArgs),

    /// Fetch sitemap shards and collect numeric show identifiers
    Sitemap(SitemapArgs),

    /// Reconcile an identifier file against a snapshot
    Compare(CompareArgs),

    /// Hammer one endpoint in parallel until the first 429
    Stress(StressArgs),

    /// List catalog sources, tiers and countries
    Sources(SourcesCommand),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("human".parse::<OutputFormat>().unwrap(), OutputFormat::Human);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_global_flags_apply_to_options() {
        let cli = Cli::try_parse_from([
            "chart-harvester",
            "--max-retries",
            "0",
            "--timeout-secs",
            "2",
            "sources",
        ])
        .unwrap();
        let options = cli.tune(HarvestOptions::sequential());
        assert_eq!(options.fetch.retry.max_attempts(), 1);
        assert_eq!(options.fetch.timeout, Duration::from_secs(2));
        assert!(cli.show_progress());
    }

    #[test]
    fn test_max_retries_range() {
        let result = Cli::try_parse_from(["chart-harvester", "--max-retries", "50", "sources"]);
        assert!(result.is_err());
    }
}
