//! `sitemap` command: shard tasks over sitemap XML files

use super::run::{execute_harvest, HarvestJob, OutputArgs, SnapshotArgs};
use super::{Cli, CliError};
use crate::extract::{ExtractError, Payload, PayloadFormat};
use crate::fetcher::{Endpoint, FetchError, FetchResult, ReqwestTransport, TaskFetcher, Transport};
use crate::harvest::{enumerate_shard_tasks, HarvestExecutor, HarvestOptions};
use crate::registry::{Catalog, SourceSpec};
use crate::shutdown::SharedShutdown;
use crate::FetchTask;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default concurrent shard fetches
const DEFAULT_SHARD_WORKERS: usize = 8;

/// Arguments for the sitemap command
#[derive(Args, Debug, Clone)]
pub struct SitemapArgs {
    /// Catalog source
    #[arg(long, default_value = "apple-sitemap")]
    pub source: String,

    /// Shard URLs to fetch (comma separated); skips the sitemap index
    #[arg(long, value_delimiter = ',')]
    pub shards: Vec<String>,

    /// Sitemap index listing the shards (defaults to the source's index)
    #[arg(long, conflicts_with = "shards")]
    pub index_url: Option<String>,

    /// Fetch only the first N shards of the index
    #[arg(long)]
    pub limit: Option<usize>,

    /// Concurrent shard fetches
    #[arg(long, default_value_t = DEFAULT_SHARD_WORKERS)]
    pub workers: usize,

    /// Pause between shard dispatches in milliseconds
    #[arg(long, default_value_t = 0)]
    pub delay_ms: u64,

    /// Output destinations
    #[command(flatten)]
    pub outputs: OutputArgs,

    /// Snapshot to reconcile against
    #[command(flatten)]
    pub snapshot: SnapshotArgs,
}

impl SitemapArgs {
    /// Scheduling options described by the flags
    pub fn options(&self, cli: &Cli) -> HarvestOptions {
        let base = if self.workers <= 1 {
            HarvestOptions::sequential()
        } else {
            HarvestOptions::parallel(self.workers)
        };
        cli.tune(base).with_task_delay(Duration::from_millis(self.delay_ms))
    }

    /// Execute the sitemap command
    pub async fn execute(&self, cli: &Cli, catalog: &Catalog, shutdown: SharedShutdown) -> Result<(), CliError> {
        let source = catalog.source(&self.source)?;
        let options = self.options(cli);

        let shard_urls = if self.shards.is_empty() {
            let index = self
                .index_url
                .as_deref()
                .or_else(|| source.index_url())
                .ok_or_else(|| {
                    CliError::InvalidArgument(format!(
                        "source {} has no sitemap index; pass --shards or --index-url",
                        source.name()
                    ))
                })?;
            fetch_index(source, catalog.user_agent(), index, &options, shutdown.clone()).await?
        } else {
            self.shards.clone()
        };

        let mut tasks = enumerate_shard_tasks(shard_urls);
        if let Some(limit) = self.limit {
            tasks.truncate(limit);
        }
        if tasks.is_empty() {
            return Err(CliError::InvalidArgument("no sitemap shards to fetch".to_string()));
        }
        info!(source = source.name(), shards = tasks.len(), "Starting sitemap harvest");

        let executor = HarvestExecutor::for_source_with_agent(source, catalog.user_agent(), options)?
            .with_shutdown(shutdown)
            .with_progress(cli.show_progress());

        let job = HarvestJob {
            executor,
            tasks,
            id_column: source.id_column(),
            country_names: catalog.country_names(),
        };
        execute_harvest(job, &self.outputs, &self.snapshot, cli.output_format).await
    }
}

/// Fetch a sitemap index and return the shard URLs it lists
///
/// Retry backoffs end early once `shutdown` is requested.
async fn fetch_index(
    source: &SourceSpec,
    user_agent: &str,
    index_url: &str,
    options: &HarvestOptions,
    shutdown: SharedShutdown,
) -> Result<Vec<String>, CliError> {
    info!(index = index_url, "Fetching sitemap index");
    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(user_agent, PayloadFormat::Xml));
    let fetcher = index_fetcher(source, transport, shutdown)?;
    shard_urls(fetcher.fetch(&FetchTask::shard(index_url), &options.fetch).await)
}

/// Fetcher for a sitemap index document
fn index_fetcher(
    source: &SourceSpec,
    transport: Arc<dyn Transport>,
    shutdown: SharedShutdown,
) -> Result<TaskFetcher, CliError> {
    let endpoint = Endpoint::new("{url}")?;
    Ok(TaskFetcher::new(source.name(), transport, endpoint, PayloadFormat::Xml).with_shutdown(shutdown))
}

/// Shard URLs from an index fetch outcome
pub fn shard_urls(result: FetchResult) -> Result<Vec<String>, CliError> {
    match result {
        FetchResult::Success {
            payload: Payload::Locations(locations),
            ..
        } => {
            let urls: Vec<String> = locations
                .into_iter()
                .filter(|loc| loc.starts_with("http://") || loc.starts_with("https://"))
                .collect();
            if urls.is_empty() {
                warn!("Sitemap index lists no shards");
            }
            Ok(urls)
        }
        FetchResult::Success { .. } => Err(ExtractError::UnexpectedShape("sitemap index is not XML".to_string()).into()),
        FetchResult::RateLimited { retry_after, .. } => Err(FetchError::RateLimited { retry_after }.into()),
        FetchResult::Failure { error, .. } => Err(error.into()),
    }
}
