//! `charts` command: country x category chart pages

use super::run::{execute_harvest, HarvestJob, OutputArgs, SnapshotArgs};
use super::{Cli, CliError};
use crate::fetcher::http::parse_headers;
use crate::fetcher::{ReqwestTransport, Transport};
use crate::harvest::config::SEQUENTIAL_DELAY_MS;
use crate::harvest::{
    enumerate_chart_tasks, CategoryPlan, HarvestExecutor, HarvestOptions, RateLimitResponse, UniquenessScope,
};
use crate::registry::{Catalog, SourceSpec};
use crate::shutdown::SharedShutdown;
use crate::FetchTask;
use clap::{Args, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Which records survive deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    /// Keep every record; identifiers are deduplicated in the id set only
    PerTask,
    /// Keep the first record seen for each identifier
    IdentifierOnly,
}

impl From<ScopeArg> for UniquenessScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::PerTask => UniquenessScope::PerTask,
            ScopeArg::IdentifierOnly => UniquenessScope::IdentifierOnly,
        }
    }
}

/// Arguments for the charts command
#[derive(Args, Debug, Clone)]
pub struct ChartsArgs {
    /// Catalog source
    #[arg(long, default_value = "spotify")]
    pub source: String,

    /// Country codes (comma separated); defaults to every country the source lists
    #[arg(long, value_delimiter = ',')]
    pub countries: Vec<String>,

    /// Restrict to the countries of these tiers (comma separated)
    #[arg(long, value_delimiter = ',', conflicts_with = "countries")]
    pub tiers: Vec<String>,

    /// Fetch these categories for every country instead of the tiered lists
    #[arg(long, value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Concurrent tasks; 1 runs sequentially with a pause between tasks
    #[arg(long, default_value_t = 1)]
    pub workers: usize,

    /// Pause between task dispatches in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Stretch the pause on 429s and relax it again on success
    #[arg(long, default_value_t = false)]
    pub adaptive: bool,

    /// Stop after this many consecutive rate-limited tasks instead of slowing down
    #[arg(long)]
    pub abort_after: Option<u32>,

    /// Deduplication scope
    #[arg(long, value_enum, default_value = "per-task")]
    pub scope: ScopeArg,

    /// Do not send empty results to the end-of-run retry pass
    #[arg(long, default_value_t = false)]
    pub no_retry_empty: bool,

    /// Skip the end-of-run retry pass
    #[arg(long, default_value_t = false)]
    pub no_retry_pass: bool,

    /// Extra request header as `Name: value` (repeatable), e.g. API credentials
    #[arg(long = "header", value_name = "NAME: VALUE")]
    pub headers: Vec<String>,

    /// Output destinations
    #[command(flatten)]
    pub outputs: OutputArgs,

    /// Snapshot to reconcile against
    #[command(flatten)]
    pub snapshot: SnapshotArgs,
}

impl ChartsArgs {
    /// Build the work-set for `source`
    pub fn tasks(&self, source: &SourceSpec) -> Vec<FetchTask> {
        let plan = if self.categories.is_empty() {
            source.plan()
        } else {
            CategoryPlan::default().with_fallback(self.categories.clone())
        };

        let countries = if !self.countries.is_empty() {
            self.countries.clone()
        } else if !self.tiers.is_empty() {
            source.plan().countries_in(&self.tiers)
        } else {
            source.plan().countries()
        };

        enumerate_chart_tasks(&[countries], &plan)
    }

    /// Scheduling options described by the flags
    pub fn options(&self, cli: &Cli) -> HarvestOptions {
        let base = if self.workers <= 1 {
            HarvestOptions::sequential()
        } else {
            HarvestOptions::parallel(self.workers)
        };
        let delay = self
            .delay_ms
            .map(Duration::from_millis)
            .unwrap_or(base.task_delay);

        let mut options = cli
            .tune(base)
            .with_task_delay(delay)
            .with_adaptive_delay(self.adaptive)
            .with_scope(self.scope.into())
            .with_retry_pass(!self.no_retry_pass);
        if self.no_retry_empty {
            options = options.with_retry_empty(false);
        }
        if let Some(after) = self.abort_after {
            options = options.with_rate_limit_response(RateLimitResponse::Abort {
                after_consecutive: after.max(1),
            });
        }
        if options.adaptive_delay && options.task_delay.is_zero() {
            options = options.with_task_delay(Duration::from_millis(SEQUENTIAL_DELAY_MS));
        }
        options
    }

    /// Execute the charts command
    pub async fn execute(&self, cli: &Cli, catalog: &Catalog, shutdown: SharedShutdown) -> Result<(), CliError> {
        let source = catalog.source(&self.source)?;
        let tasks = self.tasks(source);
        if tasks.is_empty() {
            return Err(CliError::InvalidArgument(format!(
                "no tasks: none of the requested countries has categories in source {}",
                source.name()
            )));
        }

        let headers = parse_headers(self.headers.as_slice()).map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        let options = self.options(cli);
        info!(
            source = source.name(),
            tasks = tasks.len(),
            workers = options.workers,
            delay_ms = options.task_delay.as_millis() as u64,
            "Starting chart harvest"
        );

        let transport: Arc<dyn Transport> =
            Arc::new(ReqwestTransport::new(catalog.user_agent(), source.format()).with_headers(headers));
        let executor = HarvestExecutor::with_transport(source, transport, options)?
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
