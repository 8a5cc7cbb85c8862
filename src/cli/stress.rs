//! `stress` command: find the rate-limit boundary of one endpoint
//!
//! Fires the same chart task from many workers with no retries. The first
//! rate-limited response trips the shutdown signal; in-flight requests finish
//! and nothing new is dispatched.

use super::report;
use super::{Cli, CliError};
use crate::harvest::{HarvestExecutor, HarvestOptions, RateLimitResponse, RetryPolicy};
use crate::registry::Catalog;
use crate::shutdown::SharedShutdown;
use crate::FetchTask;
use clap::Args;
use tracing::info;

/// Arguments for the stress command
#[derive(Args, Debug, Clone)]
pub struct StressArgs {
    /// Catalog source
    #[arg(long, default_value = "spotify")]
    pub source: String,

    /// Country of the probed chart
    #[arg(long, default_value = "us")]
    pub country: String,

    /// Category of the probed chart
    #[arg(long, default_value = "top")]
    pub category: String,

    /// Requests to send at most
    #[arg(long, default_value_t = 1000)]
    pub requests: usize,

    /// Concurrent requests
    #[arg(long, default_value_t = 100)]
    pub workers: usize,
}

impl StressArgs {
    /// The repeated work-set
    pub fn tasks(&self) -> Vec<FetchTask> {
        vec![FetchTask::chart(&self.country, self.category.clone()); self.requests]
    }

    /// Parallel, single attempt, stop at the first 429
    pub fn options(&self, cli: &Cli) -> HarvestOptions {
        cli.tune(HarvestOptions::parallel(self.workers))
            .with_retry(RetryPolicy::none())
            .with_rate_limit_response(RateLimitResponse::Abort { after_consecutive: 1 })
            .with_retry_pass(false)
            .with_retry_empty(false)
    }

    /// Execute the stress command
    pub async fn execute(&self, cli: &Cli, catalog: &Catalog, shutdown: SharedShutdown) -> Result<(), CliError> {
        if self.requests == 0 {
            return Err(CliError::InvalidArgument("--requests must be positive".to_string()));
        }
        let source = catalog.source(&self.source)?;
        let options = self.options(cli);
        info!(
            source = source.name(),
            task = %FetchTask::chart(&self.country, self.category.clone()),
            requests = self.requests,
            workers = options.workers,
            "Starting rate-limit probe"
        );

        let executor = HarvestExecutor::for_source_with_agent(source, catalog.user_agent(), options)?
            .with_shutdown(shutdown)
            .with_progress(cli.show_progress());
        let outcome = executor.run(self.tasks(), None).await?;

        report::output_stress(cli.output_format, &outcome.summary);
        Ok(())
    }
}
