//! Run orchestration
//!
//! A run is one pass over the work-set followed by at most one retry pass
//! over the tasks that ended retryably (rate-limited, network trouble, 5xx,
//! and empty results when the source asks for it). Results are consumed on
//! a single logical thread: accumulation and sink writes never run
//! concurrently, whatever the worker count.

use super::accumulator::{Accumulator, UniquenessScope};
use super::config::{
    RateLimitResponse, DEFAULT_WORKERS, MAX_WORKERS, RATE_LIMIT_ABORT_THRESHOLD, SEQUENTIAL_DELAY_MS,
};
use super::pool::{Dispatched, WorkerPool};
use super::rate_limit::Pacer;
use super::summary::RunSummary;
use super::task::FetchTask;
use crate::extract::Extractor;
use crate::fetcher::http::DEFAULT_USER_AGENT;
use crate::fetcher::{Endpoint, FetchOptions, FetchResult, ReqwestTransport, TaskFetcher, Transport};
use crate::harvest::config::RetryPolicy;
use crate::metrics;
use crate::output::{OutputError, RecordSink};
use crate::registry::SourceSpec;
use crate::shutdown::{self, SharedShutdown, ShutdownCoordinator, ShutdownReason};
use crate::Record;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};

/// Scheduling and retry settings for one run
#[derive(Debug, Clone, Copy)]
pub struct HarvestOptions {
    /// Concurrent tasks (1 = sequential)
    pub workers: usize,
    /// Delay between dispatches
    pub task_delay: Duration,
    /// Stretch the delay on 429s and relax it on success
    pub adaptive_delay: bool,
    /// Per-task fetch settings
    pub fetch: FetchOptions,
    /// Which records survive deduplication
    pub scope: UniquenessScope,
    /// Reaction to rate-limited tasks
    pub rate_limit: RateLimitResponse,
    /// Run the end-of-run retry pass
    pub retry_pass: bool,
    /// Send empty results to the retry pass; `None` defers to the source
    pub retry_empty: Option<bool>,
}

impl HarvestOptions {
    /// One task at a time with the default inter-task delay
    pub fn sequential() -> Self {
        Self {
            workers: 1,
            task_delay: Duration::from_millis(SEQUENTIAL_DELAY_MS),
            adaptive_delay: false,
            fetch: FetchOptions::default(),
            scope: UniquenessScope::PerTask,
            rate_limit: RateLimitResponse::SlowDown,
            retry_pass: true,
            retry_empty: None,
        }
    }

    /// `workers` concurrent tasks (clamped to `1..=MAX_WORKERS`), no delay
    pub fn parallel(workers: usize) -> Self {
        Self {
            workers: workers.clamp(1, MAX_WORKERS),
            task_delay: Duration::ZERO,
            ..Self::sequential()
        }
    }

    /// Override the inter-task delay
    pub fn with_task_delay(mut self, delay: Duration) -> Self {
        self.task_delay = delay;
        self
    }

    /// Enable or disable adaptive pacing
    pub fn with_adaptive_delay(mut self, adaptive: bool) -> Self {
        self.adaptive_delay = adaptive;
        self
    }

    /// Override the per-task timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.fetch.timeout = timeout;
        self
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.fetch.retry = retry;
        self
    }

    /// Override the retry count
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.fetch.retry = self.fetch.retry.with_max_retries(max_retries);
        self
    }

    /// Override the uniqueness scope
    pub fn with_scope(mut self, scope: UniquenessScope) -> Self {
        self.scope = scope;
        self
    }

    /// Override the rate-limit reaction
    pub fn with_rate_limit_response(mut self, response: RateLimitResponse) -> Self {
        self.rate_limit = response;
        self
    }

    /// Stop after [`RATE_LIMIT_ABORT_THRESHOLD`] consecutive rate-limited tasks
    pub fn abort_on_rate_limit(self) -> Self {
        self.with_rate_limit_response(RateLimitResponse::Abort {
            after_consecutive: RATE_LIMIT_ABORT_THRESHOLD,
        })
    }

    /// Enable or disable the retry pass
    pub fn with_retry_pass(mut self, enabled: bool) -> Self {
        self.retry_pass = enabled;
        self
    }

    /// Force empty-result retries on or off
    pub fn with_retry_empty(mut self, retry_empty: bool) -> Self {
        self.retry_empty = Some(retry_empty);
        self
    }
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self::parallel(DEFAULT_WORKERS)
    }
}

/// What a run produced
#[derive(Debug)]
pub struct HarvestOutcome {
    /// Identifier set and kept records
    pub accumulator: Accumulator,
    /// Counts and diagnostics
    pub summary: RunSummary,
}

/// Run-level errors
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Source definition cannot be turned into a fetcher or extractor
    #[error("invalid source configuration: {0}")]
    Config(String),

    /// The sink failed; the run stopped after flushing what it had
    #[error("sink failed: {error}")]
    Sink {
        /// Underlying error
        error: OutputError,
        /// Everything accumulated before the failure
        outcome: Box<HarvestOutcome>,
    },
}

/// Fetches a work-set for one source
pub struct HarvestExecutor {
    source: String,
    fetcher: TaskFetcher,
    extractor: Extractor,
    options: HarvestOptions,
    retry_empty: bool,
    shutdown: SharedShutdown,
    show_progress: bool,
}

impl HarvestExecutor {
    /// Executor using the shared HTTP client and the default `User-Agent`
    pub fn for_source(source: &SourceSpec, options: HarvestOptions) -> Result<Self, HarvestError> {
        Self::for_source_with_agent(source, DEFAULT_USER_AGENT, options)
    }

    /// Executor using the shared HTTP client and a custom `User-Agent`
    pub fn for_source_with_agent(
        source: &SourceSpec,
        user_agent: &str,
        options: HarvestOptions,
    ) -> Result<Self, HarvestError> {
        let transport = Arc::new(ReqwestTransport::new(user_agent, source.format()));
        Self::with_transport(source, transport, options)
    }

    /// Executor on an explicit transport
    pub fn with_transport(
        source: &SourceSpec,
        transport: Arc<dyn Transport>,
        options: HarvestOptions,
    ) -> Result<Self, HarvestError> {
        let extractor = source
            .extractor()
            .map_err(|e| HarvestError::Config(format!("{}: {e}", source.name())))?;
        let endpoint = Endpoint::new(source.endpoint())
            .map_err(|e| HarvestError::Config(format!("{}: {e}", source.name())))?
            .with_region_param(source.region_param());
        let shutdown = shutdown::get_global_shutdown().unwrap_or_else(ShutdownCoordinator::shared);

        let fetcher = TaskFetcher::new(source.name(), transport, endpoint, source.format())
            .with_list_key(extractor.list_key())
            .with_shutdown(Arc::clone(&shutdown));

        Ok(Self {
            source: source.name().to_string(),
            fetcher,
            extractor,
            retry_empty: options.retry_empty.unwrap_or_else(|| source.retry_empty()),
            options,
            shutdown,
            show_progress: false,
        })
    }

    /// Use a specific shutdown coordinator instead of the global one
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.fetcher = self.fetcher.with_shutdown(Arc::clone(&shutdown));
        self.shutdown = shutdown;
        self
    }

    /// Draw a progress bar on stderr
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Options in effect
    pub fn options(&self) -> &HarvestOptions {
        &self.options
    }

    /// Shutdown coordinator in effect
    pub fn shutdown(&self) -> &SharedShutdown {
        &self.shutdown
    }

    /// Fetch every task, accumulate records and feed the optional sink
    ///
    /// Per-task failures never abort the run; they are recorded in the
    /// summary. Only a sink error stops the run early, in which case the
    /// partial outcome travels inside [`HarvestError::Sink`].
    pub async fn run(
        &self,
        tasks: Vec<FetchTask>,
        sink: Option<&mut dyn RecordSink>,
    ) -> Result<HarvestOutcome, HarvestError> {
        let span = tracing::info_span!(
            "harvest",
            source = %self.source,
            tasks = tasks.len(),
            workers = self.options.workers
        );
        self.run_inner(tasks, sink).instrument(span).await
    }

    async fn run_inner(
        &self,
        tasks: Vec<FetchTask>,
        sink: Option<&mut dyn RecordSink>,
    ) -> Result<HarvestOutcome, HarvestError> {
        let started = Instant::now();
        let total = tasks.len();
        info!(
            "Starting harvest of {} tasks ({} workers, {}ms delay)",
            total,
            self.options.workers,
            self.options.task_delay.as_millis()
        );

        let pacer = Arc::new(if self.options.adaptive_delay {
            Pacer::adaptive(self.options.task_delay)
        } else {
            Pacer::fixed(self.options.task_delay)
        });
        let pool = WorkerPool::new(self.options.workers, Arc::clone(&pacer), Arc::clone(&self.shutdown));

        let mut state = RunState {
            accumulator: Accumulator::new(self.options.scope),
            summary: RunSummary::new(&self.source),
            sink,
            consecutive_rate_limited: 0,
            prior_attempts: HashMap::new(),
            fatal: None,
            progress: self.progress_bar(total as u64),
        };

        let (deferred, dispatched) = self.pass(&pool, &pacer, tasks, &mut state, true).await;
        state.summary.skipped = total.saturating_sub(dispatched);

        if !deferred.is_empty() {
            if self.shutdown.is_shutdown_requested() || state.fatal.is_some() {
                debug!(count = deferred.len(), "Skipping retry pass after shutdown");
                for entry in deferred {
                    state.finalize(&self.source, entry);
                }
            } else {
                info!("Retry pass over {} tasks", deferred.len());
                state.summary.retried = deferred.len();
                state.progress.inc_length(deferred.len() as u64);

                for entry in &deferred {
                    state.prior_attempts.insert(entry.task.clone(), entry.attempts);
                }
                let retry_tasks = deferred.iter().map(|entry| entry.task.clone()).collect();
                self.pass(&pool, &pacer, retry_tasks, &mut state, false).await;

                // Tasks the retry pass never reached keep their first-pass outcome
                for entry in deferred {
                    if state.prior_attempts.remove(&entry.task).is_some() {
                        state.finalize(&self.source, entry);
                    }
                }
            }
        }

        if let Some(sink) = state.sink.as_deref_mut() {
            if state.fatal.is_none() {
                if let Err(e) = sink.finish() {
                    state.fatal = Some(e);
                }
            }
        }
        state.progress.finish_and_clear();

        if !pool.is_sequential() {
            state.accumulator.sort_by_task();
        }

        let mut summary = state.summary;
        summary.records = state.accumulator.record_count();
        summary.unique_ids = state.accumulator.ids().len();
        summary.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if let Some(reason) = self.shutdown.reason() {
            summary.cancelled = true;
            summary.cancel_reason = Some(reason.to_string());
        }

        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            empty = summary.empty,
            rate_limited = summary.rate_limited,
            failed = summary.failed,
            unique_ids = summary.unique_ids,
            elapsed_ms = summary.elapsed_ms,
            "Harvest complete"
        );

        let outcome = HarvestOutcome {
            accumulator: state.accumulator,
            summary,
        };
        match state.fatal {
            Some(error) => {
                error!("Sink failure stopped the run: {}", error);
                Err(HarvestError::Sink {
                    error,
                    outcome: Box::new(outcome),
                })
            }
            None => Ok(outcome),
        }
    }

    /// One pass over `tasks`
    ///
    /// Returns the entries held back for the retry pass (always empty when
    /// `first` is false) and the number of tasks dispatched.
    async fn pass(
        &self,
        pool: &WorkerPool,
        pacer: &Pacer,
        tasks: Vec<FetchTask>,
        state: &mut RunState<'_>,
        first: bool,
    ) -> (Vec<Entry>, usize) {
        let fetcher = self.fetcher.clone();
        let fetch_options = self.options.fetch;
        let mut results = pool.run(tasks, move |task| {
            let fetcher = fetcher.clone();
            async move { fetcher.fetch(&task, &fetch_options).await }
        });

        let mut deferred = Vec::new();
        let mut dispatched = 0;
        while let Some(Dispatched { index, task, output }) = results.next().await {
            dispatched += 1;
            state.progress.inc(1);
            state.summary.requests += u64::from(output.attempts());
            state.progress.set_message(task.to_string());

            if output.is_rate_limited() {
                pacer.on_rate_limited();
                state.consecutive_rate_limited += 1;
                if first && state.summary.first_rate_limited.is_none() {
                    state.summary.first_rate_limited = Some(index);
                }
                if let RateLimitResponse::Abort { after_consecutive } = self.options.rate_limit {
                    if state.consecutive_rate_limited >= after_consecutive.max(1) {
                        warn!(
                            task = %task,
                            consecutive = state.consecutive_rate_limited,
                            "Rate limit boundary reached; no new tasks will be dispatched"
                        );
                        self.shutdown.request(ShutdownReason::RateLimited);
                    }
                }
            } else {
                state.consecutive_rate_limited = 0;
                if output.is_success() {
                    pacer.on_success();
                }
            }

            let records = match &output {
                FetchResult::Success { payload, .. } => self.extractor.extract(payload),
                _ => Vec::new(),
            };
            let attempts = output.attempts();
            let entry = Entry {
                task,
                result: output,
                records,
                attempts,
            };

            if first && self.options.retry_pass && self.wants_retry(&entry) {
                debug!(task = %entry.task, "Deferred to retry pass");
                deferred.push(entry);
                continue;
            }

            state.finalize(&self.source, entry);
            if let Some(error) = &state.fatal {
                warn!("Stopping dispatch after sink error: {}", error);
                self.shutdown.request(ShutdownReason::SinkFailure);
                break;
            }
        }

        (deferred, dispatched)
    }

    fn wants_retry(&self, entry: &Entry) -> bool {
        match &entry.result {
            FetchResult::Success { .. } => self.retry_empty && entry.records.is_empty(),
            FetchResult::RateLimited { .. } => true,
            FetchResult::Failure { error, .. } => (self.options.fetch.retry.retryable)(error),
        }
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// One task's outcome awaiting finalization
struct Entry {
    task: FetchTask,
    result: FetchResult,
    records: Vec<Record>,
    attempts: u32,
}

/// Mutable state owned by the result consumer
struct RunState<'s> {
    accumulator: Accumulator,
    summary: RunSummary,
    sink: Option<&'s mut dyn RecordSink>,
    consecutive_rate_limited: u32,
    /// First-pass attempts of tasks currently in the retry pass
    prior_attempts: HashMap<FetchTask, u32>,
    fatal: Option<OutputError>,
    progress: ProgressBar,
}

impl RunState<'_> {
    /// Record a task's final outcome, accumulate its records and hand them to the sink
    fn finalize(&mut self, source: &str, entry: Entry) {
        let Entry {
            task,
            result,
            records,
            attempts,
        } = entry;
        let attempts = self.prior_attempts.remove(&task).unwrap_or(0) + attempts;

        match &result {
            FetchResult::Success { latency, .. } => {
                info!(
                    task = %task,
                    records = records.len(),
                    latency_ms = latency.as_millis() as u64,
                    "Fetched"
                );
            }
            other => {
                warn!(
                    task = %task,
                    attempts = attempts,
                    "Task failed: {}",
                    other.error_message().unwrap_or_default()
                );
            }
        }
        let extracted = records.len();
        metrics::record_task_outcome(source, result.is_success(), extracted);

        let batch = self.accumulator.add(task.clone(), records);
        let kept = batch.records.len();
        if self.fatal.is_none() {
            if let Some(sink) = self.sink.as_deref_mut() {
                match sink.write_batch(&task, &batch.records) {
                    Ok(report) => {
                        self.summary.inserted += report.inserted;
                        self.summary.insert_errors += report.errors;
                    }
                    Err(e) => self.fatal = Some(e),
                }
            }
        }

        self.summary.record_final(&task, &result, extracted, kept, attempts);
    }
}
