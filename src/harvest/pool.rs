//! Bounded worker pool
//!
//! One pool serves both scheduling models. With one worker and a pacer delay
//! it runs tasks strictly in enumeration order with a pause between them;
//! with many workers it fans out and yields results as they complete.
//!
//! Dispatch stops as soon as shutdown is requested. Work already dispatched
//! is allowed to finish and is still yielded.

use super::config::MAX_WORKERS;
use super::rate_limit::Pacer;
use super::task::FetchTask;
use crate::shutdown::SharedShutdown;
use futures::future;
use futures::stream::{self, LocalBoxStream, StreamExt};
use std::future::Future;
use std::sync::Arc;

/// Output of one dispatched task
#[derive(Debug)]
pub struct Dispatched<T> {
    /// 1-based dispatch order
    pub index: usize,
    /// The task
    pub task: FetchTask,
    /// Whatever the work function returned
    pub output: T,
}

/// Fixed-size pool of concurrent task slots
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    pacer: Arc<Pacer>,
    shutdown: SharedShutdown,
}

impl WorkerPool {
    /// Create a pool; `workers` is clamped to `1..=MAX_WORKERS`
    pub fn new(workers: usize, pacer: Arc<Pacer>, shutdown: SharedShutdown) -> Self {
        Self {
            workers: workers.clamp(1, MAX_WORKERS),
            pacer,
            shutdown,
        }
    }

    /// Worker count
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Whether results come back in dispatch order
    pub fn is_sequential(&self) -> bool {
        self.workers == 1
    }

    /// Run `work` over `tasks`, yielding each result as it completes
    ///
    /// The pacer delay is applied before every dispatch except the first.
    /// The consumer may adjust the pacer between items; the next dispatch
    /// reads the updated delay.
    pub fn run<'a, T, F, Fut>(&self, tasks: Vec<FetchTask>, mut work: F) -> LocalBoxStream<'a, Dispatched<T>>
    where
        T: 'a,
        F: FnMut(FetchTask) -> Fut + 'a,
        Fut: Future<Output = T> + 'a,
    {
        let pacer = Arc::clone(&self.pacer);
        let pace_shutdown = Arc::clone(&self.shutdown);
        let gate = Arc::clone(&self.shutdown);

        stream::iter(tasks.into_iter().enumerate())
            .then(move |(offset, task)| {
                let pacer = Arc::clone(&pacer);
                let shutdown = Arc::clone(&pace_shutdown);
                async move {
                    if offset > 0 {
                        pacer.wait(&shutdown).await;
                    }
                    (offset + 1, task)
                }
            })
            .take_while(move |_| future::ready(!gate.is_shutdown_requested()))
            .map(move |(index, task)| {
                let pending = work(task.clone());
                async move {
                    Dispatched {
                        index,
                        task,
                        output: pending.await,
                    }
                }
            })
            .buffer_unordered(self.workers)
            .boxed_local()
    }
}
