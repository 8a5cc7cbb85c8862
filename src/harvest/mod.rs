//! Work-set enumeration, scheduling and accumulation
//!
//! # Overview
//!
//! 1. **Enumeration**: [`task::enumerate_chart_tasks`] expands countries x
//!    categories into an ordered, duplicate-free work-set
//! 2. **Scheduling**: [`pool::WorkerPool`] runs tasks sequentially with a
//!    pause between them, or in parallel on a bounded number of slots
//! 3. **Pacing**: [`rate_limit::Pacer`] holds the inter-task delay
//! 4. **Accumulation**: [`accumulator::Accumulator`] folds records into the
//!    run's identifier set
//! 5. **Orchestration**: [`executor::HarvestExecutor`] ties these together and
//!    runs the end-of-run retry pass
//!
//! # Quick Start
//!
//! ```no_run
//! use chart_harvester::harvest::{CategoryPlan, HarvestOptions, enumerate_chart_tasks};
//!
//! let plan = CategoryPlan::from_country_map([
//!     ("us", vec!["top", "trending"]),
//!     ("gb", vec!["top"]),
//! ]);
//! let tasks = enumerate_chart_tasks(&[vec!["us".into(), "gb".into()]], &plan);
//! assert_eq!(tasks.len(), 3);
//!
//! let options = HarvestOptions::sequential().with_max_retries(5);
//! # let _ = options;
//! ```

pub mod accumulator;
pub mod config;
pub mod executor;
pub mod pool;
pub mod rate_limit;
pub mod summary;
pub mod task;

pub use accumulator::{Accumulator, TaskBatch, UniquenessScope};
pub use config::{BackoffPolicy, RateLimitResponse, RetryPolicy};
pub use executor::{HarvestError, HarvestExecutor, HarvestOptions, HarvestOutcome};
pub use pool::WorkerPool;
pub use rate_limit::Pacer;
pub use summary::{RunSummary, TaskFailure, TaskStatus};
pub use task::{enumerate_chart_tasks, enumerate_shard_tasks, CategoryPlan, CategoryTier, FetchTask};
