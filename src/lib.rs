//! # Chart Harvester Library
//!
//! Bulk collection of podcast chart and listing data from public HTTP endpoints
//! (chart APIs, genre browse pages, sitemap shards), with deduplication and
//! reconciliation against previously collected identifier snapshots.
//!
//! ## Features
//!
//! - **Work-set Enumeration**: Expand countries x categories (or sitemap shards) into fetch tasks
//! - **Bounded Retries**: Per-task timeout, configurable backoff, 429 handling with `Retry-After`
//! - **Two Scheduling Models**: Sequential rate-limited runs and bounded parallel fan-out
//! - **Deduplication**: Identifier sets that only ever grow during a run
//! - **Reconciliation**: Three-way set difference against CSV, text, JSON or SQLite snapshots
//! - **Sinks**: CSV files and a SQLite chart table with per-task transactions
//!
//! ## Quick Start
//!
//! ```no_run
//! use chart_harvester::harvest::{enumerate_chart_tasks, HarvestExecutor, HarvestOptions};
//! use chart_harvester::registry::Catalog;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = Catalog::load_embedded()?;
//! let source = catalog.source("spotify")?;
//! let tasks = enumerate_chart_tasks(&[vec!["us".to_string(), "gb".to_string()]], &source.plan());
//!
//! let executor = HarvestExecutor::for_source(source, HarvestOptions::sequential())?;
//! let outcome = executor.run(tasks, None).await?;
//! println!("{} unique shows", outcome.accumulator.ids().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`registry`] - Embedded catalog of sources, tiers and country names
//! - [`harvest`] - Task enumeration, worker pool, accumulation and run orchestration
//! - [`fetcher`] - HTTP transport, endpoint templating and the retrying task fetcher
//! - [`extract`] - Payload decoding and record extraction (JSON, HTML, XML)
//! - [`reconcile`] - Delta computation between fresh and snapshot identifier sets
//! - [`snapshot`] - Snapshot loaders
//! - [`output`] - CSV and SQLite sinks

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// CLI command implementations
pub mod cli;

/// Payload decoding and record extraction
pub mod extract;

/// HTTP fetching with retry
pub mod fetcher;

/// Work-set enumeration, scheduling and accumulation
pub mod harvest;

/// Identifier derivation helpers
pub mod identifier;

/// Prometheus metrics
pub mod metrics;

/// CSV and relational sinks
pub mod output;

/// Set reconciliation
pub mod reconcile;

/// Source catalog and country metadata
pub mod registry;

/// Cancellation coordination shared across modules
pub mod shutdown;

/// Snapshot loaders
pub mod snapshot;

pub use harvest::task::FetchTask;
pub use reconcile::Delta;
pub use snapshot::Snapshot;

/// One listed show extracted from a fetched payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Record {
    /// Natural identifier (URI suffix or numeric id); empty when the payload lacked one
    pub id: String,
    /// Display name
    pub name: String,
    /// Publisher / author
    pub publisher: String,
    /// 1-based position within the originating task's payload
    pub rank: u32,
    /// Artwork URL
    pub image_url: Option<String>,
    /// Free-text description
    pub description: Option<String>,
    /// Chart movement indicator as reported by the source (e.g. "UP", "+3", "NEW")
    pub movement: Option<String>,
}

impl Record {
    /// Whether this record carries a usable identifier
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    /// Validate record integrity
    pub fn validate(&self) -> Result<(), String> {
        if self.rank == 0 {
            return Err("Rank is 1-based, got 0".to_string());
        }
        if self.id.chars().any(char::is_whitespace) {
            return Err(format!("Identifier contains whitespace: {:?}", self.id));
        }
        Ok(())
    }
}

/// Set of unique, non-empty identifiers collected during a run
///
/// Only grows: there is no removal API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierSet {
    ids: BTreeSet<String>,
}

impl IdentifierSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an identifier; empty strings are ignored. Returns true if newly added.
    pub fn insert(&mut self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() {
            return false;
        }
        self.ids.insert(id.to_string())
    }

    /// Merge another set into this one
    pub fn extend(&mut self, other: &IdentifierSet) {
        self.ids.extend(other.ids.iter().cloned());
    }

    /// Membership test
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of identifiers
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identifiers in ascending lexicographic order
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.ids.iter()
    }

    /// Borrow the underlying ordered set
    pub fn as_set(&self) -> &BTreeSet<String> {
        &self.ids
    }
}

impl<S: AsRef<str>> FromIterator<S> for IdentifierSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = IdentifierSet::new();
        for id in iter {
            set.insert(id.as_ref());
        }
        set
    }
}
