//! Record accumulation and deduplication

use super::task::FetchTask;
use crate::{IdentifierSet, Record};
use serde::{Deserialize, Serialize};

/// Which records survive into the output list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniquenessScope {
    /// Keep every record, including repeats of an identifier across tasks
    #[default]
    PerTask,
    /// Keep only the first record seen for each identifier
    ///
    /// Records without an identifier are always kept.
    IdentifierOnly,
}

/// Records kept from one task, in payload order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBatch {
    /// Originating task
    pub task: FetchTask,
    /// Kept records
    pub records: Vec<Record>,
}

/// Run-scoped identifier set plus output record list
///
/// Owned by the single consumer of fetch results, so it is never mutated
/// concurrently. Identifier membership does not depend on the order tasks
/// arrive in.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    scope: UniquenessScope,
    ids: IdentifierSet,
    batches: Vec<TaskBatch>,
}

impl Accumulator {
    /// Create an empty accumulator
    pub fn new(scope: UniquenessScope) -> Self {
        Self {
            scope,
            ids: IdentifierSet::new(),
            batches: Vec::new(),
        }
    }

    /// Fold one task's records in; returns the batch that was kept
    pub fn add(&mut self, task: FetchTask, records: Vec<Record>) -> &TaskBatch {
        let kept = match self.scope {
            UniquenessScope::PerTask => {
                for record in &records {
                    self.ids.insert(&record.id);
                }
                records
            }
            UniquenessScope::IdentifierOnly => records
                .into_iter()
                .filter(|record| !record.has_id() || self.ids.insert(&record.id))
                .collect(),
        };

        self.batches.push(TaskBatch { task, records: kept });
        let last = self.batches.len() - 1;
        &self.batches[last]
    }

    /// Fold another accumulator in, batch by batch
    pub fn merge(&mut self, other: Accumulator) {
        for batch in other.batches {
            self.add(batch.task, batch.records);
        }
    }

    /// Order batches by task so parallel runs produce stable output
    pub fn sort_by_task(&mut self) {
        self.batches.sort_by(|a, b| a.task.cmp(&b.task));
    }

    /// Uniqueness scope
    pub fn scope(&self) -> UniquenessScope {
        self.scope
    }

    /// Identifiers seen so far
    pub fn ids(&self) -> &IdentifierSet {
        &self.ids
    }

    /// Kept batches in arrival order (or task order after [`Self::sort_by_task`])
    pub fn batches(&self) -> &[TaskBatch] {
        &self.batches
    }

    /// Every kept record with its task
    pub fn records(&self) -> impl Iterator<Item = (&FetchTask, &Record)> {
        self.batches
            .iter()
            .flat_map(|batch| batch.records.iter().map(move |record| (&batch.task, record)))
    }

    /// Number of kept records
    pub fn record_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.records.len()).sum()
    }

    /// Split into the identifier set and the batches
    pub fn into_parts(self) -> (IdentifierSet, Vec<TaskBatch>) {
        (self.ids, self.batches)
    }
}
