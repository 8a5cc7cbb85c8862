//! Three-way set difference between fresh and snapshot identifiers

use crate::snapshot::Snapshot;
use crate::IdentifierSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Where an identifier sits relative to the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaStatus {
    /// Fresh only
    New,
    /// Snapshot only
    SnapshotOnly,
    /// In both
    Common,
}

impl fmt::Display for DeltaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaStatus::New => write!(f, "new"),
            DeltaStatus::SnapshotOnly => write!(f, "snapshot_only"),
            DeltaStatus::Common => write!(f, "common"),
        }
    }
}

/// Result of reconciling a fresh identifier set against a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// `fresh - snapshot`
    pub new_only: BTreeSet<String>,
    /// `snapshot - fresh`
    pub snapshot_only: BTreeSet<String>,
    /// `fresh ∩ snapshot`
    pub common: BTreeSet<String>,
}

impl Delta {
    /// Every identifier with its status, sorted by identifier
    pub fn rows(&self) -> Vec<(&str, DeltaStatus)> {
        let mut rows: Vec<(&str, DeltaStatus)> = self
            .new_only
            .iter()
            .map(|id| (id.as_str(), DeltaStatus::New))
            .chain(self.snapshot_only.iter().map(|id| (id.as_str(), DeltaStatus::SnapshotOnly)))
            .chain(self.common.iter().map(|id| (id.as_str(), DeltaStatus::Common)))
            .collect();
        rows.sort();
        rows
    }

    /// Total identifiers across the three sets
    pub fn len(&self) -> usize {
        self.new_only.len() + self.snapshot_only.len() + self.common.len()
    }

    /// Whether both inputs were empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compute the delta between `fresh` and `snapshot`
///
/// Pure set arithmetic: the result depends only on set membership, never on
/// iteration order, and repeated calls give identical results.
pub fn reconcile(fresh: &IdentifierSet, snapshot: &Snapshot) -> Delta {
    let fresh = fresh.as_set();
    let known = snapshot.ids().as_set();

    Delta {
        new_only: fresh.difference(known).cloned().collect(),
        snapshot_only: known.difference(fresh).cloned().collect(),
        common: fresh.intersection(known).cloned().collect(),
    }
}
