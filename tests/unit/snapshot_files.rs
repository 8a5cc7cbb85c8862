//! Snapshots read back from files the harvester writes

use chart_harvester::output::csv::{write_identifiers, DEFAULT_ID_COLUMN};
use chart_harvester::reconcile::reconcile;
use chart_harvester::snapshot::{IdColumn, IdFilter, Snapshot, SnapshotOptions};
use chart_harvester::IdentifierSet;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_identifier_list_reloads_as_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ids.csv");
    let ids: IdentifierSet = ["GHI", "ABC", "DEF"].into_iter().collect();

    write_identifiers(&path, ids.iter(), DEFAULT_ID_COLUMN).unwrap();
    let snapshot = Snapshot::load(&path, &SnapshotOptions::default()).unwrap();

    assert_eq!(snapshot.ids(), &ids);
}

#[test]
fn test_numeric_filter_drops_non_numeric_rows() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("apple.csv");
    fs::write(&path, "Name,Podcast ID\nOne,1200361736\nBad,n/a\nTwo,360084272\nEmpty,\n").unwrap();

    let options = SnapshotOptions::default()
        .with_column(IdColumn::parse("Podcast ID"))
        .with_filter(IdFilter::Numeric);
    let snapshot = Snapshot::load(&path, &options).unwrap();

    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.contains("1200361736"));
    assert!(snapshot.contains("360084272"));
    assert!(snapshot.skipped() >= 1);
}

#[test]
fn test_reconcile_partitions_every_identifier() {
    let fresh: IdentifierSet = ["ABC", "DEF", "GHI"].into_iter().collect();
    let snapshot = Snapshot::from_ids(["DEF", "XYZ"].into_iter().collect());

    let delta = reconcile(&fresh, &snapshot);

    assert_eq!(delta.new_only.len() + delta.common.len(), fresh.len());
    assert_eq!(delta.snapshot_only.len() + delta.common.len(), snapshot.len());
    assert!(delta.new_only.contains("ABC"));
    assert!(delta.common.contains("DEF"));
    assert!(delta.snapshot_only.contains("XYZ"));
}
