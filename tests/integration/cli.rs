//! Binary-level tests for the offline commands

use assert_cmd::Command;
use rusqlite::Connection;
use std::fs;
use tempfile::TempDir;

fn harvester() -> Command {
    Command::cargo_bin("chart-harvester").unwrap()
}

#[test]
fn test_sources_list_json() {
    let output = harvester()
        .args(["sources", "list", "--output-format", "json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let listing: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = listing
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|source| source["name"].as_str())
        .collect();
    assert!(names.contains(&"spotify"));
    assert!(names.contains(&"apple-sitemap"));
}

#[test]
fn test_sources_show_unknown_source_fails() {
    harvester().args(["sources", "show", "no-such-source"]).assert().failure();
}

#[test]
fn test_compare_writes_delta_and_new_list() {
    let temp_dir = TempDir::new().unwrap();
    let fresh = temp_dir.path().join("fresh.csv");
    let snapshot = temp_dir.path().join("snapshot.csv");
    let delta = temp_dir.path().join("delta.csv");
    let new_ids = temp_dir.path().join("new.csv");
    fs::write(&fresh, "Identifier\nDEF\nGHI\n").unwrap();
    fs::write(&snapshot, "Identifier\nABC\nDEF\n").unwrap();

    harvester()
        .arg("compare")
        .arg("--fresh")
        .arg(&fresh)
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("--delta-output")
        .arg(&delta)
        .arg("--new-output")
        .arg(&new_ids)
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(&delta).unwrap(),
        "Identifier,Status\nABC,snapshot_only\nDEF,common\nGHI,new\n"
    );
    assert_eq!(fs::read_to_string(&new_ids).unwrap(), "Identifier\nGHI\n");
}

#[test]
fn test_compare_reports_counts_as_json() {
    let temp_dir = TempDir::new().unwrap();
    let fresh = temp_dir.path().join("fresh.txt");
    let snapshot = temp_dir.path().join("snapshot.txt");
    fs::write(&fresh, "1001\n1002\n1003\n").unwrap();
    fs::write(&snapshot, "1002\n").unwrap();

    let output = harvester()
        .arg("compare")
        .arg("--fresh")
        .arg(&fresh)
        .arg("--snapshot")
        .arg(&snapshot)
        .args(["--output-format", "json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["fresh"], 3);
    assert_eq!(report["snapshot"], 1);
    assert_eq!(report["delta"]["new_only"], 2);
    assert_eq!(report["delta"]["common"], 1);
}

#[test]
fn test_missing_snapshot_file_counts_everything_as_new() {
    let temp_dir = TempDir::new().unwrap();
    let fresh = temp_dir.path().join("fresh.txt");
    let new_ids = temp_dir.path().join("new.csv");
    fs::write(&fresh, "111\n222\n").unwrap();

    harvester()
        .arg("compare")
        .arg("--fresh")
        .arg(&fresh)
        .arg("--snapshot")
        .arg(temp_dir.path().join("missing.csv"))
        .arg("--new-output")
        .arg(&new_ids)
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&new_ids).unwrap(), "Identifier\n111\n222\n");
}

#[test]
fn test_compare_inserts_new_identifiers() {
    let temp_dir = TempDir::new().unwrap();
    let fresh = temp_dir.path().join("fresh.txt");
    let snapshot = temp_dir.path().join("snapshot.txt");
    let db = temp_dir.path().join("shows.db");
    fs::write(&fresh, "1\n2\n3\n4\n").unwrap();
    fs::write(&snapshot, "2\n4\n").unwrap();

    harvester()
        .arg("compare")
        .arg("--fresh")
        .arg(&fresh)
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("--insert-db")
        .arg(&db)
        .assert()
        .success();

    let conn = Connection::open(&db).unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM discovered_podcasts", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 2);
}

#[test]
fn test_compare_without_snapshot_fails() {
    let temp_dir = TempDir::new().unwrap();
    let fresh = temp_dir.path().join("fresh.txt");
    fs::write(&fresh, "1\n").unwrap();

    harvester().arg("compare").arg("--fresh").arg(&fresh).assert().failure();
}

#[test]
fn test_charts_unknown_source_fails() {
    harvester()
        .args(["charts", "--source", "no-such-source", "--countries", "us"])
        .assert()
        .failure();
}

#[test]
fn test_delta_output_requires_snapshot() {
    harvester()
        .args(["charts", "--countries", "us", "--delta-output", "delta.csv"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_retries_out_of_range_rejected() {
    harvester()
        .args(["--max-retries", "99", "sources", "list"])
        .assert()
        .failure();
}
