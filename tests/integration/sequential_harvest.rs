//! Sequential runs: enumeration order, 429 recovery, deduplication, streamed CSV

use crate::support::{executor, fast, items, Step, ScriptedTransport, chart_url};
use chart_harvester::harvest::{enumerate_chart_tasks, CategoryPlan, HarvestOptions, UniquenessScope};
use chart_harvester::output::csv::CsvRecordWriter;
use chart_harvester::output::RecordSink;
use chart_harvester::FetchTask;
use std::sync::Arc;
use tempfile::TempDir;

fn scenario_tasks() -> Vec<FetchTask> {
    let plan = CategoryPlan::from_country_map([
        ("us", vec!["top", "trending"]),
        ("gb", vec!["top"]),
    ]);
    enumerate_chart_tasks(&[vec!["us".to_string(), "gb".to_string()]], &plan)
}

fn scenario_transport() -> Arc<ScriptedTransport> {
    Arc::new(
        ScriptedTransport::new(Step::status(404))
            .chart("gb", "top", vec![items(&["DEF", "GHI"])])
            .chart("us", "top", vec![Step::rate_limited(), items(&["ABC"])])
            .chart("us", "trending", vec![items(&["ABC", "DEF"])]),
    )
}

#[tokio::test]
async fn test_sequential_run_recovers_from_429_and_deduplicates() {
    let transport = scenario_transport();
    let tasks = scenario_tasks();
    assert_eq!(tasks.len(), 3);

    let outcome = executor(&transport, fast(HarvestOptions::sequential()).with_max_retries(3))
        .run(tasks.clone(), None)
        .await
        .unwrap();

    let summary = &outcome.summary;
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.rate_limited, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.requests, 4);
    assert!(summary.is_consistent());
    assert!(!summary.cancelled);

    let ids: Vec<&String> = outcome.accumulator.ids().iter().collect();
    assert_eq!(ids, vec!["ABC", "DEF", "GHI"]);
    assert_eq!(summary.unique_ids, 3);
    assert_eq!(summary.records, 5);

    // Sequential batches come back in enumeration order
    let order: Vec<&FetchTask> = outcome.accumulator.batches().iter().map(|b| &b.task).collect();
    assert_eq!(order, tasks.iter().collect::<Vec<_>>());

    assert_eq!(transport.count(&chart_url("us", "top")), 2);
}

#[tokio::test]
async fn test_recovered_task_keeps_rank_and_identifier() {
    let transport = Arc::new(
        ScriptedTransport::new(Step::status(404))
            .chart("us", "top", vec![Step::rate_limited(), items(&["ABC"])]),
    );

    let outcome = executor(&transport, fast(HarvestOptions::sequential()).with_max_retries(3))
        .run(vec![FetchTask::chart("us", "top")], None)
        .await
        .unwrap();

    let records: Vec<_> = outcome.accumulator.records().collect();
    assert_eq!(records.len(), 1);
    let (task, record) = records[0];
    assert_eq!(*task, FetchTask::chart("us", "top"));
    assert_eq!(record.id, "ABC");
    assert_eq!(record.rank, 1);
}

#[tokio::test]
async fn test_streamed_csv_holds_every_batch_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("charts.csv");
    let mut writer = CsvRecordWriter::create(&path, "ShowID").unwrap();

    let outcome = executor(&scenario_transport(), fast(HarvestOptions::sequential()))
        .run(scenario_tasks(), Some(&mut writer as &mut dyn RecordSink))
        .await
        .unwrap();
    assert_eq!(writer.rows_written(), 5);
    assert_eq!(outcome.summary.inserted, 5);

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.get(8), Some("ShowID"));

    let rows: Vec<_> = reader.records().filter_map(Result::ok).collect();
    let regions: Vec<&str> = rows.iter().filter_map(|r| r.get(0)).collect();
    assert_eq!(regions, vec!["GB", "GB", "US", "US", "US"]);
    let ids: Vec<&str> = rows.iter().filter_map(|r| r.get(8)).collect();
    assert_eq!(ids, vec!["DEF", "GHI", "ABC", "ABC", "DEF"]);
}

#[tokio::test]
async fn test_client_error_is_recorded_not_raised() {
    let transport = Arc::new(
        ScriptedTransport::new(Step::status(404)).chart("us", "top", vec![items(&["ABC"])]),
    );

    let outcome = executor(&transport, fast(HarvestOptions::sequential()))
        .run(
            vec![FetchTask::chart("us", "top"), FetchTask::chart("zz", "top")],
            None,
        )
        .await
        .unwrap();

    let summary = &outcome.summary;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retried, 0);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].task, "ZZ - top");
    assert_eq!(summary.failures[0].attempts, 1);
    assert!(summary.failures[0].message.contains("404"));
}

#[tokio::test]
async fn test_task_with_only_seen_identifiers_counts_as_succeeded() {
    let transport = Arc::new(
        ScriptedTransport::new(Step::status(404))
            .chart("gb", "top", vec![items(&["ABC"])])
            .chart("us", "top", vec![items(&["ABC"])]),
    );

    let outcome = executor(
        &transport,
        fast(HarvestOptions::sequential()).with_scope(UniquenessScope::IdentifierOnly),
    )
    .run(
        vec![FetchTask::chart("gb", "top"), FetchTask::chart("us", "top")],
        None,
    )
    .await
    .unwrap();

    let summary = &outcome.summary;
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.empty, 0);
    assert_eq!(summary.retried, 0);
    assert!(summary.is_consistent());
    assert_eq!(summary.per_task["GB - top"], 1);
    assert_eq!(summary.per_task["US - top"], 0);
    assert_eq!(transport.count(&chart_url("us", "top")), 1);
}
