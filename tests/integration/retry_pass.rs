//! Terminal failures, the end-of-run retry pass and empty-result retries

use crate::support::{chart_source, chart_url, executor, executor_for, fast, items, ScriptedTransport, Step};
use chart_harvester::fetcher::FetchError;
use chart_harvester::harvest::{HarvestOptions, TaskStatus};
use chart_harvester::FetchTask;
use std::sync::Arc;
use std::time::Duration;

fn stalled_options() -> HarvestOptions {
    fast(HarvestOptions::sequential())
        .with_timeout(Duration::from_millis(50))
        .with_max_retries(2)
}

#[tokio::test]
async fn test_repeated_timeouts_yield_one_terminal_failure() {
    let transport = Arc::new(ScriptedTransport::new(Step::Stall(Duration::from_millis(500))));

    let outcome = executor(&transport, stalled_options().with_retry_pass(false))
        .run(vec![FetchTask::chart("us", "top")], None)
        .await
        .unwrap();

    let summary = &outcome.summary;
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].kind, TaskStatus::Failed);
    assert_eq!(summary.failures[0].attempts, 3);
    assert!(summary.failures[0].message.contains("timed out"));
    assert_eq!(transport.count(&chart_url("us", "top")), 3);
}

#[tokio::test]
async fn test_retry_pass_still_reports_one_failure_per_task() {
    let transport = Arc::new(ScriptedTransport::new(Step::Stall(Duration::from_millis(500))));

    let outcome = executor(&transport, stalled_options())
        .run(vec![FetchTask::chart("us", "top")], None)
        .await
        .unwrap();

    let summary = &outcome.summary;
    assert_eq!(summary.retried, 1);
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].attempts, 6);
    assert_eq!(summary.requests, 6);
    assert!(summary.is_consistent());
}

#[tokio::test]
async fn test_retry_pass_recovers_server_errors() {
    let transport = Arc::new(
        ScriptedTransport::new(Step::status(404)).chart(
            "us",
            "top",
            vec![Step::status(503), Step::status(503), items(&["XYZ"])],
        ),
    );

    let outcome = executor(&transport, fast(HarvestOptions::sequential()).with_max_retries(1))
        .run(vec![FetchTask::chart("us", "top")], None)
        .await
        .unwrap();

    let summary = &outcome.summary;
    assert_eq!(summary.retried, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(summary.failures.is_empty());
    assert_eq!(summary.requests, 3);
    assert!(outcome.accumulator.ids().contains("XYZ"));
}

#[tokio::test]
async fn test_network_errors_join_retry_pass() {
    let transport = Arc::new(
        ScriptedTransport::new(Step::status(404)).chart(
            "gb",
            "top",
            vec![
                Step::Fail(FetchError::Network("connection refused".into())),
                items(&["ABC"]),
            ],
        ),
    );

    let outcome = executor(&transport, fast(HarvestOptions::sequential()).with_max_retries(0))
        .run(vec![FetchTask::chart("gb", "top")], None)
        .await
        .unwrap();

    assert_eq!(outcome.summary.retried, 1);
    assert_eq!(outcome.summary.succeeded, 1);
}

#[tokio::test]
async fn test_parse_errors_skip_retry_pass() {
    let transport = Arc::new(ScriptedTransport::new(Step::body("<html>blocked</html>")));

    let outcome = executor(&transport, fast(HarvestOptions::sequential()))
        .run(vec![FetchTask::chart("us", "top")], None)
        .await
        .unwrap();

    let summary = &outcome.summary;
    assert_eq!(summary.retried, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].attempts, 1);
    assert!(summary.failures[0].message.contains("parse error"));
}

#[tokio::test]
async fn test_empty_result_retried_when_source_asks() {
    let transport = Arc::new(
        ScriptedTransport::new(Step::status(404)).chart("us", "top", vec![items(&[]), items(&["ABC"])]),
    );

    let outcome = executor(&transport, fast(HarvestOptions::sequential()))
        .run(vec![FetchTask::chart("us", "top")], None)
        .await
        .unwrap();

    assert_eq!(outcome.summary.retried, 1);
    assert_eq!(outcome.summary.succeeded, 1);
    assert_eq!(outcome.summary.empty, 0);
    assert_eq!(transport.count(&chart_url("us", "top")), 2);
}

#[tokio::test]
async fn test_empty_result_final_without_retry_empty() {
    let transport = Arc::new(
        ScriptedTransport::new(Step::status(404)).chart("us", "top", vec![items(&[]), items(&["ABC"])]),
    );
    let source = chart_source().with_retry_empty(false);

    let outcome = executor_for(&source, &transport, fast(HarvestOptions::sequential()))
        .run(vec![FetchTask::chart("us", "top")], None)
        .await
        .unwrap();

    assert_eq!(outcome.summary.retried, 0);
    assert_eq!(outcome.summary.empty, 1);
    assert!(outcome.summary.failures.is_empty());
    assert_eq!(transport.count(&chart_url("us", "top")), 1);
}

#[tokio::test]
async fn test_rate_limited_tasks_retried_after_first_pass() {
    let transport = Arc::new(
        ScriptedTransport::new(Step::status(404))
            .chart("us", "top", vec![Step::rate_limited(), items(&["ABC"])])
            .chart("gb", "top", vec![items(&["DEF"])]),
    );

    let outcome = executor(&transport, fast(HarvestOptions::sequential()).with_max_retries(0))
        .run(vec![FetchTask::chart("gb", "top"), FetchTask::chart("us", "top")], None)
        .await
        .unwrap();

    let summary = &outcome.summary;
    assert_eq!(summary.first_rate_limited, Some(2));
    assert_eq!(summary.retried, 1);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.rate_limited, 0);

    // The retried task is finalized after the first pass
    let order: Vec<_> = outcome.accumulator.batches().iter().map(|b| b.task.clone()).collect();
    assert_eq!(order, vec![FetchTask::chart("gb", "top"), FetchTask::chart("us", "top")]);
}
