//! Parallel runs: completion, order independence, rate-limit boundary

use crate::support::{executor, fast, items, ScriptedTransport, Step};
use chart_harvester::harvest::{HarvestOptions, RateLimitResponse, RetryPolicy};
use chart_harvester::FetchTask;
use std::sync::Arc;
use std::time::Duration;

fn country_tasks(n: usize) -> Vec<FetchTask> {
    (0..n).map(|i| FetchTask::chart(format!("c{i:02}"), "top")).collect()
}

#[tokio::test]
async fn test_parallel_run_completes_every_task() {
    let transport = Arc::new(
        ScriptedTransport::new(items(&["SHARED"]))
            .chart("c03", "top", vec![items(&["C03", "SHARED"])])
            .chart("c11", "top", vec![items(&["C11"])]),
    );
    let tasks = country_tasks(20);

    let outcome = executor(&transport, fast(HarvestOptions::parallel(8)))
        .run(tasks.clone(), None)
        .await
        .unwrap();

    assert_eq!(outcome.summary.attempted, 20);
    assert_eq!(outcome.summary.succeeded, 20);
    assert_eq!(outcome.summary.records, 21);
    let ids: Vec<&String> = outcome.accumulator.ids().iter().collect();
    assert_eq!(ids, vec!["C03", "C11", "SHARED"]);

    // Parallel batches are sorted by task once the run ends
    let order: Vec<&FetchTask> = outcome.accumulator.batches().iter().map(|b| &b.task).collect();
    assert_eq!(order, tasks.iter().collect::<Vec<_>>());
    assert_eq!(transport.calls().len(), 20);
}

#[tokio::test]
async fn test_overlapping_results_merge_regardless_of_completion_order() {
    let transport = Arc::new(
        ScriptedTransport::new(Step::status(404))
            .chart("aa", "top", vec![items(&["ABC", "DEF"])])
            .chart("bb", "top", vec![items(&["DEF", "GHI"])]),
    );

    for workers in [1, 2] {
        let outcome = executor(&transport, fast(HarvestOptions::parallel(workers)))
            .run(vec![FetchTask::chart("aa", "top"), FetchTask::chart("bb", "top")], None)
            .await
            .unwrap();
        let ids: Vec<&String> = outcome.accumulator.ids().iter().collect();
        assert_eq!(ids, vec!["ABC", "DEF", "GHI"]);
        assert_eq!(outcome.summary.unique_ids, 3);
    }
}

#[tokio::test]
async fn test_first_429_stops_new_dispatches() {
    let transport = Arc::new(ScriptedTransport::new(Step::rate_limited()));
    let options = fast(HarvestOptions::parallel(4))
        .with_retry(RetryPolicy::none())
        .with_rate_limit_response(RateLimitResponse::Abort { after_consecutive: 1 })
        .with_retry_pass(false);

    let outcome = executor(&transport, options)
        .run(vec![FetchTask::chart("us", "top"); 50], None)
        .await
        .unwrap();

    let summary = &outcome.summary;
    assert!(summary.cancelled);
    assert_eq!(summary.cancel_reason.as_deref(), Some("rate limit boundary reached"));
    assert!(summary.first_rate_limited.is_some());
    assert!(summary.attempted >= 1 && summary.attempted <= 8, "attempted {}", summary.attempted);
    assert_eq!(summary.attempted + summary.skipped, 50);
    assert_eq!(summary.requests as usize, summary.attempted);
    assert_eq!(transport.calls().len(), summary.attempted);
}

#[tokio::test]
async fn test_sequential_abort_after_consecutive_threshold() {
    let transport = Arc::new(
        ScriptedTransport::new(Step::rate_limited()).chart("c00", "top", vec![items(&["OK"])]),
    );
    let options = fast(HarvestOptions::sequential())
        .with_retry(RetryPolicy::none())
        .abort_on_rate_limit()
        .with_retry_pass(false);

    let outcome = executor(&transport, options).run(country_tasks(10), None).await.unwrap();

    let summary = &outcome.summary;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.rate_limited, 3);
    assert_eq!(summary.attempted, 4);
    assert_eq!(summary.skipped, 6);
    assert_eq!(summary.first_rate_limited, Some(2));
}

#[tokio::test]
async fn test_slow_down_keeps_going() {
    let transport = Arc::new(ScriptedTransport::new(Step::rate_limited()));
    let options = fast(HarvestOptions::parallel(4))
        .with_retry(RetryPolicy::none())
        .with_retry_pass(false)
        .with_timeout(Duration::from_millis(100));

    let outcome = executor(&transport, options).run(country_tasks(12), None).await.unwrap();

    assert!(!outcome.summary.cancelled);
    assert_eq!(outcome.summary.rate_limited, 12);
    assert_eq!(outcome.summary.failures.len(), 12);
}
