//! Cooperative cancellation and fatal sink errors

use crate::support::{executor, fast, items, ScriptedTransport, Step};
use chart_harvester::harvest::{HarvestError, HarvestOptions};
use chart_harvester::output::csv::write_records;
use chart_harvester::output::{BatchReport, OutputError, OutputResult, RecordSink};
use chart_harvester::shutdown::{ShutdownCoordinator, ShutdownReason};
use chart_harvester::{FetchTask, Record};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn tasks(n: usize) -> Vec<FetchTask> {
    (0..n).map(|i| FetchTask::chart("us", format!("cat{i}"))).collect()
}

/// Accepts `healthy` batches, then loses its connection
struct FlakySink {
    healthy: usize,
    written: usize,
}

impl RecordSink for FlakySink {
    fn write_batch(&mut self, _task: &FetchTask, records: &[Record]) -> OutputResult<BatchReport> {
        if self.written == self.healthy {
            return Err(OutputError::Connection("server closed the connection".into()));
        }
        self.written += 1;
        Ok(BatchReport {
            inserted: records.len(),
            errors: 0,
        })
    }
}

#[tokio::test]
async fn test_interrupt_before_start_dispatches_nothing() {
    let transport = Arc::new(ScriptedTransport::new(items(&["ABC"])));
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request(ShutdownReason::Interrupt);

    let outcome = executor(&transport, fast(HarvestOptions::sequential()))
        .with_shutdown(shutdown)
        .run(tasks(5), None)
        .await
        .unwrap();

    assert_eq!(outcome.summary.attempted, 0);
    assert_eq!(outcome.summary.skipped, 5);
    assert!(outcome.summary.cancelled);
    assert_eq!(outcome.summary.cancel_reason.as_deref(), Some("interrupted"));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_interrupt_mid_run_keeps_partial_results() {
    let transport = Arc::new(ScriptedTransport::new(items(&["ABC"])));
    let shutdown = ShutdownCoordinator::shared();
    let options = fast(HarvestOptions::sequential()).with_task_delay(Duration::from_millis(50));

    let trigger = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            shutdown.request(ShutdownReason::Interrupt);
        })
    };

    let outcome = executor(&transport, options)
        .with_shutdown(shutdown)
        .run(tasks(100), None)
        .await
        .unwrap();
    trigger.await.unwrap();

    let summary = &outcome.summary;
    assert!(summary.cancelled);
    assert!(summary.attempted >= 1 && summary.attempted < 100);
    assert_eq!(summary.attempted + summary.skipped, 100);
    assert_eq!(outcome.accumulator.batches().len(), summary.attempted);
    assert!(outcome.accumulator.ids().contains("ABC"));
}

#[tokio::test]
async fn test_sink_failure_stops_run_and_returns_partial_outcome() {
    let transport = Arc::new(ScriptedTransport::new(items(&["ABC", "DEF"])));
    let mut sink = FlakySink { healthy: 2, written: 0 };

    let result = executor(&transport, fast(HarvestOptions::sequential()))
        .run(tasks(6), Some(&mut sink as &mut dyn RecordSink))
        .await;

    let (error, outcome) = match result {
        Err(HarvestError::Sink { error, outcome }) => (error, outcome),
        other => panic!("expected sink failure, got {other:?}"),
    };
    assert!(matches!(error, OutputError::Connection(_)));
    assert_eq!(outcome.summary.attempted, 3);
    assert_eq!(outcome.summary.skipped, 3);
    assert_eq!(outcome.summary.inserted, 4);
    assert_eq!(outcome.summary.cancel_reason.as_deref(), Some("sink failure"));
    // The batch the sink rejected is still held in memory
    assert_eq!(outcome.accumulator.record_count(), 6);

    // Fallback flush of everything accumulated
    let temp_dir = TempDir::new().unwrap();
    let fallback = temp_dir.path().join("fallback.csv");
    let rows = write_records(&fallback, outcome.accumulator.batches(), "ShowID").unwrap();
    assert_eq!(rows, 6);
    assert_eq!(transport.calls().len(), 3);
}

#[tokio::test]
async fn test_sink_failure_skips_retry_pass() {
    let transport = Arc::new(
        ScriptedTransport::new(items(&["ABC"])).chart("us", "cat0", vec![Step::status(503)]),
    );
    let mut sink = FlakySink { healthy: 0, written: 0 };

    let result = executor(&transport, fast(HarvestOptions::sequential()).with_max_retries(0))
        .run(tasks(3), Some(&mut sink as &mut dyn RecordSink))
        .await;

    let Err(HarvestError::Sink { outcome, .. }) = result else {
        panic!("expected sink failure");
    };
    assert_eq!(outcome.summary.retried, 0);
    assert_eq!(outcome.summary.failed, 1);
    assert!(outcome.summary.is_consistent());
}
