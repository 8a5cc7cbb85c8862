//! Runs feeding the SQLite sink

use crate::support::{executor, fast, items, ScriptedTransport, Step};
use chart_harvester::harvest::HarvestOptions;
use chart_harvester::output::sqlite::{SqliteSink, DEFAULT_CHART_TABLE};
use chart_harvester::output::RecordSink;
use chart_harvester::FetchTask;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::sync::Arc;

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))
        .unwrap()
}

#[tokio::test]
async fn test_every_kept_record_is_inserted() {
    let transport = Arc::new(
        ScriptedTransport::new(Step::status(404))
            .chart("us", "top", vec![items(&["ABC", "DEF"])])
            .chart("gb", "top", vec![items(&["DEF", "GHI", "JKL"])]),
    );
    let names = BTreeMap::from([("GB".to_string(), "United Kingdom".to_string())]);
    let mut sink = SqliteSink::from_connection(Connection::open_in_memory().unwrap(), DEFAULT_CHART_TABLE)
        .unwrap()
        .with_country_names(names);

    let outcome = executor(&transport, fast(HarvestOptions::sequential()))
        .run(
            vec![FetchTask::chart("us", "top"), FetchTask::chart("gb", "top")],
            Some(&mut sink as &mut dyn RecordSink),
        )
        .await
        .unwrap();

    assert_eq!(outcome.summary.inserted, outcome.summary.records);
    assert_eq!(outcome.summary.insert_errors, 0);
    assert_eq!(sink.totals().inserted, 5);
    assert_eq!(count(sink.connection(), DEFAULT_CHART_TABLE), 5);

    let (name, rank): (String, i64) = sink
        .connection()
        .query_row(
            "SELECT country_name, rank FROM podcast_charts WHERE identifier = 'JKL'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(name, "United Kingdom");
    assert_eq!(rank, 3);
}

#[tokio::test]
async fn test_rejected_row_does_not_stop_the_run() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE strict_charts (
            identifier TEXT NOT NULL CHECK (identifier <> ''),
            name TEXT, publisher TEXT, image_url TEXT, description TEXT,
            country_name TEXT, country_code TEXT, category TEXT, rank INTEGER,
            created_at TEXT, updated_at TEXT
        );",
    )
    .unwrap();
    let mut sink = SqliteSink::from_connection(conn, "strict_charts").unwrap();

    // Third element has no identifier
    let transport = Arc::new(
        ScriptedTransport::new(Step::status(404))
            .chart("us", "top", vec![items(&["A1", "B2", "", "D4", "E5"])])
            .chart("us", "trending", vec![items(&["F6"])]),
    );

    let outcome = executor(&transport, fast(HarvestOptions::sequential()))
        .run(
            vec![FetchTask::chart("us", "top"), FetchTask::chart("us", "trending")],
            Some(&mut sink as &mut dyn RecordSink),
        )
        .await
        .unwrap();

    let summary = &outcome.summary;
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.records, 6);
    assert_eq!(summary.inserted, 5);
    assert_eq!(summary.insert_errors, 1);
    assert_eq!(summary.unique_ids, 5);
    assert_eq!(count(sink.connection(), "strict_charts"), 5);
}
