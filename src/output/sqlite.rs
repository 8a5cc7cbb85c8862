//! SQLite relational sink
//!
//! One transaction per task batch. A row the database rejects is skipped and
//! counted; the rest of the batch still commits.

use super::{BatchReport, OutputError, OutputResult, RecordSink};
use crate::harvest::task::FetchTask;
use crate::identifier::is_sql_identifier;
use crate::metrics;
use crate::Record;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Default chart table name
pub const DEFAULT_CHART_TABLE: &str = "podcast_charts";

/// Default table for newly discovered identifiers
pub const DEFAULT_DISCOVERY_TABLE: &str = "discovered_podcasts";

/// Upper bound on percent-decoding rounds for double-encoded categories
const MAX_DECODE_ROUNDS: usize = 5;

/// Relational sink for chart records
pub struct SqliteSink {
    conn: Connection,
    table: String,
    country_names: BTreeMap<String, String>,
    inserted: usize,
    errors: usize,
}

impl SqliteSink {
    /// Open (or create) a database file and ensure the chart table exists
    ///
    /// Failure here is a connection error and fatal to the run.
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> OutputResult<Self> {
        let path = path.as_ref();
        info!("Opening SQLite sink: path={} table={}", path.display(), table);
        let conn = Connection::open(path)
            .map_err(|e| OutputError::Connection(format!("{}: {e}", path.display())))?;
        Self::from_connection(conn, table)
    }

    /// Wrap an open connection and ensure the chart table exists
    pub fn from_connection(conn: Connection, table: &str) -> OutputResult<Self> {
        ensure_ident(table)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identifier TEXT,
                name TEXT,
                publisher TEXT,
                image_url TEXT,
                description TEXT,
                country_name TEXT,
                country_code TEXT,
                category TEXT,
                rank INTEGER,
                created_at TEXT,
                updated_at TEXT
            );"
        ))
        .map_err(|e| OutputError::Connection(format!("Failed to prepare table {table}: {e}")))?;

        Ok(Self {
            conn,
            table: table.to_string(),
            country_names: BTreeMap::new(),
            inserted: 0,
            errors: 0,
        })
    }

    /// Country code to display name lookup used for `country_name`
    pub fn with_country_names(mut self, names: BTreeMap<String, String>) -> Self {
        self.country_names = names
            .into_iter()
            .map(|(code, name)| (code.to_ascii_lowercase(), name))
            .collect();
        self
    }

    /// Underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Rows inserted and rejected so far
    pub fn totals(&self) -> BatchReport {
        BatchReport {
            inserted: self.inserted,
            errors: self.errors,
        }
    }

    fn country_name(&self, code: &str) -> &str {
        self.country_names
            .get(&code.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or("")
    }
}

impl RecordSink for SqliteSink {
    fn write_batch(&mut self, task: &FetchTask, records: &[Record]) -> OutputResult<BatchReport> {
        if records.is_empty() {
            return Ok(BatchReport::default());
        }

        let (country_code, category) = match task {
            FetchTask::Chart { country, category } => (country.to_uppercase(), display_category(category)),
            FetchTask::Shard { url } => (String::new(), url.clone()),
        };
        let country_name = self.country_name(&country_code).to_string();
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let sql = format!(
            "INSERT INTO \"{}\" (identifier, name, publisher, image_url, description, \
             country_name, country_code, category, rank, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            self.table
        );

        let tx = self
            .conn
            .transaction()
            .map_err(|e| OutputError::Database(format!("Failed to begin transaction: {e}")))?;

        let mut report = BatchReport::default();
        {
            let mut stmt = tx
                .prepare_cached(&sql)
                .map_err(|e| OutputError::Database(format!("Failed to prepare insert: {e}")))?;

            for record in records {
                let result = stmt.execute(params![
                    record.id,
                    record.name,
                    record.publisher,
                    record.image_url,
                    record.description,
                    country_name,
                    country_code,
                    category,
                    record.rank,
                    now,
                ]);
                match result {
                    Ok(_) => report.inserted += 1,
                    Err(e) => {
                        report.errors += 1;
                        warn!(
                            task = %task,
                            rank = record.rank,
                            identifier = %record.id,
                            error = %e,
                            "Row insert failed; skipping"
                        );
                    }
                }
            }
        }

        tx.commit()
            .map_err(|e| OutputError::Database(format!("Failed to commit batch for {task}: {e}")))?;

        self.inserted += report.inserted;
        self.errors += report.errors;
        metrics::record_sink_batch(report.inserted, report.errors);
        debug!(
            task = %task,
            inserted = report.inserted,
            errors = report.errors,
            "Batch committed"
        );
        Ok(report)
    }
}

/// Insert identifiers into a `(identifier, discovered_at)` table
///
/// The table is created when missing. Returns the report for the whole set,
/// committed in one transaction.
pub fn insert_identifiers<'a, I>(conn: &mut Connection, table: &str, ids: I) -> OutputResult<BatchReport>
where
    I: IntoIterator<Item = &'a String>,
{
    ensure_ident(table)?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (identifier TEXT, discovered_at TEXT);"
    ))
    .map_err(|e| OutputError::Connection(format!("Failed to prepare table {table}: {e}")))?;

    let now = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let tx = conn
        .transaction()
        .map_err(|e| OutputError::Database(format!("Failed to begin transaction: {e}")))?;

    let mut report = BatchReport::default();
    {
        let sql = format!("INSERT INTO \"{table}\" (identifier, discovered_at) VALUES (?1, ?2)");
        let mut stmt = tx
            .prepare(&sql)
            .map_err(|e| OutputError::Database(format!("Failed to prepare insert: {e}")))?;
        for id in ids {
            match stmt.execute(params![id, now]) {
                Ok(_) => report.inserted += 1,
                Err(e) => {
                    report.errors += 1;
                    warn!(identifier = %id, error = %e, "Identifier insert failed; skipping");
                }
            }
        }
    }
    tx.commit()
        .map_err(|e| OutputError::Database(format!("Failed to commit identifiers: {e}")))?;

    metrics::record_sink_batch(report.inserted, report.errors);
    info!(table = table, inserted = report.inserted, errors = report.errors, "Identifiers stored");
    Ok(report)
}

/// Human-readable category name
///
/// Undoes repeated percent-encoding, turns `_` and `-` into spaces and
/// title-cases each word: `health%252520%2526%252520fitness` becomes
/// `Health & Fitness`, `top_episodes` becomes `Top Episodes`.
pub fn display_category(raw: &str) -> String {
    let mut decoded = raw.to_string();
    for _ in 0..MAX_DECODE_ROUNDS {
        match urlencoding::decode(&decoded) {
            Ok(next) if next != decoded => decoded = next.into_owned(),
            _ => break,
        }
    }

    decoded
        .replace(['_', '-'], " ")
        .split_whitespace()
        .map(title_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn ensure_ident(name: &str) -> OutputResult<()> {
    if is_sql_identifier(name) {
        Ok(())
    } else {
        Err(OutputError::Connection(format!("invalid table name: {name}")))
    }
}
