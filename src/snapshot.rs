//! Snapshot loaders
//!
//! A snapshot is the set of identifiers a previous run (or another system)
//! already knows about. It is read once, before reconciliation, and never
//! modified afterwards.

use crate::identifier::{is_numeric, is_sql_identifier};
use crate::IdentifierSet;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

/// Storage format of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    /// CSV with the identifier in one column
    Csv,
    /// One identifier per line
    Text,
    /// JSON array of identifiers (or of objects carrying one)
    Json,
    /// SQLite table
    Sqlite,
}

impl SnapshotFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(SnapshotFormat::Csv),
            "txt" | "lst" => Some(SnapshotFormat::Text),
            "json" => Some(SnapshotFormat::Json),
            "db" | "sqlite" | "sqlite3" => Some(SnapshotFormat::Sqlite),
            _ => None,
        }
    }
}

/// Which column holds the identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdColumn {
    /// Header name (CSV), object key (JSON) or column name (SQLite)
    Named(String),
    /// Zero-based position (CSV only)
    Index(usize),
}

impl Default for IdColumn {
    fn default() -> Self {
        IdColumn::Index(0)
    }
}

impl IdColumn {
    /// Parse a CLI value: digits select a position, anything else a name
    pub fn parse(value: &str) -> Self {
        match value.trim().parse::<usize>() {
            Ok(index) => IdColumn::Index(index),
            Err(_) => IdColumn::Named(value.trim().to_string()),
        }
    }
}

/// Which identifiers are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdFilter {
    /// Any non-empty value
    #[default]
    Any,
    /// Only all-digit values (Apple / iTunes ids)
    Numeric,
}

impl IdFilter {
    fn accepts(&self, id: &str) -> bool {
        match self {
            IdFilter::Any => !id.is_empty(),
            IdFilter::Numeric => is_numeric(id),
        }
    }
}

/// How to read a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotOptions {
    /// Explicit format; guessed from the extension when `None`
    pub format: Option<SnapshotFormat>,
    /// Identifier column
    pub column: IdColumn,
    /// Whether a CSV file starts with a header row
    pub has_headers: bool,
    /// Value filter
    pub filter: IdFilter,
    /// Table name for SQLite snapshots
    pub table: Option<String>,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            format: None,
            column: IdColumn::default(),
            has_headers: true,
            filter: IdFilter::Any,
            table: None,
        }
    }
}

impl SnapshotOptions {
    /// Set the identifier column
    pub fn with_column(mut self, column: IdColumn) -> Self {
        self.column = column;
        self
    }

    /// Set the value filter
    pub fn with_filter(mut self, filter: IdFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the SQLite table
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Declare whether CSV input has a header row
    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }
}

/// Previously known identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    ids: IdentifierSet,
    skipped: usize,
}

impl Snapshot {
    /// Wrap an existing set
    pub fn from_ids(ids: IdentifierSet) -> Self {
        Self { ids, skipped: 0 }
    }

    /// Load a snapshot from `path`
    ///
    /// A missing file is an empty snapshot, logged as a warning.
    pub fn load(path: &Path, options: &SnapshotOptions) -> Result<Self, SnapshotError> {
        if !path.exists() {
            warn!(path = %path.display(), "Snapshot file not found; treating as empty");
            return Ok(Self::default());
        }

        let format = options
            .format
            .or_else(|| SnapshotFormat::from_path(path))
            .ok_or_else(|| SnapshotError::UnknownFormat(path.display().to_string()))?;

        let snapshot = match format {
            SnapshotFormat::Csv => {
                let file = open(path)?;
                Self::from_csv_reader(file, &options.column, options.has_headers, options.filter)?
            }
            SnapshotFormat::Text => Self::from_text_reader(BufReader::new(open(path)?), options.filter)?,
            SnapshotFormat::Json => {
                let column = match &options.column {
                    IdColumn::Named(name) => Some(name.as_str()),
                    IdColumn::Index(_) => None,
                };
                Self::from_json_reader(open(path)?, column, options.filter)?
            }
            SnapshotFormat::Sqlite => {
                let table = options
                    .table
                    .as_deref()
                    .ok_or_else(|| SnapshotError::InvalidIdentifier("SQLite snapshot needs a table".to_string()))?;
                let column = match &options.column {
                    IdColumn::Named(name) => name.as_str(),
                    IdColumn::Index(_) => "identifier",
                };
                Self::from_sqlite(path, table, column, options.filter)?
            }
        };

        info!(
            path = %path.display(),
            ids = snapshot.len(),
            skipped = snapshot.skipped,
            "Snapshot loaded"
        );
        Ok(snapshot)
    }

    /// Read identifiers from CSV
    pub fn from_csv_reader<R: Read>(
        reader: R,
        column: &IdColumn,
        has_headers: bool,
        filter: IdFilter,
    ) -> Result<Self, SnapshotError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(has_headers)
            .flexible(true)
            .from_reader(reader);

        let index = match column {
            IdColumn::Index(index) => *index,
            IdColumn::Named(name) => {
                if !has_headers {
                    return Err(SnapshotError::MissingColumn(format!(
                        "column '{name}' requested but the CSV has no header row"
                    )));
                }
                let headers = csv_reader.headers().map_err(|e| SnapshotError::Csv(e.to_string()))?;
                headers
                    .iter()
                    .position(|h| h.trim().trim_start_matches('\u{feff}') == name)
                    .ok_or_else(|| SnapshotError::MissingColumn(name.clone()))?
            }
        };

        let mut snapshot = Self::default();
        for row in csv_reader.records() {
            let row = row.map_err(|e| SnapshotError::Csv(e.to_string()))?;
            snapshot.offer(row.get(index).unwrap_or(""), filter);
        }
        Ok(snapshot)
    }

    /// Read one identifier per line; blank lines and `#` comments are ignored
    pub fn from_text_reader<R: BufRead>(reader: R, filter: IdFilter) -> Result<Self, SnapshotError> {
        let mut snapshot = Self::default();
        for line in reader.lines() {
            let line = line.map_err(|e| SnapshotError::Io(e.to_string()))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            snapshot.offer(line, filter);
        }
        Ok(snapshot)
    }

    /// Read a JSON array of identifiers, or of objects holding one under `key`
    pub fn from_json_reader<R: Read>(reader: R, key: Option<&str>, filter: IdFilter) -> Result<Self, SnapshotError> {
        let value: Value = serde_json::from_reader(reader).map_err(|e| SnapshotError::Json(e.to_string()))?;
        let Value::Array(items) = value else {
            return Err(SnapshotError::Json("expected a top-level array".to_string()));
        };

        let mut snapshot = Self::default();
        for item in &items {
            let scalar = match (item, key) {
                (Value::Object(map), Some(key)) => map.get(key),
                (Value::Object(_), None) => None,
                (other, _) => Some(other),
            };
            match scalar.and_then(scalar_text) {
                Some(id) => snapshot.offer(&id, filter),
                None => snapshot.skipped += 1,
            }
        }
        Ok(snapshot)
    }

    /// Read `SELECT column FROM table`
    ///
    /// The database is opened read-only; table and column must be plain SQL
    /// identifiers.
    pub fn from_sqlite(path: &Path, table: &str, column: &str, filter: IdFilter) -> Result<Self, SnapshotError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| SnapshotError::Database(e.to_string()))?;
        Self::from_connection(&conn, table, column, filter)
    }

    /// Read `SELECT column FROM table` on an open connection
    pub fn from_connection(conn: &Connection, table: &str, column: &str, filter: IdFilter) -> Result<Self, SnapshotError> {
        for ident in [table, column] {
            if !is_sql_identifier(ident) {
                return Err(SnapshotError::InvalidIdentifier(ident.to_string()));
            }
        }

        let sql = format!("SELECT \"{column}\" FROM \"{table}\"");
        debug!(sql = %sql, "Reading snapshot table");
        let mut stmt = conn.prepare(&sql).map_err(|e| SnapshotError::Database(e.to_string()))?;
        let mut rows = stmt.query([]).map_err(|e| SnapshotError::Database(e.to_string()))?;

        let mut snapshot = Self::default();
        while let Some(row) = rows.next().map_err(|e| SnapshotError::Database(e.to_string()))? {
            let value = row.get_ref(0).map_err(|e| SnapshotError::Database(e.to_string()))?;
            match value {
                ValueRef::Integer(n) => snapshot.offer(&n.to_string(), filter),
                ValueRef::Text(bytes) => snapshot.offer(&String::from_utf8_lossy(bytes), filter),
                _ => snapshot.skipped += 1,
            }
        }
        Ok(snapshot)
    }

    fn offer(&mut self, raw: &str, filter: IdFilter) {
        let id = raw.trim();
        if filter.accepts(id) {
            self.ids.insert(id);
        } else {
            self.skipped += 1;
        }
    }

    /// Known identifiers
    pub fn ids(&self) -> &IdentifierSet {
        &self.ids
    }

    /// Membership test
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of identifiers
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Values dropped by the filter (or not usable as identifiers)
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Give up the identifier set
    pub fn into_ids(self) -> IdentifierSet {
        self.ids
    }
}

fn open(path: &Path) -> Result<File, SnapshotError> {
    File::open(path).map_err(|e| SnapshotError::Io(format!("{}: {e}", path.display())))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Snapshot loading errors
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// File could not be read
    #[error("IO error: {0}")]
    Io(String),

    /// Malformed CSV
    #[error("CSV error: {0}")]
    Csv(String),

    /// Malformed JSON
    #[error("JSON error: {0}")]
    Json(String),

    /// SQLite failure
    #[error("database error: {0}")]
    Database(String),

    /// Named column not present
    #[error("identifier column not found: {0}")]
    MissingColumn(String),

    /// Table or column name is not a plain SQL identifier
    #[error("invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    /// Extension does not name a known format
    #[error("cannot infer snapshot format for {0}")]
    UnknownFormat(String),
}
