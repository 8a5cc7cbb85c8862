//! Record and identifier sinks

use crate::harvest::task::FetchTask;
use crate::Record;

pub mod csv;
pub mod sqlite;

/// Output errors
///
/// Returned errors are fatal to a run. Rows a sink rejects one at a time are
/// counted in [`BatchReport::errors`] instead.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// File could not be created, written or synced
    #[error("IO error: {0}")]
    Io(String),

    /// CSV encoding error
    #[error("CSV error: {0}")]
    Csv(String),

    /// Statement or transaction failure
    #[error("database error: {0}")]
    Database(String),

    /// Database could not be opened or prepared
    #[error("database connection error: {0}")]
    Connection(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Rows written for one task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Rows stored
    pub inserted: usize,
    /// Rows rejected and skipped
    pub errors: usize,
}

/// Destination for records, fed one task's batch at a time
pub trait RecordSink {
    /// Store one task's records
    fn write_batch(&mut self, task: &FetchTask, records: &[Record]) -> OutputResult<BatchReport>;

    /// Flush anything buffered
    fn finish(&mut self) -> OutputResult<()> {
        Ok(())
    }
}
