//! CSV writers for records, identifier lists and deltas

use super::{BatchReport, OutputError, OutputResult, RecordSink};
use crate::harvest::accumulator::TaskBatch;
use crate::harvest::config::FLUSH_INTERVAL;
use crate::harvest::task::FetchTask;
use crate::reconcile::Delta;
use crate::Record;
use csv::{Writer, WriterBuilder};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// Identifier column name used when a source does not name one
pub const DEFAULT_ID_COLUMN: &str = "Identifier";

/// Record columns preceding the identifier column
pub const RECORD_COLUMNS: [&str; 8] = [
    "Region",
    "Category",
    "Rank",
    "ShowName",
    "Publisher",
    "ImageURL",
    "Description",
    "ChartRankMove",
];

/// Header of the delta file
pub const DELTA_HEADER: [&str; 2] = ["Identifier", "Status"];

/// Streams records to a CSV file, one task batch at a time
///
/// The file is truncated on open and the header written immediately, so an
/// interrupted run still leaves a valid file holding every batch written so
/// far.
pub struct CsvRecordWriter {
    writer: Writer<BufWriter<File>>,
    path: PathBuf,
    rows_written: u64,
}

impl CsvRecordWriter {
    /// Create the file and write the header
    ///
    /// # Arguments
    /// * `path` - Output file path; parent directories are created
    /// * `id_column` - Name of the trailing identifier column (e.g. `ShowID`)
    pub fn create<P: AsRef<Path>>(path: P, id_column: &str) -> OutputResult<Self> {
        let path = path.as_ref();
        info!("Creating CSV record writer: path={}", path.display());

        let mut writer = open_writer(path)?;
        let header = RECORD_COLUMNS.iter().copied().chain(std::iter::once(id_column));
        writer
            .write_record(header)
            .map_err(|e| OutputError::Csv(format!("Failed to write header: {e}")))?;

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows_written: 0,
        })
    }

    /// Rows written so far, excluding the header
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Output path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one record
    pub fn write_record(&mut self, task: &FetchTask, record: &Record) -> OutputResult<()> {
        let (region, category) = match task {
            FetchTask::Chart { country, category } => (country.to_uppercase(), category.clone()),
            FetchTask::Shard { url } => (String::new(), url.clone()),
        };
        let rank = record.rank.to_string();

        self.writer
            .write_record([
                region.as_str(),
                category.as_str(),
                rank.as_str(),
                record.name.as_str(),
                record.publisher.as_str(),
                record.image_url.as_deref().unwrap_or(""),
                record.description.as_deref().unwrap_or(""),
                record.movement.as_deref().unwrap_or(""),
                record.id.as_str(),
            ])
            .map_err(|e| OutputError::Csv(format!("Failed to write record: {e}")))?;

        self.rows_written += 1;
        if self.rows_written % FLUSH_INTERVAL as u64 == 0 {
            self.flush()?;
            debug!("Progress: {} rows written", self.rows_written);
        }
        Ok(())
    }

    /// Flush buffered rows to disk
    pub fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::Io(format!("Failed to flush {}: {e}", self.path.display())))
    }
}

impl RecordSink for CsvRecordWriter {
    fn write_batch(&mut self, task: &FetchTask, records: &[Record]) -> OutputResult<BatchReport> {
        for record in records {
            self.write_record(task, record)?;
        }
        Ok(BatchReport {
            inserted: records.len(),
            errors: 0,
        })
    }

    fn finish(&mut self) -> OutputResult<()> {
        self.flush()?;
        info!(
            "CSV record writer finished: {} rows written to {}",
            self.rows_written,
            self.path.display()
        );
        Ok(())
    }
}

/// Write every batch to a fresh record file
///
/// Used for end-of-run output in parallel mode (batches sorted first) and for
/// the fallback flush after a fatal sink error.
pub fn write_records<P: AsRef<Path>>(path: P, batches: &[TaskBatch], id_column: &str) -> OutputResult<u64> {
    let mut writer = CsvRecordWriter::create(path, id_column)?;
    for batch in batches {
        writer.write_batch(&batch.task, &batch.records)?;
    }
    writer.finish()?;
    Ok(writer.rows_written())
}

/// Write identifiers one per row under `header`, sorted ascending
pub fn write_identifiers<P, I, S>(path: P, ids: I, header: &str) -> OutputResult<usize>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let path = path.as_ref();
    let sorted: BTreeSet<String> = ids
        .into_iter()
        .map(|id| id.as_ref().trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();

    let mut writer = open_writer(path)?;
    writer
        .write_record([header])
        .map_err(|e| OutputError::Csv(format!("Failed to write header: {e}")))?;
    for id in &sorted {
        writer
            .write_record([id.as_str()])
            .map_err(|e| OutputError::Csv(format!("Failed to write identifier: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| OutputError::Io(format!("Failed to flush {}: {e}", path.display())))?;

    info!("Wrote {} identifiers to {}", sorted.len(), path.display());
    Ok(sorted.len())
}

/// Write a delta as `Identifier,Status` rows sorted by identifier
pub fn write_delta<P: AsRef<Path>>(path: P, delta: &Delta) -> OutputResult<usize> {
    let path = path.as_ref();
    let mut writer = open_writer(path)?;
    writer
        .write_record(DELTA_HEADER)
        .map_err(|e| OutputError::Csv(format!("Failed to write header: {e}")))?;

    let rows = delta.rows();
    for (id, status) in &rows {
        let status = status.to_string();
        writer
            .write_record([*id, status.as_str()])
            .map_err(|e| OutputError::Csv(format!("Failed to write delta row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| OutputError::Io(format!("Failed to flush {}: {e}", path.display())))?;

    info!(
        new = delta.new_only.len(),
        snapshot_only = delta.snapshot_only.len(),
        common = delta.common.len(),
        "Wrote delta to {}",
        path.display()
    );
    Ok(rows.len())
}

fn open_writer(path: &Path) -> OutputResult<Writer<BufWriter<File>>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutputError::Io(format!("Failed to create directory: {e}")))?;
        }
    }

    let file = File::create(path)
        .map_err(|e| OutputError::Io(format!("Failed to create {}: {e}", path.display())))?;
    let buf_writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);

    // Headers are written explicitly: the identifier column name varies by source
    Ok(WriterBuilder::new().has_headers(false).from_writer(buf_writer))
}
