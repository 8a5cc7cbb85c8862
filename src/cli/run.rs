//! Shared harvest plumbing for the fetching commands
//!
//! Picks the sink, runs the executor, performs the fallback flush on a fatal
//! sink error and writes identifier and delta files afterwards.

use super::report::{self, WrittenFiles};
use super::{CliError, OutputFormat};
use crate::harvest::{HarvestError, HarvestExecutor, HarvestOutcome};
use crate::output::csv::{write_delta, write_identifiers, write_records, CsvRecordWriter};
use crate::output::sqlite::{SqliteSink, DEFAULT_CHART_TABLE};
use crate::output::RecordSink;
use crate::reconcile::{reconcile, Delta};
use crate::snapshot::{IdColumn, IdFilter, Snapshot, SnapshotOptions};
use crate::FetchTask;
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Where run results go
#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Record CSV file (streamed in sequential runs, written at the end otherwise)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Sorted list of unique identifiers
    #[arg(long)]
    pub ids_output: Option<PathBuf>,

    /// SQLite database receiving one row per record
    #[arg(long)]
    pub sqlite: Option<PathBuf>,

    /// Chart table for --sqlite
    #[arg(long, default_value = DEFAULT_CHART_TABLE)]
    pub table: String,

    /// File receiving every accumulated record if the sink fails mid-run
    #[arg(long)]
    pub fallback_csv: Option<PathBuf>,

    /// Delta CSV against --snapshot
    #[arg(long, requires = "snapshot")]
    pub delta_output: Option<PathBuf>,

    /// Identifiers absent from --snapshot
    #[arg(long, requires = "snapshot")]
    pub new_ids_output: Option<PathBuf>,
}

/// Previously collected identifiers to reconcile against
#[derive(Args, Debug, Clone)]
pub struct SnapshotArgs {
    /// Snapshot file (.csv, .txt, .json or a SQLite database)
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Identifier column: header name, JSON key, SQLite column or 0-based index
    #[arg(long, default_value = "0")]
    pub snapshot_column: String,

    /// Table holding a SQLite snapshot
    #[arg(long)]
    pub snapshot_table: Option<String>,

    /// The CSV snapshot has no header row
    #[arg(long, default_value_t = false)]
    pub snapshot_no_header: bool,

    /// Keep all-digit identifiers only
    #[arg(long, default_value_t = false)]
    pub numeric_only: bool,
}

impl SnapshotArgs {
    /// Loader options described by the flags
    pub fn options(&self) -> SnapshotOptions {
        let filter = if self.numeric_only { IdFilter::Numeric } else { IdFilter::Any };
        let options = SnapshotOptions::default()
            .with_column(IdColumn::parse(&self.snapshot_column))
            .with_headers(!self.snapshot_no_header)
            .with_filter(filter);
        match &self.snapshot_table {
            Some(table) => options.with_table(table.clone()),
            None => options,
        }
    }

    /// Load the snapshot, if one was given
    pub fn load(&self) -> Result<Option<Snapshot>, CliError> {
        match &self.snapshot {
            Some(path) => Ok(Some(Snapshot::load(path, &self.options())?)),
            None => Ok(None),
        }
    }
}

/// Everything a fetching command hands to [`execute_harvest`]
pub struct HarvestJob<'a> {
    /// Configured executor
    pub executor: HarvestExecutor,
    /// Work-set
    pub tasks: Vec<FetchTask>,
    /// Identifier column header for CSV outputs
    pub id_column: &'a str,
    /// Country code to display name, for the relational sink
    pub country_names: &'a BTreeMap<String, String>,
}

/// Run a harvest and write every requested output
///
/// Returns an error only for fatal conditions: the snapshot or sink could
/// not be opened, or the sink failed mid-run (after the fallback flush).
pub async fn execute_harvest(
    job: HarvestJob<'_>,
    outputs: &OutputArgs,
    snapshot: &SnapshotArgs,
    format: OutputFormat,
) -> Result<(), CliError> {
    let snapshot = snapshot.load()?;
    let sequential = job.executor.options().workers == 1;

    let mut sqlite = match &outputs.sqlite {
        Some(path) => Some(SqliteSink::open(path, &outputs.table)?.with_country_names(job.country_names.clone())),
        None => None,
    };
    let mut streamed = match (&outputs.output, &sqlite) {
        (Some(path), None) if sequential => Some(CsvRecordWriter::create(path, job.id_column)?),
        _ => None,
    };
    let sink: Option<&mut dyn RecordSink> = match (sqlite.as_mut(), streamed.as_mut()) {
        (Some(sink), _) => Some(sink as &mut dyn RecordSink),
        (None, Some(writer)) => Some(writer as &mut dyn RecordSink),
        (None, None) => None,
    };

    let mut files = WrittenFiles::default();
    let outcome = match job.executor.run(job.tasks, sink).await {
        Ok(outcome) => outcome,
        Err(HarvestError::Sink { error, outcome }) => {
            error!("Sink failed mid-run: {}", error);
            if let Some(path) = &outputs.fallback_csv {
                match write_records(path, outcome.accumulator.batches(), job.id_column) {
                    Ok(rows) => {
                        warn!(rows = rows, "Accumulated records flushed to {}", path.display());
                        files.add("fallback", path);
                    }
                    Err(e) => error!("Fallback flush failed: {}", e),
                }
            }
            report::output_run(format, &outcome.summary, None, &files, Some(&error.to_string()));
            return Err(CliError::OutputError(error));
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(writer) = &streamed {
        files.add("records", writer.path());
    } else if let Some(path) = &outputs.output {
        write_records(path, outcome.accumulator.batches(), job.id_column)?;
        files.add("records", path);
    }
    if let (Some(sink), Some(path)) = (&sqlite, &outputs.sqlite) {
        let totals = sink.totals();
        info!(inserted = totals.inserted, errors = totals.errors, "Relational sink closed");
        files.add("sqlite", path);
    }

    let delta = write_identifier_outputs(&outcome, snapshot.as_ref(), outputs, job.id_column, &mut files)?;
    report::output_run(format, &outcome.summary, delta.as_ref(), &files, None);
    Ok(())
}

fn write_identifier_outputs(
    outcome: &HarvestOutcome,
    snapshot: Option<&Snapshot>,
    outputs: &OutputArgs,
    id_column: &str,
    files: &mut WrittenFiles,
) -> Result<Option<Delta>, CliError> {
    let ids = outcome.accumulator.ids();
    if let Some(path) = &outputs.ids_output {
        write_identifiers(path, ids.iter(), id_column)?;
        files.add("ids", path);
    }

    let Some(snapshot) = snapshot else {
        return Ok(None);
    };
    let delta = reconcile(ids, snapshot);
    info!(
        new = delta.new_only.len(),
        snapshot_only = delta.snapshot_only.len(),
        common = delta.common.len(),
        "Reconciled against snapshot"
    );

    if let Some(path) = &outputs.delta_output {
        write_delta(path, &delta)?;
        files.add("delta", path);
    }
    if let Some(path) = &outputs.new_ids_output {
        write_identifiers(path, &delta.new_only, id_column)?;
        files.add("new_ids", path);
    }
    Ok(Some(delta))
}
