//! `compare` command: reconcile an identifier file against a snapshot

use super::report::{self, WrittenFiles};
use super::run::SnapshotArgs;
use super::{CliError, OutputFormat};
use crate::output::csv::{write_delta, write_identifiers, DEFAULT_ID_COLUMN};
use crate::output::sqlite::{insert_identifiers, DEFAULT_DISCOVERY_TABLE};
use crate::output::OutputError;
use crate::reconcile::reconcile;
use crate::snapshot::{IdColumn, Snapshot};
use clap::Args;
use rusqlite::Connection;
use std::path::PathBuf;
use tracing::info;

/// Arguments for the compare command
#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    /// Freshly collected identifiers (.csv, .txt or .json)
    #[arg(long)]
    pub fresh: PathBuf,

    /// Identifier column of the fresh file: header name, JSON key or 0-based index
    #[arg(long, default_value = "0")]
    pub fresh_column: String,

    /// Snapshot to reconcile against
    #[command(flatten)]
    pub snapshot: SnapshotArgs,

    /// Delta CSV (`Identifier,Status`)
    #[arg(long)]
    pub delta_output: Option<PathBuf>,

    /// Identifiers absent from the snapshot, one per row
    #[arg(long)]
    pub new_output: Option<PathBuf>,

    /// Header of the new-identifier list
    #[arg(long, default_value = DEFAULT_ID_COLUMN)]
    pub id_header: String,

    /// SQLite database receiving the new identifiers
    #[arg(long)]
    pub insert_db: Option<PathBuf>,

    /// Table for --insert-db
    #[arg(long, default_value = DEFAULT_DISCOVERY_TABLE)]
    pub insert_table: String,
}

impl CompareArgs {
    /// Execute the compare command
    pub fn execute(&self, format: OutputFormat) -> Result<(), CliError> {
        let snapshot_path = self
            .snapshot
            .snapshot
            .as_ref()
            .ok_or_else(|| CliError::InvalidArgument("compare needs --snapshot".to_string()))?;
        if !self.fresh.exists() {
            return Err(CliError::InvalidArgument(format!(
                "fresh identifier file not found: {}",
                self.fresh.display()
            )));
        }

        let fresh_options = self
            .snapshot
            .options()
            .with_column(IdColumn::parse(&self.fresh_column));
        let fresh = Snapshot::load(&self.fresh, &fresh_options)?.into_ids();
        let snapshot = Snapshot::load(snapshot_path, &self.snapshot.options())?;

        let delta = reconcile(&fresh, &snapshot);
        info!(
            fresh = fresh.len(),
            snapshot = snapshot.len(),
            new = delta.new_only.len(),
            "Reconciled identifier sets"
        );

        let mut files = WrittenFiles::default();
        if let Some(path) = &self.delta_output {
            write_delta(path, &delta)?;
            files.add("delta", path);
        }
        if let Some(path) = &self.new_output {
            write_identifiers(path, &delta.new_only, &self.id_header)?;
            files.add("new_ids", path);
        }
        if let Some(path) = &self.insert_db {
            let mut conn = Connection::open(path)
                .map_err(|e| OutputError::Connection(format!("{}: {e}", path.display())))?;
            let report = insert_identifiers(&mut conn, &self.insert_table, &delta.new_only)?;
            info!(inserted = report.inserted, errors = report.errors, "New identifiers stored");
            files.add("sqlite", path);
        }

        report::output_compare(format, fresh.len(), snapshot.len(), &delta, &files);
        Ok(())
    }
}
