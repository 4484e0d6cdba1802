//! Batch orchestration: sources → sheets → create-if-absent → load.
//!
//! The orchestrator is best-effort at the table level and fail-fast (by
//! default) at the row level. Every sheet of every source ends up with an
//! entry in the [`IngestReport`]; only a lost connection ends a run early.

use std::collections::HashMap;

use log::{error, info, warn};
use serde::Serialize;

use crate::{
    error::{IngestError, StorageError},
    loader::{self, LoadResult, RowErrorPolicy, RowFailure},
    overrides::TypeOverrides,
    reader::{Sheet, SheetSource},
    schema::TableDefinition,
    storage::Storage,
};

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub overrides: TypeOverrides,
    pub row_error_policy: RowErrorPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestionOutcome {
    /// The table exists (freshly created when `created`) and the load ran to
    /// the end of the input.
    Loaded {
        created: bool,
        row_count: usize,
        failed_row_count: usize,
    },
    SkippedEmpty,
    CreateFailed { reason: String },
    LoadAborted {
        reason: String,
        rows_committed: usize,
    },
}

impl IngestionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            IngestionOutcome::Loaded {
                failed_row_count: 0,
                ..
            } | IngestionOutcome::SkippedEmpty
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            IngestionOutcome::Loaded { created: true, .. } => "created+loaded",
            IngestionOutcome::Loaded { created: false, .. } => "appended",
            IngestionOutcome::SkippedEmpty => "skipped-empty",
            IngestionOutcome::CreateFailed { .. } => "create-failed",
            IngestionOutcome::LoadAborted { .. } => "load-aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReport {
    pub sheet: String,
    pub table: String,
    pub outcome: IngestionOutcome,
    /// Earlier sheet of this run that mapped to the same table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collided_with: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded_columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub row_failures: Vec<RowFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_error: Option<String>,
    pub tables: Vec<TableReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub sources: Vec<SourceReport>,
}

impl IngestReport {
    pub fn tables(&self) -> impl Iterator<Item = &TableReport> {
        self.sources.iter().flat_map(|source| source.tables.iter())
    }

    pub fn table(&self, sheet: &str) -> Option<&TableReport> {
        self.tables().find(|report| report.sheet == sheet)
    }

    pub fn rows_loaded(&self) -> usize {
        self.tables()
            .map(|report| match &report.outcome {
                IngestionOutcome::Loaded { row_count, .. } => *row_count,
                IngestionOutcome::LoadAborted { rows_committed, .. } => *rows_committed,
                _ => 0,
            })
            .sum()
    }

    /// True when any source, table or row needs attention.
    pub fn has_problems(&self) -> bool {
        self.sources.iter().any(|source| source.read_error.is_some())
            || self.tables().any(|report| !report.outcome.is_success())
    }
}

/// Drives one ingestion run over a single storage connection.
pub struct Ingestor<'a, S: Storage + ?Sized> {
    storage: &'a mut S,
    options: &'a IngestOptions,
    /// Table identifier → first sheet that claimed it this run.
    claimed: HashMap<String, String>,
}

struct ConnectionLost {
    table: String,
    message: String,
}

enum TableStep {
    Done(IngestionOutcome),
    Loaded { created: bool, result: LoadResult },
}

impl<'a, S: Storage + ?Sized> Ingestor<'a, S> {
    pub fn new(storage: &'a mut S, options: &'a IngestOptions) -> Self {
        Self {
            storage,
            options,
            claimed: HashMap::new(),
        }
    }

    pub fn ingest<I, T>(&mut self, sources: I) -> Result<IngestReport, IngestError>
    where
        I: IntoIterator<Item = T>,
        T: SheetSource,
    {
        let mut report = IngestReport::default();
        for mut source in sources {
            let source_name = source.name().to_string();
            info!("Processing source '{source_name}'");
            let sheets = match source.read_sheets() {
                Ok(sheets) => sheets,
                Err(err) => {
                    error!("Skipping source '{source_name}': {err}");
                    report.sources.push(SourceReport {
                        source: source_name,
                        read_error: Some(err.to_string()),
                        tables: Vec::new(),
                    });
                    continue;
                }
            };
            let mut tables = Vec::with_capacity(sheets.len());
            for sheet in sheets {
                match self.ingest_sheet(&source_name, sheet) {
                    Ok(table) => tables.push(table),
                    Err(lost) => {
                        report.sources.push(SourceReport {
                            source: source_name,
                            read_error: None,
                            tables,
                        });
                        error!(
                            "Connection lost on table '{}' after {} row(s) committed",
                            lost.table,
                            report.rows_loaded()
                        );
                        return Err(IngestError::Connection {
                            table: lost.table,
                            message: lost.message,
                            report: Box::new(report),
                        });
                    }
                }
            }
            report.sources.push(SourceReport {
                source: source_name,
                read_error: None,
                tables,
            });
        }
        info!(
            "Ingestion finished: {} source(s), {} row(s) committed",
            report.sources.len(),
            report.rows_loaded()
        );
        Ok(report)
    }

    fn ingest_sheet(&mut self, source: &str, sheet: Sheet) -> Result<TableReport, ConnectionLost> {
        let policy = self.storage.identifier_policy().clone();
        let table = policy.sanitize(&sheet.name);
        let mut report = TableReport {
            sheet: sheet.name.clone(),
            table: table.clone(),
            outcome: IngestionOutcome::SkippedEmpty,
            collided_with: None,
            degraded_columns: Vec::new(),
            row_failures: Vec::new(),
        };

        if sheet.is_empty() {
            warn!("Sheet '{}' in '{source}' is empty; no table created", sheet.name);
            return Ok(report);
        }
        if table.is_empty() {
            let reason = format!("sheet name '{}' has no usable identifier characters", sheet.name);
            error!("{reason}");
            report.outcome = IngestionOutcome::CreateFailed { reason };
            return Ok(report);
        }

        let label = format!("{source}/{}", sheet.name);
        if let Some(first) = self.claimed.get(&table) {
            warn!("Sheet '{label}' maps to table '{table}' already used by '{first}'; rows will be appended");
            report.collided_with = Some(first.clone());
        } else {
            self.claimed.insert(table.clone(), label);
        }

        let definition =
            TableDefinition::build(&table, &sheet.columns, &self.options.overrides, &policy);
        report.degraded_columns = definition
            .degraded_columns()
            .into_iter()
            .map(str::to_string)
            .collect();
        info!("Processing sheet '{}' into table '{table}'", sheet.name);

        let step = self
            .create_and_load(&definition, sheet.rows)
            .map_err(|err| ConnectionLost {
                table: table.clone(),
                message: err.to_string(),
            })?;

        report.outcome = match step {
            TableStep::Done(outcome) => outcome,
            TableStep::Loaded { created, result } => {
                let outcome = if result.aborted {
                    let reason = result
                        .first_failure()
                        .map(|failure| format!("row {}: {}", failure.row_number, failure.reason))
                        .unwrap_or_default();
                    IngestionOutcome::LoadAborted {
                        reason,
                        rows_committed: result.rows_inserted,
                    }
                } else {
                    IngestionOutcome::Loaded {
                        created,
                        row_count: result.rows_inserted,
                        failed_row_count: result.failed_row_count(),
                    }
                };
                report.row_failures = result.failures;
                outcome
            }
        };
        log_outcome(&report);
        Ok(report)
    }

    /// Runs create-if-absent and the load inside one table transaction.
    /// Only connection failures are returned as errors.
    fn create_and_load(
        &mut self,
        definition: &TableDefinition,
        rows: Vec<crate::data::RawRow>,
    ) -> Result<TableStep, StorageError> {
        let empty_columns = definition.empty_columns();
        if !empty_columns.is_empty() {
            return Ok(TableStep::Done(IngestionOutcome::CreateFailed {
                reason: format!(
                    "column name(s) {empty_columns:?} have no usable identifier characters"
                ),
            }));
        }

        if let Err(err) = self.storage.begin() {
            return table_failure(err, |reason| IngestionOutcome::CreateFailed { reason });
        }

        let created = match self.ensure_table(definition) {
            Ok(created) => created,
            Err(err) => {
                self.rollback_quietly(&definition.name)?;
                return table_failure(err, |reason| IngestionOutcome::CreateFailed { reason });
            }
        };

        let result = match loader::load(
            &mut *self.storage,
            definition,
            rows,
            self.options.row_error_policy,
        ) {
            Ok(result) => result,
            Err(err) => {
                self.rollback_quietly(&definition.name)?;
                return Err(err);
            }
        };

        if let Err(err) = self.storage.commit() {
            self.rollback_quietly(&definition.name)?;
            return table_failure(err, |reason| IngestionOutcome::LoadAborted {
                reason: format!("commit failed: {reason}"),
                rows_committed: 0,
            });
        }
        Ok(TableStep::Loaded { created, result })
    }

    fn ensure_table(&mut self, definition: &TableDefinition) -> Result<bool, StorageError> {
        if self.storage.table_exists(&definition.name)? {
            info!("Table '{}' already exists; appending", definition.name);
            return Ok(false);
        }
        let statement = definition.create_statement();
        log::debug!("{statement}");
        self.storage.execute(&statement, &[])?;
        info!(
            "Created table '{}' with {} column(s)",
            definition.name,
            definition.columns.len()
        );
        Ok(true)
    }

    fn rollback_quietly(&mut self, table: &str) -> Result<(), StorageError> {
        match self.storage.rollback() {
            Ok(()) => Ok(()),
            Err(err) if err.is_connection() => Err(err),
            Err(err) => {
                warn!("Rollback for table '{table}' failed: {err}");
                Ok(())
            }
        }
    }
}

fn table_failure<F>(err: StorageError, outcome: F) -> Result<TableStep, StorageError>
where
    F: FnOnce(String) -> IngestionOutcome,
{
    if err.is_connection() {
        Err(err)
    } else {
        Ok(TableStep::Done(outcome(err.to_string())))
    }
}

fn log_outcome(report: &TableReport) {
    match &report.outcome {
        IngestionOutcome::Loaded {
            created,
            row_count,
            failed_row_count,
        } => {
            let verb = if *created { "Created and loaded" } else { "Appended to" };
            if *failed_row_count > 0 {
                warn!(
                    "{verb} '{}': {row_count} row(s) inserted, {failed_row_count} row(s) rejected",
                    report.table
                );
            } else {
                info!("{verb} '{}': {row_count} row(s) inserted", report.table);
            }
        }
        IngestionOutcome::SkippedEmpty => {}
        IngestionOutcome::CreateFailed { reason } => {
            error!("Could not create table '{}': {reason}", report.table);
        }
        IngestionOutcome::LoadAborted {
            reason,
            rows_committed,
        } => {
            error!(
                "Load into '{}' stopped after {rows_committed} row(s): {reason}",
                report.table
            );
        }
    }
}

/// Convenience wrapper: one run over `sources` with `options`.
pub fn ingest<S, I, T>(
    storage: &mut S,
    sources: I,
    options: &IngestOptions,
) -> Result<IngestReport, IngestError>
where
    S: Storage + ?Sized,
    I: IntoIterator<Item = T>,
    T: SheetSource,
{
    Ingestor::new(storage, options).ingest(sources)
}
