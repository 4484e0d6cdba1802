//! Row-by-row bulk insertion into an existing table.
//!
//! Each row runs inside its own savepoint so a rejected row leaves no partial
//! effect behind. What happens after a rejection is governed by
//! [`RowErrorPolicy`].

use std::fmt;

use clap::ValueEnum;
use log::{debug, error, warn};
use serde::Serialize;

use crate::{
    data::{RawRow, Value, format_date, normalize_missing},
    error::StorageError,
    inference::SqlType,
    schema::{ColumnDefinition, TableDefinition},
    storage::Storage,
};

const ROW_SAVEPOINT: &str = "sheet_ingest_row";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[value(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum RowErrorPolicy {
    /// Stop loading the table at the first rejected row.
    #[default]
    FailFast,
    /// Record the rejected row and keep going.
    SkipRow,
}

impl fmt::Display for RowErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowErrorPolicy::FailFast => f.write_str("fail-fast"),
            RowErrorPolicy::SkipRow => f.write_str("skip-row"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFailure {
    /// 1-based position of the row within the sheet.
    pub row_number: usize,
    pub values: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadResult {
    pub rows_inserted: usize,
    pub failures: Vec<RowFailure>,
    /// Set when the policy stopped the load before the input was exhausted.
    pub aborted: bool,
}

impl LoadResult {
    pub fn failed_row_count(&self) -> usize {
        self.failures.len()
    }

    pub fn first_failure(&self) -> Option<&RowFailure> {
        self.failures.first()
    }
}

/// Inserts `rows` into the table described by `definition`.
///
/// Must run inside a transaction opened by the caller. A statement-level
/// failure is recorded against its row; a connection failure is returned
/// as-is because nothing further can be written.
pub fn load<S, I>(
    storage: &mut S,
    definition: &TableDefinition,
    rows: I,
    policy: RowErrorPolicy,
) -> Result<LoadResult, StorageError>
where
    S: Storage + ?Sized,
    I: IntoIterator<Item = RawRow>,
{
    let statement = definition.insert_statement(|idx| storage.placeholder(idx));
    debug!("Insert statement for '{}': {statement}", definition.name);
    let width = definition.columns.len();
    let mut result = LoadResult::default();

    for (idx, row) in rows.into_iter().enumerate() {
        let row_number = idx + 1;
        let row = row.into_iter().map(normalize_missing).collect::<RawRow>();

        let outcome = if row.len() != width {
            Err(StorageError::Statement(format!(
                "row has {} value(s), table '{}' has {width} column(s)",
                row.len(),
                definition.name
            )))
        } else {
            let bound = row
                .iter()
                .zip(&definition.columns)
                .map(|(value, column)| bind_value(value, column))
                .collect::<RawRow>();
            insert_row(storage, &statement, &bound)
        };

        match outcome {
            Ok(()) => result.rows_inserted += 1,
            Err(err) if err.is_connection() => return Err(err),
            Err(err) => {
                let failure = RowFailure {
                    row_number,
                    values: row.iter().map(render_cell).collect(),
                    reason: err.to_string(),
                };
                match policy {
                    RowErrorPolicy::FailFast => {
                        error!(
                            "Row {row_number} rejected by '{}', stopping load: {} ({:?})",
                            definition.name, failure.reason, failure.values
                        );
                        result.failures.push(failure);
                        result.aborted = true;
                        break;
                    }
                    RowErrorPolicy::SkipRow => {
                        warn!(
                            "Row {row_number} rejected by '{}', skipping: {} ({:?})",
                            definition.name, failure.reason, failure.values
                        );
                        result.failures.push(failure);
                    }
                }
            }
        }
    }

    Ok(result)
}

fn insert_row<S>(storage: &mut S, statement: &str, row: &RawRow) -> Result<(), StorageError>
where
    S: Storage + ?Sized,
{
    storage.savepoint(ROW_SAVEPOINT)?;
    match storage.execute(statement, row) {
        Ok(_) => storage.release_savepoint(ROW_SAVEPOINT),
        Err(err) => {
            storage.rollback_to_savepoint(ROW_SAVEPOINT)?;
            storage.release_savepoint(ROW_SAVEPOINT)?;
            Err(err)
        }
    }
}

/// DATE columns store the calendar date only.
fn bind_value(value: &Option<Value>, column: &ColumnDefinition) -> Option<Value> {
    match (value, &column.sql_type) {
        (Some(Value::Timestamp(ts)), SqlType::Date) => Some(Value::Text(format_date(&ts.date()))),
        _ => value.clone(),
    }
}

fn render_cell(value: &Option<Value>) -> String {
    value
        .as_ref()
        .map(|v| v.as_display())
        .unwrap_or_else(|| "NULL".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::parse_timestamp,
        identifier::IdentifierPolicy,
        inference::LogicalKind,
        overrides::TypeOverrides,
        schema::RawColumn,
        sqlite::SqliteStorage,
    };

    fn definition() -> TableDefinition {
        let columns = vec![
            RawColumn::new("id", LogicalKind::Integer, vec![Some(Value::Integer(1))]),
            RawColumn::new("label", LogicalKind::Text, vec![Some(Value::Text("x".into()))]),
        ];
        TableDefinition::build(
            "items",
            &columns,
            &TypeOverrides::new(),
            &IdentifierPolicy::standard(),
        )
    }

    fn prepared_storage() -> SqliteStorage {
        let mut storage = SqliteStorage::open_in_memory().expect("open sqlite");
        storage
            .execute("CREATE TABLE items (id INTEGER NOT NULL, label TEXT NOT NULL)", &[])
            .expect("create");
        storage
    }

    fn row(id: i64, label: Option<&str>) -> RawRow {
        vec![
            Some(Value::Integer(id)),
            label.map(|l| Value::Text(l.to_string())),
        ]
    }

    fn count(storage: &SqliteStorage) -> usize {
        storage.query_rows("SELECT * FROM items", 100).unwrap().rows.len()
    }

    #[test]
    fn fail_fast_stops_at_first_rejected_row() {
        let mut storage = prepared_storage();
        storage.begin().unwrap();
        let rows = vec![row(1, Some("a")), row(2, None), row(3, Some("c"))];
        let result = load(&mut storage, &definition(), rows, RowErrorPolicy::FailFast).unwrap();
        storage.commit().unwrap();

        assert!(result.aborted);
        assert_eq!(result.rows_inserted, 1);
        assert_eq!(result.failed_row_count(), 1);
        let failure = result.first_failure().unwrap();
        assert_eq!(failure.row_number, 2);
        assert_eq!(failure.values, vec!["2".to_string(), "NULL".to_string()]);
        assert!(failure.reason.contains("NOT NULL"));
        assert_eq!(count(&storage), 1);
    }

    #[test]
    fn skip_row_keeps_loading_after_rejections() {
        let mut storage = prepared_storage();
        storage.begin().unwrap();
        let rows = vec![row(1, None), row(2, Some("b")), row(3, None), row(4, Some("d"))];
        let result = load(&mut storage, &definition(), rows, RowErrorPolicy::SkipRow).unwrap();
        storage.commit().unwrap();

        assert!(!result.aborted);
        assert_eq!(result.rows_inserted, 2);
        assert_eq!(result.failed_row_count(), 2);
        assert_eq!(count(&storage), 2);
    }

    #[test]
    fn nan_floats_are_bound_as_null() {
        let mut storage = SqliteStorage::open_in_memory().expect("open sqlite");
        storage
            .execute("CREATE TABLE items (id INTEGER NULL, label TEXT NULL)", &[])
            .unwrap();
        storage.begin().unwrap();
        let rows = vec![vec![Some(Value::Float(f64::NAN)), None]];
        let result = load(&mut storage, &definition(), rows, RowErrorPolicy::FailFast).unwrap();
        storage.commit().unwrap();

        assert_eq!(result.rows_inserted, 1);
        let stored = storage.query_rows("SELECT * FROM items", 10).unwrap();
        assert_eq!(stored.rows, vec![vec![None, None]]);
    }

    #[test]
    fn text_that_looks_like_nan_is_kept() {
        let mut storage = prepared_storage();
        storage.begin().unwrap();
        let rows = vec![row(1, Some("Nat")), row(2, Some("Nan")), row(3, Some("NAN"))];
        let result = load(&mut storage, &definition(), rows, RowErrorPolicy::FailFast).unwrap();
        storage.commit().unwrap();

        assert_eq!(result.rows_inserted, 3);
        let labels = storage
            .query_rows("SELECT label FROM items ORDER BY rowid", 10)
            .unwrap()
            .rows;
        assert_eq!(
            labels,
            vec![
                vec![Some(Value::Text("Nat".into()))],
                vec![Some(Value::Text("Nan".into()))],
                vec![Some(Value::Text("NAN".into()))],
            ]
        );
    }

    #[test]
    fn date_columns_store_the_calendar_date() {
        let columns = vec![
            RawColumn::new("id", LogicalKind::Integer, vec![Some(Value::Integer(1))]),
            RawColumn::new(
                "placed",
                LogicalKind::Timestamp,
                vec![Some(Value::Timestamp(parse_timestamp("2024-03-05").unwrap()))],
            ),
        ];
        let definition = TableDefinition::build(
            "placements",
            &columns,
            &TypeOverrides::new(),
            &IdentifierPolicy::standard(),
        );
        assert_eq!(definition.columns[1].sql_type, SqlType::Date);

        let mut storage = SqliteStorage::open_in_memory().expect("open sqlite");
        storage.execute(&definition.create_statement(), &[]).unwrap();
        storage.begin().unwrap();
        let rows = vec![vec![
            Some(Value::Integer(1)),
            Some(Value::Timestamp(parse_timestamp("2024-03-05").unwrap())),
        ]];
        load(&mut storage, &definition, rows, RowErrorPolicy::FailFast).unwrap();
        storage.commit().unwrap();

        let stored = storage.query_rows("SELECT placed FROM placements", 10).unwrap();
        assert_eq!(stored.rows, vec![vec![Some(Value::Text("2024-03-05".into()))]]);
    }

    #[test]
    fn width_mismatch_is_a_row_failure() {
        let mut storage = prepared_storage();
        storage.begin().unwrap();
        let rows = vec![vec![Some(Value::Integer(1))]];
        let result = load(&mut storage, &definition(), rows, RowErrorPolicy::FailFast).unwrap();
        storage.commit().unwrap();

        assert_eq!(result.rows_inserted, 0);
        assert!(result.failures[0].reason.contains("1 value(s)"));
    }

    #[test]
    fn lazy_row_sources_are_consumed_in_order() {
        let mut storage = prepared_storage();
        storage.begin().unwrap();
        let rows = (1..=5).map(|i| row(i, Some("r")));
        let result = load(&mut storage, &definition(), rows, RowErrorPolicy::FailFast).unwrap();
        storage.commit().unwrap();

        assert_eq!(result.rows_inserted, 5);
        let ids = storage
            .query_rows("SELECT id FROM items ORDER BY rowid", 10)
            .unwrap()
            .rows
            .into_iter()
            .map(|r| r[0].clone())
            .collect::<Vec<_>>();
        assert_eq!(ids, (1..=5).map(|i| Some(Value::Integer(i))).collect::<Vec<_>>());
    }
}
