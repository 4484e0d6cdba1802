//! Table definitions built from raw input columns.
//!
//! A [`TableDefinition`] is constructed once per sheet per run and never
//! mutated afterwards. It pairs each sanitized column identifier with the type
//! chosen by [`crate::inference`] and a nullability flag, and renders the
//! idempotent `CREATE TABLE IF NOT EXISTS` directive plus the positional
//! `INSERT` statement used by the loader.

use std::collections::BTreeMap;

use itertools::Itertools;
use log::{debug, warn};
use serde::Serialize;

use crate::{
    data::{Value, is_absent},
    identifier::IdentifierPolicy,
    inference::{self, LogicalKind, SqlType, TypeOrigin},
    overrides::TypeOverrides,
};

/// A column as handed over by the input collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub name: String,
    pub kind: LogicalKind,
    pub values: Vec<Option<Value>>,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, kind: LogicalKind, values: Vec<Option<Value>>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
        }
    }

    pub fn has_absent_values(&self) -> bool {
        self.values.iter().any(is_absent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub original_name: String,
    #[serde(serialize_with = "serialize_display")]
    pub sql_type: SqlType,
    pub nullable: bool,
    #[serde(flatten)]
    pub origin: TypeOrigin,
}

impl ColumnDefinition {
    pub fn declaration(&self) -> String {
        let nullability = if self.nullable { "NULL" } else { "NOT NULL" };
        format!("{} {} {}", self.name, self.sql_type, nullability)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    /// Builds the definition for one sheet, preserving column order.
    pub fn build(
        table: &str,
        columns: &[RawColumn],
        overrides: &TypeOverrides,
        policy: &IdentifierPolicy,
    ) -> Self {
        let columns = columns
            .iter()
            .map(|column| {
                let name = policy.sanitize(&column.name);
                let type_override = overrides.get(table, &name);
                let decision = inference::decide_for_column(
                    &format!("{table}.{name}"),
                    column.kind,
                    &column.values,
                    type_override,
                );
                ColumnDefinition {
                    name,
                    original_name: column.name.clone(),
                    sql_type: decision.sql_type,
                    nullable: column.has_absent_values(),
                    origin: decision.origin,
                }
            })
            .collect::<Vec<_>>();

        let definition = Self {
            name: table.to_string(),
            columns,
        };
        definition.log_naming_problems();
        definition
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Identifiers shared by more than one input column.
    pub fn duplicate_columns(&self) -> Vec<String> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for column in &self.columns {
            *counts.entry(column.name.as_str()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Original names that sanitized to the empty string.
    pub fn empty_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|column| column.name.is_empty())
            .map(|column| column.original_name.clone())
            .collect()
    }

    pub fn degraded_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|column| matches!(column.origin, TypeOrigin::Degraded { .. }))
            .map(|column| column.name.as_str())
            .collect()
    }

    pub fn create_statement(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(ColumnDefinition::declaration)
            .join(", ");
        format!("CREATE TABLE IF NOT EXISTS {} ({columns})", self.name)
    }

    /// Positional insert; `placeholder` renders the back end's marker for a
    /// 1-based parameter position.
    pub fn insert_statement<F>(&self, placeholder: F) -> String
    where
        F: Fn(usize) -> String,
    {
        let columns = self.column_names().join(", ");
        let params = (1..=self.columns.len()).map(placeholder).join(", ");
        format!("INSERT INTO {} ({columns}) VALUES ({params})", self.name)
    }

    fn log_naming_problems(&self) {
        let duplicates = self.duplicate_columns();
        if !duplicates.is_empty() {
            warn!(
                "Table '{}' has columns that sanitize to the same identifier: {}",
                self.name,
                duplicates.join(", ")
            );
        }
        let empty = self.empty_columns();
        if !empty.is_empty() {
            warn!(
                "Table '{}' has columns whose names sanitize to nothing: {:?}",
                self.name, empty
            );
        }
        debug!("Table '{}' columns: {:?}", self.name, self.column_names());
    }
}

fn serialize_display<S>(value: &SqlType, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(value)
}
