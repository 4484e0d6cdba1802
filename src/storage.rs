//! The relational store as seen by the engine.
//!
//! The engine only reaches storage through this trait. Identifiers
//! interpolated into statement text are sanitized by the caller; values always
//! travel as positional parameters.

use serde::Serialize;

use crate::{data::Value, error::StorageResult, identifier::IdentifierPolicy};

/// Rows returned by a bounded read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<Value>>>,
}

impl QueryRows {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub trait Storage {
    /// Naming rules (reserved words) for this back end.
    fn identifier_policy(&self) -> &IdentifierPolicy;

    /// Marker for the 1-based parameter `position` in statement text.
    fn placeholder(&self, position: usize) -> String {
        format!("?{position}")
    }

    fn table_exists(&self, name: &str) -> StorageResult<bool>;

    fn list_tables(&self) -> StorageResult<Vec<String>>;

    /// Runs one statement, returning the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Option<Value>]) -> StorageResult<usize>;

    fn query_rows(&self, sql: &str, limit: usize) -> StorageResult<QueryRows>;

    fn begin(&mut self) -> StorageResult<()>;

    fn commit(&mut self) -> StorageResult<()>;

    fn rollback(&mut self) -> StorageResult<()>;

    fn savepoint(&mut self, name: &str) -> StorageResult<()>;

    fn release_savepoint(&mut self, name: &str) -> StorageResult<()>;

    fn rollback_to_savepoint(&mut self, name: &str) -> StorageResult<()>;
}
