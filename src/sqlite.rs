use std::{path::Path, time::Duration};

use log::debug;
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, ToSql, params,
    types::{ToSqlOutput, ValueRef},
};

use crate::{
    data::{Value, format_timestamp},
    error::{StorageError, StorageResult},
    identifier::IdentifierPolicy,
    storage::{QueryRows, Storage},
};

/// Keywords SQLite refuses as bare column or table names, beyond the
/// standard set.
const SQLITE_RESERVED_WORDS: &[&str] = &[
    "add", "all", "and", "as", "between", "case", "check", "collate", "default", "distinct",
    "else", "end", "except", "exists", "foreign", "having", "in", "intersect", "into", "is",
    "isnull", "join", "limit", "not", "notnull", "null", "on", "or", "primary", "references",
    "set", "then", "union", "unique", "using", "values", "when", "where",
];

pub struct SqliteStorage {
    conn: Connection,
    policy: IdentifierPolicy,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path).map_err(|err| {
            StorageError::Connection(format!("opening database {}: {err}", path.display()))
        })?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        // Touch the schema so a file that is not a database fails here.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(map_error)?;
        Ok(Self {
            conn,
            policy: sqlite_identifier_policy(),
        })
    }

    fn batch(&self, sql: &str) -> StorageResult<()> {
        debug!("sqlite: {sql}");
        self.conn.execute_batch(sql).map_err(map_error)
    }
}

pub fn sqlite_identifier_policy() -> IdentifierPolicy {
    IdentifierPolicy::standard().with_reserved_words(SQLITE_RESERVED_WORDS.iter().copied())
}

impl Storage for SqliteStorage {
    fn identifier_policy(&self) -> &IdentifierPolicy {
        &self.policy
    }

    fn table_exists(&self, name: &str) -> StorageResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' \
                 AND name = ?1 COLLATE NOCASE",
                params![name],
                |_| Ok(()),
            )
            .optional()
            .map_err(map_error)?;
        Ok(found.is_some())
    }

    fn list_tables(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' \
                 AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .map_err(map_error)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(map_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_error)?;
        Ok(names)
    }

    fn execute(&mut self, sql: &str, params: &[Option<Value>]) -> StorageResult<usize> {
        self.conn
            .execute(sql, rusqlite::params_from_iter(params.iter()))
            .map_err(map_error)
    }

    fn query_rows(&self, sql: &str, limit: usize) -> StorageResult<QueryRows> {
        let mut stmt = self.conn.prepare(sql).map_err(map_error)?;
        let columns = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let column_count = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.query([]).map_err(map_error)?;
        while rows.len() < limit {
            let Some(row) = cursor.next().map_err(map_error)? else {
                break;
            };
            let mut values = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                let value = row.get_ref(idx).map_err(map_error)?;
                values.push(value_from_ref(value));
            }
            rows.push(values);
        }
        Ok(QueryRows { columns, rows })
    }

    fn begin(&mut self) -> StorageResult<()> {
        self.batch("BEGIN")
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.batch("COMMIT")
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.batch("ROLLBACK")
    }

    fn savepoint(&mut self, name: &str) -> StorageResult<()> {
        self.batch(&format!("SAVEPOINT {name}"))
    }

    fn release_savepoint(&mut self, name: &str) -> StorageResult<()> {
        self.batch(&format!("RELEASE SAVEPOINT {name}"))
    }

    fn rollback_to_savepoint(&mut self, name: &str) -> StorageResult<()> {
        self.batch(&format!("ROLLBACK TO SAVEPOINT {name}"))
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Float(f) => ToSqlOutput::from(*f),
            Value::Boolean(b) => ToSqlOutput::from(*b),
            Value::Timestamp(ts) => ToSqlOutput::from(format_timestamp(ts)),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Option<Value> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(Value::Integer(i)),
        ValueRef::Real(f) => Some(Value::Float(f)),
        ValueRef::Text(bytes) => Some(Value::Text(String::from_utf8_lossy(bytes).into_owned())),
        ValueRef::Blob(bytes) => Some(Value::Text(format!("<{} byte blob>", bytes.len()))),
    }
}

fn map_error(err: rusqlite::Error) -> StorageError {
    match err.sqlite_error_code() {
        Some(ErrorCode::CannotOpen | ErrorCode::NotADatabase) => {
            StorageError::Connection(err.to_string())
        }
        _ => StorageError::Statement(err.to_string()),
    }
}
