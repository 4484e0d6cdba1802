#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use sheet_ingest::data::Value;
use sheet_ingest::sqlite::SqliteStorage;
use sheet_ingest::storage::Storage;
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn db_path(&self) -> PathBuf {
        self.temp_dir.path().join("ingest.db")
    }

    pub fn open_db(&self) -> SqliteStorage {
        SqliteStorage::open(&self.db_path()).expect("open workspace db")
    }
}

/// Every row of `table`, in insertion order.
pub fn table_rows(storage: &SqliteStorage, table: &str) -> Vec<Vec<Option<Value>>> {
    storage
        .query_rows(&format!("SELECT * FROM {table} ORDER BY rowid"), usize::MAX)
        .expect("query table")
        .rows
}

/// The `CREATE TABLE` statement SQLite recorded for `table`.
pub fn table_sql(storage: &SqliteStorage, table: &str) -> String {
    let rows = storage
        .query_rows(
            &format!("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = '{table}'"),
            1,
        )
        .expect("query schema")
        .rows;
    match rows.first().and_then(|row| row[0].clone()) {
        Some(Value::Text(sql)) => sql,
        other => panic!("no schema for {table}: {other:?}"),
    }
}
