//! Error taxonomy for the ingestion engine.
//!
//! Storage and read failures are typed so the orchestrator can decide at which
//! unit (row, table, source, run) a failure stops. Only
//! [`IngestError::Connection`] escapes a run; everything else is converted into
//! a recorded outcome.

use thiserror::Error;

use crate::ingest::IngestReport;

/// Failure reported by a [`crate::storage::Storage`] back end.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store cannot be reached at all; the run cannot continue.
    #[error("storage connection failed: {0}")]
    Connection(String),
    /// A single statement failed (constraint, type mismatch, syntax).
    #[error("statement failed: {0}")]
    Statement(String),
}

impl StorageError {
    pub fn is_connection(&self) -> bool {
        matches!(self, StorageError::Connection(_))
    }
}

/// An input collaborator could not produce sheets for a source.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed input in {path}: {message}")]
    Malformed { path: String, message: String },
    #[error("no readable sheets found in {0}")]
    NoSheets(String),
}

/// Errors that terminate an ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    /// `report` holds every table finished before the connection was lost.
    #[error("connection lost while processing table '{table}': {message}")]
    Connection {
        table: String,
        message: String,
        report: Box<IngestReport>,
    },
}

impl IngestError {
    pub fn partial_report(&self) -> &IngestReport {
        match self {
            IngestError::Connection { report, .. } => report,
        }
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
