use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{loader::RowErrorPolicy, preview::DEFAULT_PREVIEW_ROWS};

pub const DB_ENV_VAR: &str = "SHEET_INGEST_DB";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Load spreadsheet-style sheets into relational tables",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Infer a schema for every sheet, create missing tables and load rows
    Ingest(IngestArgs),
    /// Write a type override template covering every column of the inputs
    Overrides(OverridesArgs),
    /// List the tables in the target database
    Tables(TablesArgs),
    /// Show the first rows of an existing table
    Preview(PreviewArgs),
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Input files or directories; each is one source, each file one sheet
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,
    /// SQLite database file to load into
    #[arg(long, env = DB_ENV_VAR)]
    pub db: PathBuf,
    /// YAML file mapping `table.column` to a SQL type or `Auto`
    #[arg(long)]
    pub overrides: Option<PathBuf>,
    /// What to do when a row is rejected by the database
    #[arg(long = "on-row-error", value_enum, default_value_t = RowErrorPolicy::FailFast)]
    pub on_row_error: RowErrorPolicy,
    #[command(flatten)]
    pub input: InputArgs,
    /// Report format printed after the run
    #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
    pub report: ReportFormat,
}

#[derive(Debug, Args)]
pub struct OverridesArgs {
    /// Input files or directories to scan for columns
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,
    /// Destination YAML file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub input: InputArgs,
}

/// Options shared by every command that reads delimited sources.
#[derive(Debug, Args)]
pub struct InputArgs {
    /// Number of rows to sample when inferring types (0 means full scan)
    #[arg(long, default_value_t = 0)]
    pub sample_rows: usize,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct TablesArgs {
    /// SQLite database file to inspect
    #[arg(long, env = DB_ENV_VAR)]
    pub db: PathBuf,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Table to preview
    pub table: String,
    /// SQLite database file to read from
    #[arg(long, env = DB_ENV_VAR)]
    pub db: PathBuf,
    /// Number of rows to display
    #[arg(long, default_value_t = DEFAULT_PREVIEW_ROWS)]
    pub rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Table,
    Json,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
