//! Input side of the engine: sheets and the sources that produce them.
//!
//! A [`SheetSource`] stands for one uploaded workbook. [`DelimitedSource`]
//! treats a single delimited file as a one-sheet workbook and a directory of
//! delimited files as a multi-sheet workbook (one sheet per file, ordered by
//! file name). [`MemorySource`] wraps sheets that were built elsewhere.

use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
};

use encoding_rs::Encoding;
use log::{debug, info};

use crate::{
    data::{RawRow, Value, parse_boolean, parse_timestamp},
    error::ReadError,
    inference::LogicalKind,
    io_utils,
    schema::RawColumn,
};

/// Tokens read as a missing cell, matching what spreadsheet exports emit.
const MISSING_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// One named table of input: columns with their sampled values plus every row.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<RawColumn>,
    pub rows: Vec<RawRow>,
}

impl Sheet {
    /// Builds a sheet from typed rows, deriving each column's logical kind
    /// from the values and sampling the first `sample_rows` rows (0 = all).
    pub fn from_rows(
        name: impl Into<String>,
        headers: &[&str],
        rows: Vec<RawRow>,
        sample_rows: usize,
    ) -> Self {
        let sample_len = if sample_rows == 0 {
            rows.len()
        } else {
            sample_rows.min(rows.len())
        };
        let columns = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| {
                let cells = rows.iter().map(|row| row.get(idx).cloned().flatten());
                let kind = kind_of_values(cells.clone());
                RawColumn::new(*header, kind, cells.take(sample_len).collect())
            })
            .collect();
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub trait SheetSource {
    /// Label used in logs and reports (usually the file name).
    fn name(&self) -> &str;

    fn read_sheets(&mut self) -> Result<Vec<Sheet>, ReadError>;
}

impl<T: SheetSource + ?Sized> SheetSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn read_sheets(&mut self) -> Result<Vec<Sheet>, ReadError> {
        (**self).read_sheets()
    }
}

/// Sheets that are already in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    sheets: Vec<Sheet>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, sheets: Vec<Sheet>) -> Self {
        Self {
            name: name.into(),
            sheets,
        }
    }
}

impl SheetSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_sheets(&mut self) -> Result<Vec<Sheet>, ReadError> {
        Ok(std::mem::take(&mut self.sheets))
    }
}

#[derive(Debug, Clone)]
pub struct DelimitedOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
    /// Rows sampled for type inference; 0 samples every row.
    pub sample_rows: usize,
}

impl Default for DelimitedOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: encoding_rs::UTF_8,
            sample_rows: 0,
        }
    }
}

/// A delimited file, or a directory of delimited files, read as a workbook.
#[derive(Debug, Clone)]
pub struct DelimitedSource {
    path: PathBuf,
    label: String,
    options: DelimitedOptions,
}

impl DelimitedSource {
    pub fn new(path: impl Into<PathBuf>, options: DelimitedOptions) -> Self {
        let path = path.into();
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            path,
            label,
            options,
        }
    }

    fn sheet_paths(&self) -> Result<Vec<PathBuf>, ReadError> {
        if !self.path.is_dir() {
            return Ok(vec![self.path.clone()]);
        }
        let entries = fs::read_dir(&self.path).map_err(|source| ReadError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ReadError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if io_utils::is_delimited_file(&path) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(ReadError::NoSheets(self.path.display().to_string()));
        }
        paths.sort();
        Ok(paths)
    }
}

impl SheetSource for DelimitedSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn read_sheets(&mut self) -> Result<Vec<Sheet>, ReadError> {
        let paths = self.sheet_paths()?;
        let mut sheets = Vec::with_capacity(paths.len());
        for path in paths {
            let sheet = read_delimited_sheet(&path, &self.options)?;
            info!(
                "Read sheet '{}' from {:?}: {} column(s), {} row(s)",
                sheet.name,
                path,
                sheet.columns.len(),
                sheet.rows.len()
            );
            sheets.push(sheet);
        }
        Ok(sheets)
    }
}

/// Reads one delimited file into a sheet named after the file stem.
pub fn read_delimited_sheet(path: &Path, options: &DelimitedOptions) -> Result<Sheet, ReadError> {
    let display = path.display().to_string();
    let malformed = |message: String| ReadError::Malformed {
        path: display.clone(),
        message,
    };

    let file = File::open(path).map_err(|source| ReadError::Io {
        path: display.clone(),
        source,
    })?;
    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
    let mut reader = io_utils::open_csv_reader(BufReader::new(file), delimiter, true);
    let headers = io_utils::reader_headers(&mut reader, options.encoding)
        .map_err(|err| malformed(format!("reading headers: {err:#}")))?;

    let mut cells: Vec<Vec<Option<String>>> = Vec::new();
    let mut record = csv::ByteRecord::new();
    loop {
        let more = reader
            .read_byte_record(&mut record)
            .map_err(|err| malformed(err.to_string()))?;
        if !more {
            break;
        }
        let line = cells.len() + 2;
        let decoded = io_utils::decode_record(&record, options.encoding)
            .map_err(|err| malformed(format!("row {line}: {err:#}")))?;
        cells.push(decoded.into_iter().map(clean_cell).collect());
    }

    let kinds = (0..headers.len())
        .map(|idx| kind_of_cells(cells.iter().map(|row| row[idx].as_deref())))
        .collect::<Vec<_>>();
    debug!("Logical kinds for {display}: {kinds:?}");

    let rows = cells
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&kinds)
                .map(|(cell, kind)| cell.map(|text| typed_value(text, *kind)))
                .collect::<RawRow>()
        })
        .collect::<Vec<_>>();

    let sample_len = if options.sample_rows == 0 {
        rows.len()
    } else {
        options.sample_rows.min(rows.len())
    };
    let columns = headers
        .iter()
        .zip(&kinds)
        .enumerate()
        .map(|(idx, (header, kind))| {
            let values = rows[..sample_len]
                .iter()
                .map(|row| row[idx].clone())
                .collect();
            RawColumn::new(header.trim(), *kind, values)
        })
        .collect();

    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| display.clone());
    Ok(Sheet {
        name,
        columns,
        rows,
    })
}

fn clean_cell(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || MISSING_TOKENS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Narrowest logical kind that every present cell satisfies.
fn kind_of_cells<'a, I>(cells: I) -> LogicalKind
where
    I: Iterator<Item = Option<&'a str>>,
{
    let mut seen = 0usize;
    let (mut integer, mut floating, mut boolean, mut timestamp) = (true, true, true, true);
    for cell in cells.flatten() {
        seen += 1;
        integer &= cell.parse::<i64>().is_ok();
        floating &= cell.parse::<f64>().is_ok_and(f64::is_finite);
        boolean &= parse_boolean(cell).is_some();
        timestamp &= parse_timestamp(cell).is_ok();
        if !(integer || floating || boolean || timestamp) {
            return LogicalKind::Text;
        }
    }
    if seen == 0 {
        LogicalKind::Unknown
    } else if boolean {
        LogicalKind::Boolean
    } else if integer {
        LogicalKind::Integer
    } else if floating {
        LogicalKind::Floating
    } else {
        LogicalKind::Timestamp
    }
}

fn kind_of_values<I>(values: I) -> LogicalKind
where
    I: Iterator<Item = Option<Value>>,
{
    let mut kind: Option<LogicalKind> = None;
    for value in values.flatten() {
        if value.is_missing_marker() {
            continue;
        }
        let current = match value {
            Value::Text(_) => LogicalKind::Text,
            Value::Integer(_) => LogicalKind::Integer,
            Value::Float(_) => LogicalKind::Floating,
            Value::Boolean(_) => LogicalKind::Boolean,
            Value::Timestamp(_) => LogicalKind::Timestamp,
        };
        kind = Some(match (kind, current) {
            (None, current) => current,
            (Some(previous), current) if previous == current => current,
            (Some(LogicalKind::Integer), LogicalKind::Floating)
            | (Some(LogicalKind::Floating), LogicalKind::Integer) => LogicalKind::Floating,
            _ => LogicalKind::Text,
        });
    }
    kind.unwrap_or(LogicalKind::Unknown)
}

fn typed_value(text: String, kind: LogicalKind) -> Value {
    let parsed = match kind {
        LogicalKind::Integer => text.parse().ok().map(Value::Integer),
        LogicalKind::Floating => text.parse().ok().map(Value::Float),
        LogicalKind::Boolean => parse_boolean(&text).map(Value::Boolean),
        LogicalKind::Timestamp => parse_timestamp(&text).ok().map(Value::Timestamp),
        LogicalKind::Text | LogicalKind::Unknown => None,
    };
    parsed.unwrap_or(Value::Text(text))
}
