//! File readers and writers over [`TabularResult`].
//!
//! Files are the peer source and sink for database results: every reader
//! produces the same table type the query layer returns, and every writer
//! consumes it. Writers create missing parent directories first.

pub mod csv;
pub mod excel;
pub mod json;
pub mod parquet;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::info;

use crate::db::{ColumnInfo, Row, TabularResult, Value, TIMESTAMP_FORMAT};
use crate::error::{ExtractError, Result};

pub use self::csv::{CsvReadOptions, CsvWriteOptions};
pub use self::excel::{ExcelReadOptions, ExcelWriteOptions, SheetSelector};
pub use self::json::{JsonOrient, JsonWriteOptions};
pub use self::parquet::{ParquetCompression, ParquetWriteOptions};

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FileFormat {
    Csv,
    Excel,
    Parquet,
    Json,
}

impl FileFormat {
    /// Guesses the format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Some(Self::Csv),
            "xlsx" | "xlsm" | "xls" | "ods" => Some(Self::Excel),
            "parquet" | "pq" => Some(Self::Parquet),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "excel",
            Self::Parquet => "parquet",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" | "tsv" => Ok(Self::Csv),
            "excel" | "xlsx" => Ok(Self::Excel),
            "parquet" => Ok(Self::Parquet),
            "json" => Ok(Self::Json),
            other => Err(ExtractError::invalid_argument(format!(
                "unknown file format '{other}'"
            ))),
        }
    }
}

/// How to write a table, per format.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOptions {
    Csv(CsvWriteOptions),
    Excel(ExcelWriteOptions),
    Parquet(ParquetWriteOptions),
    Json(JsonWriteOptions),
}

impl WriteOptions {
    /// Default options for a format.
    pub fn default_for(format: FileFormat) -> Self {
        match format {
            FileFormat::Csv => Self::Csv(CsvWriteOptions::default()),
            FileFormat::Excel => Self::Excel(ExcelWriteOptions::default()),
            FileFormat::Parquet => Self::Parquet(ParquetWriteOptions::default()),
            FileFormat::Json => Self::Json(JsonWriteOptions::default()),
        }
    }

    pub fn format(&self) -> FileFormat {
        match self {
            Self::Csv(_) => FileFormat::Csv,
            Self::Excel(_) => FileFormat::Excel,
            Self::Parquet(_) => FileFormat::Parquet,
            Self::Json(_) => FileFormat::Json,
        }
    }
}

/// How to read a table, per format.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOptions {
    Csv(CsvReadOptions),
    Excel(ExcelReadOptions),
    Parquet,
    Json,
}

impl ReadOptions {
    /// Default options for a format.
    pub fn default_for(format: FileFormat) -> Self {
        match format {
            FileFormat::Csv => Self::Csv(CsvReadOptions::default()),
            FileFormat::Excel => Self::Excel(ExcelReadOptions::default()),
            FileFormat::Parquet => Self::Parquet,
            FileFormat::Json => Self::Json,
        }
    }
}

/// Writes `table` to `path`, creating parent directories as needed.
///
/// For Parquet, `path` is the dataset root directory.
pub fn write_table(table: &TabularResult, path: &Path, options: &WriteOptions) -> Result<()> {
    ensure_parent_dir(path)?;

    match options {
        WriteOptions::Csv(opts) => csv::write(table, path, opts)?,
        WriteOptions::Excel(opts) => excel::write(table, path, opts)?,
        WriteOptions::Parquet(opts) => parquet::write(table, path, opts)?,
        WriteOptions::Json(opts) => json::write(table, path, opts)?,
    }

    info!(
        "Wrote {} rows as {} to {}",
        table.row_count(),
        options.format(),
        path.display()
    );
    Ok(())
}

/// Reads a table from `path`.
pub fn read_table(path: &Path, options: &ReadOptions) -> Result<TabularResult> {
    let table = match options {
        ReadOptions::Csv(opts) => csv::read(path, opts)?,
        ReadOptions::Excel(opts) => excel::read(path, opts)?,
        ReadOptions::Parquet => parquet::read(path)?,
        ReadOptions::Json => json::read_path(path)?,
    };

    info!("Read {} rows from {}", table.row_count(), path.display());
    Ok(table)
}

/// Creates the parent directory of `path` if it does not exist.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| ExtractError::file(format!("{}: {e}", parent.display()))),
        _ => Ok(()),
    }
}

pub(crate) fn file_error(path: &Path, cause: impl fmt::Display) -> ExtractError {
    ExtractError::file(format!("{}: {cause}", path.display()))
}

/// Text form of a cell for text-based sinks. Null is the empty string.
pub(crate) fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_display_string(),
    }
}

/// Parses the date and date-time layouts found in exported files.
pub(crate) fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    const LAYOUTS: [&str; 4] = [
        TIMESTAMP_FORMAT,
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
    ];

    let text = text.trim();
    LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .or_else(|| {
            ["%Y-%m-%d", "%Y/%m/%d"]
                .iter()
                .find_map(|layout| NaiveDate::parse_from_str(text, layout).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Types a column of raw text cells. The first of int, float, bool that
/// every non-empty cell parses as wins; otherwise the column stays text.
pub(crate) fn infer_column(cells: Vec<Option<String>>) -> (&'static str, Vec<Value>) {
    let present = || cells.iter().flatten();

    if present().next().is_none() {
        return ("null", vec![Value::Null; cells.len()]);
    }
    if present().all(|c| c.trim().parse::<i64>().is_ok()) {
        let values = cells
            .into_iter()
            .map(|c| c.and_then(|c| c.trim().parse::<i64>().ok()).into())
            .collect();
        return ("int", values);
    }
    if present().all(|c| c.trim().parse::<f64>().is_ok()) {
        let values = cells
            .into_iter()
            .map(|c| c.and_then(|c| c.trim().parse::<f64>().ok()).into())
            .collect();
        return ("float", values);
    }
    if present().all(|c| parse_bool(c).is_some()) {
        let values = cells
            .into_iter()
            .map(|c| c.and_then(|c| parse_bool(&c)).into())
            .collect();
        return ("bool", values);
    }

    ("string", cells.into_iter().map(Value::from).collect())
}

/// Converts a text column to timestamps if every non-empty cell parses.
pub(crate) fn timestamp_column(cells: &[Value]) -> Option<Vec<Value>> {
    cells
        .iter()
        .map(|cell| match cell {
            Value::Null => Some(Value::Null),
            Value::Timestamp(ts) => Some(Value::Timestamp(*ts)),
            Value::String(s) => parse_timestamp(s).map(Value::Timestamp),
            _ => None,
        })
        .collect()
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Assembles a table from column-major data.
pub(crate) fn table_from_columns(columns: Vec<(ColumnInfo, Vec<Value>)>) -> TabularResult {
    let row_count = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
    let mut rows: Vec<Row> = (0..row_count)
        .map(|_| Vec::with_capacity(columns.len()))
        .collect();
    let mut infos = Vec::with_capacity(columns.len());

    for (info, values) in columns {
        for (row, value) in rows.iter_mut().zip(values) {
            row.push(value);
        }
        infos.push(info);
    }

    TabularResult::with_data(infos, rows)
}

/// Replaces header names with `names`, which must match the column count.
pub(crate) fn rename_columns(table: &mut TabularResult, names: &[String]) -> Result<()> {
    if names.len() != table.columns.len() {
        return Err(ExtractError::invalid_argument(format!(
            "{} column names given for {} columns",
            names.len(),
            table.columns.len()
        )));
    }
    for (column, name) in table.columns.iter_mut().zip(names) {
        column.name = name.clone();
    }
    Ok(())
}
