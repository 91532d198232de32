//! Delimited text files.

use std::fs::File;
use std::io;
use std::path::Path;

use tracing::warn;

use super::{cell_text, file_error, infer_column, table_from_columns, timestamp_column};
use crate::db::{ColumnInfo, TabularResult, Value};
use crate::error::{ExtractError, Result};

/// Options for reading delimited text.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvReadOptions {
    pub separator: u8,
    /// Explicit column names. When given, the first line is data.
    pub names: Option<Vec<String>>,
    /// Columns to parse as timestamps.
    pub date_columns: Vec<String>,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            separator: b',',
            names: None,
            date_columns: Vec::new(),
        }
    }
}

/// Options for writing delimited text.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvWriteOptions {
    pub separator: u8,
}

impl Default for CsvWriteOptions {
    fn default() -> Self {
        Self { separator: b',' }
    }
}

/// Reads a delimited file.
pub fn read(path: &Path, options: &CsvReadOptions) -> Result<TabularResult> {
    let file = File::open(path).map_err(|e| file_error(path, e))?;
    read_from(file, options).map_err(|e| match e {
        ExtractError::File(msg) => file_error(path, msg),
        other => other,
    })
}

/// Reads delimited text from any reader. Backslash escapes quotes.
pub fn read_from<R: io::Read>(reader: R, options: &CsvReadOptions) -> Result<TabularResult> {
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(options.separator)
        .escape(Some(b'\\'))
        .has_headers(options.names.is_none())
        .from_reader(reader);

    let names: Vec<String> = match &options.names {
        Some(names) => names.clone(),
        None => reader
            .headers()
            .map_err(|e| ExtractError::file(e.to_string()))?
            .iter()
            .map(String::from)
            .collect(),
    };

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| ExtractError::file(e.to_string()))?;
        if record.len() != names.len() {
            return Err(ExtractError::file(format!(
                "record {} has {} fields, expected {}",
                line + 1,
                record.len(),
                names.len()
            )));
        }
        for (column, field) in cells.iter_mut().zip(record.iter()) {
            column.push((!field.is_empty()).then(|| field.to_string()));
        }
    }

    let columns = names
        .into_iter()
        .zip(cells)
        .map(|(name, raw)| {
            let (label, values) = infer_column(raw);
            if options.date_columns.contains(&name) {
                return date_column(name, label, values);
            }
            (ColumnInfo::new(name, label), values)
        })
        .collect();

    Ok(table_from_columns(columns))
}

fn date_column(name: String, label: &str, values: Vec<Value>) -> (ColumnInfo, Vec<Value>) {
    match timestamp_column(&values) {
        Some(parsed) => (ColumnInfo::new(name, "timestamp"), parsed),
        None => {
            warn!("Column {} has values that are not dates; kept as {}", name, label);
            (ColumnInfo::new(name, label), values)
        }
    }
}

/// Writes a header row and every row. No index column is written.
pub fn write(table: &TabularResult, path: &Path, options: &CsvWriteOptions) -> Result<()> {
    let file = File::create(path).map_err(|e| file_error(path, e))?;
    write_to(table, file, options).map_err(|e| file_error(path, e))
}

/// Writes delimited text to any writer.
pub fn write_to<W: io::Write>(
    table: &TabularResult,
    writer: W,
    options: &CsvWriteOptions,
) -> std::result::Result<(), ::csv::Error> {
    let mut writer = ::csv::WriterBuilder::new()
        .delimiter(options.separator)
        .from_writer(writer);

    writer.write_record(table.column_names())?;
    for row in &table.rows {
        writer.write_record(row.iter().map(cell_text))?;
    }
    writer.flush()?;
    Ok(())
}
