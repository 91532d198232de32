//! Spreadsheet files.

use std::path::Path;

use calamine::{open_workbook_auto, Data, DataType as _, Range, Reader};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use super::{file_error, rename_columns, table_from_columns, timestamp_column};
use crate::db::{ColumnInfo, TabularResult, Value};
use crate::error::Result;
use crate::query::fold_records;

/// Number format matching `TIMESTAMP_FORMAT`.
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Which sheet(s) to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelector {
    /// Zero-based sheet position.
    Index(usize),
    Name(String),
    /// Every sheet, stacked in workbook order.
    All,
}

impl Default for SheetSelector {
    fn default() -> Self {
        Self::Index(0)
    }
}

impl SheetSelector {
    /// A number selects by position, anything else by name.
    pub fn parse(text: &str) -> Self {
        match text.parse::<usize>() {
            Ok(index) => Self::Index(index),
            Err(_) if text.eq_ignore_ascii_case("all") => Self::All,
            Err(_) => Self::Name(text.to_string()),
        }
    }
}

/// Options for reading spreadsheets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExcelReadOptions {
    pub sheet: SheetSelector,
    /// Replacement header names, one per column.
    pub names: Option<Vec<String>>,
    pub date_columns: Vec<String>,
}

/// Options for writing spreadsheets.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcelWriteOptions {
    pub sheet_name: String,
}

impl Default for ExcelWriteOptions {
    fn default() -> Self {
        Self {
            sheet_name: "Sheet1".to_string(),
        }
    }
}

/// Reads a workbook. The first row of each sheet is the header.
pub fn read(path: &Path, options: &ExcelReadOptions) -> Result<TabularResult> {
    let mut workbook = open_workbook_auto(path).map_err(|e| file_error(path, e))?;
    let sheet_names = workbook.sheet_names();

    let selected: Vec<String> = match &options.sheet {
        SheetSelector::Index(index) => vec![sheet_names
            .get(*index)
            .cloned()
            .ok_or_else(|| file_error(path, format!("no sheet at index {index}")))?],
        SheetSelector::Name(name) => {
            if !sheet_names.contains(name) {
                return Err(file_error(path, format!("no sheet named '{name}'")));
            }
            vec![name.clone()]
        }
        SheetSelector::All => sheet_names,
    };

    let mut tables = Vec::with_capacity(selected.len());
    for name in &selected {
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| file_error(path, e))?;
        let mut table = sheet_table(&range);
        if let Some(names) = &options.names {
            rename_columns(&mut table, names)?;
        }
        parse_date_columns(&mut table, &options.date_columns);
        tables.push(table);
    }

    Ok(match tables.len() {
        1 => tables.remove(0),
        _ => stack(tables),
    })
}

fn sheet_table(range: &Range<Data>) -> TabularResult {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return TabularResult::new();
    };

    let names: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell {
            Data::Empty => format!("Unnamed: {i}"),
            other => other.to_string(),
        })
        .collect();

    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); names.len()];
    for row in rows {
        for (column, cell) in columns.iter_mut().zip(row) {
            column.push(convert_cell(cell));
        }
    }

    table_from_columns(
        names
            .into_iter()
            .zip(columns)
            .map(|(name, values)| {
                let (label, values) = unify_numbers(values);
                (ColumnInfo::new(name, label), values)
            })
            .collect(),
    )
}

fn convert_cell(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Int(v) => Value::Int(*v),
        Data::Float(v) => Value::Float(*v),
        Data::Bool(v) => Value::Bool(*v),
        Data::String(v) => Value::String(v.clone()),
        Data::DateTime(_) | Data::DateTimeIso(_) => cell
            .as_datetime()
            .map(Value::Timestamp)
            .unwrap_or_else(|| Value::String(cell.to_string())),
        Data::DurationIso(v) => Value::String(v.clone()),
    }
}

/// Spreadsheets store every number as a float; a column whose numbers are
/// all whole becomes an int column.
fn unify_numbers(values: Vec<Value>) -> (&'static str, Vec<Value>) {
    let whole = |v: &Value| match v {
        Value::Int(_) | Value::Null => true,
        Value::Float(f) => f.fract() == 0.0 && f.abs() < i64::MAX as f64,
        _ => false,
    };

    let label = values
        .iter()
        .find(|v| !v.is_null())
        .map(|v| v.type_name())
        .unwrap_or("null");

    if values.iter().any(|v| !v.is_null()) && values.iter().all(whole) {
        let values = values
            .into_iter()
            .map(|v| match v {
                Value::Float(f) => Value::Int(f as i64),
                other => other,
            })
            .collect();
        return ("int", values);
    }

    (label, values)
}

fn parse_date_columns(table: &mut TabularResult, date_columns: &[String]) {
    for name in date_columns {
        let Some(index) = table.column_index(name) else {
            continue;
        };
        let cells: Vec<Value> = table.column_values(index).cloned().collect();
        if let Some(parsed) = timestamp_column(&cells) {
            for (row, value) in table.rows.iter_mut().zip(parsed) {
                row[index] = value;
            }
            table.columns[index].data_type = "timestamp".to_string();
        }
    }
}

/// Stacks tables from several sheets; columns are the union of headers.
fn stack(tables: Vec<TabularResult>) -> TabularResult {
    let records = tables
        .into_iter()
        .flat_map(|table| {
            let names: Vec<String> = table.columns.into_iter().map(|c| c.name).collect();
            table
                .rows
                .into_iter()
                .map(move |row| names.iter().cloned().zip(row).collect::<Vec<_>>())
                .collect::<Vec<_>>()
        })
        .collect();
    fold_records(records)
}

/// Writes one sheet with a header row. No index column is written.
pub fn write(table: &TabularResult, path: &Path, options: &ExcelWriteOptions) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    fill_sheet(worksheet, table, &options.sheet_name).map_err(|e| file_error(path, e))?;
    workbook.save(path).map_err(|e| file_error(path, e))
}

fn fill_sheet(
    worksheet: &mut Worksheet,
    table: &TabularResult,
    sheet_name: &str,
) -> std::result::Result<(), XlsxError> {
    worksheet.set_name(sheet_name)?;
    let header = Format::new().set_bold();
    let datetime = Format::new().set_num_format(DATETIME_FORMAT);

    for (col, column) in table.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, sheet_col(col)?, &column.name, &header)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let row_num = sheet_row(r + 1)?;
        for (c, value) in row.iter().enumerate() {
            let col = sheet_col(c)?;
            match value {
                Value::Null => {}
                Value::Bool(v) => {
                    worksheet.write_boolean(row_num, col, *v)?;
                }
                Value::Int(v) => {
                    worksheet.write_number(row_num, col, *v as f64)?;
                }
                Value::Float(v) => {
                    worksheet.write_number(row_num, col, *v)?;
                }
                Value::String(v) => {
                    worksheet.write_string(row_num, col, v)?;
                }
                Value::Timestamp(v) => {
                    worksheet.write_datetime_with_format(row_num, col, v, &datetime)?;
                }
                Value::Bytes(_) => {
                    worksheet.write_string(row_num, col, value.to_display_string())?;
                }
            }
        }
    }
    Ok(())
}

fn sheet_row(index: usize) -> std::result::Result<u32, XlsxError> {
    u32::try_from(index).map_err(|_| XlsxError::RowColumnLimitError)
}

fn sheet_col(index: usize) -> std::result::Result<u16, XlsxError> {
    u16::try_from(index).map_err(|_| XlsxError::RowColumnLimitError)
}
