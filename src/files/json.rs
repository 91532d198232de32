//! JSON documents in several orientations.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde_json::{json, Map, Number, Value as Json};

use super::file_error;
use crate::db::{Record, TabularResult, Value, TIMESTAMP_FORMAT};
use crate::error::{ExtractError, Result};
use crate::query::fold_records;

/// Layout of a JSON document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum JsonOrient {
    /// `[{column: value}, ...]`
    #[default]
    Records,
    /// `{column: {row: value}}`
    Dict,
    /// `{column: [values]}`
    List,
    /// Same layout as `List`.
    Series,
    /// `{"columns": [...], "index": [...], "data": [[...]]}`
    Split,
    /// `{row: {column: value}}`
    Index,
}

impl JsonOrient {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Records => "records",
            Self::Dict => "dict",
            Self::List => "list",
            Self::Series => "series",
            Self::Split => "split",
            Self::Index => "index",
        }
    }
}

impl fmt::Display for JsonOrient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JsonOrient {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "records" => Ok(Self::Records),
            "dict" | "columns" => Ok(Self::Dict),
            "list" => Ok(Self::List),
            "series" => Ok(Self::Series),
            "split" => Ok(Self::Split),
            "index" => Ok(Self::Index),
            other => Err(ExtractError::invalid_argument(format!(
                "unsupported orient '{other}', expected one of records, dict, list, series, split, index"
            ))),
        }
    }
}

/// Options for writing JSON.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonWriteOptions {
    pub orient: JsonOrient,
    pub pretty: bool,
}

/// Writes `table` to `path` in the chosen orientation.
pub fn write(table: &TabularResult, path: &Path, options: &JsonWriteOptions) -> Result<()> {
    let document = to_json(table, options.orient);
    let text = if options.pretty {
        serde_json::to_string_pretty(&document)
    } else {
        serde_json::to_string(&document)
    }
    .map_err(|e| file_error(path, e))?;

    std::fs::write(path, text).map_err(|e| file_error(path, e))
}

/// Builds the JSON document for a table.
pub fn to_json(table: &TabularResult, orient: JsonOrient) -> Json {
    let names = table.column_names();

    match orient {
        JsonOrient::Records => Json::Array(
            table
                .rows
                .iter()
                .map(|row| row_object(&names, row))
                .collect(),
        ),
        JsonOrient::Dict => Json::Object(
            names
                .iter()
                .enumerate()
                .map(|(col, name)| {
                    let cells: Map<String, Json> = table
                        .column_values(col)
                        .enumerate()
                        .map(|(row, value)| (row.to_string(), to_json_value(value)))
                        .collect();
                    (name.to_string(), Json::Object(cells))
                })
                .collect(),
        ),
        JsonOrient::List | JsonOrient::Series => Json::Object(
            names
                .iter()
                .enumerate()
                .map(|(col, name)| {
                    let cells: Vec<Json> = table.column_values(col).map(to_json_value).collect();
                    (name.to_string(), Json::Array(cells))
                })
                .collect(),
        ),
        JsonOrient::Split => json!({
            "columns": names,
            "index": (0..table.row_count()).collect::<Vec<_>>(),
            "data": table
                .rows
                .iter()
                .map(|row| row.iter().map(to_json_value).collect::<Vec<_>>())
                .collect::<Vec<_>>(),
        }),
        JsonOrient::Index => Json::Object(
            table
                .rows
                .iter()
                .enumerate()
                .map(|(i, row)| (i.to_string(), row_object(&names, row)))
                .collect(),
        ),
    }
}

fn row_object(names: &[&str], row: &[Value]) -> Json {
    Json::Object(
        names
            .iter()
            .zip(row)
            .map(|(name, value)| (name.to_string(), to_json_value(value)))
            .collect(),
    )
}

pub(crate) fn to_json_value(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Number((*i).into()),
        Value::Float(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(b) => Json::Array(b.iter().map(|byte| Json::from(*byte)).collect()),
        Value::Timestamp(ts) => Json::String(ts.format(TIMESTAMP_FORMAT).to_string()),
    }
}

fn from_json_value(value: Json) -> Value {
    match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
        },
        Json::String(s) => Value::String(s),
        other => Value::String(other.to_string()),
    }
}

/// Reads a JSON file.
pub fn read_path(path: &Path) -> Result<TabularResult> {
    let text = std::fs::read_to_string(path).map_err(|e| file_error(path, e))?;
    parse(&text).map_err(|e| match e {
        ExtractError::File(msg) => file_error(path, msg),
        other => other,
    })
}

/// Reads from a file path if one exists, otherwise parses `input` as JSON text.
pub fn read_json(input: &str) -> Result<TabularResult> {
    let path = Path::new(input);
    if path.is_file() {
        read_path(path)
    } else {
        parse(input)
    }
}

/// Parses any of the written orientations back into a table.
pub fn parse(text: &str) -> Result<TabularResult> {
    let document: Json =
        serde_json::from_str(text).map_err(|e| ExtractError::file(format!("invalid JSON: {e}")))?;

    let records = match document {
        Json::Array(items) => array_records(items)?,
        Json::Object(map) if is_split(&map) => split_records(map)?,
        Json::Object(map) => column_records(map)?,
        other => {
            return Err(ExtractError::file(format!(
                "expected a JSON array or object, got {other}"
            )))
        }
    };

    Ok(fold_records(records))
}

fn array_records(items: Vec<Json>) -> Result<Vec<Record>> {
    items
        .into_iter()
        .map(|item| match item {
            Json::Object(fields) => Ok(fields
                .into_iter()
                .map(|(k, v)| (k, from_json_value(v)))
                .collect()),
            Json::Array(cells) => Ok(cells
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), from_json_value(v)))
                .collect()),
            other => Err(ExtractError::file(format!(
                "array items must be objects or arrays, got {other}"
            ))),
        })
        .collect()
}

fn is_split(map: &Map<String, Json>) -> bool {
    map.contains_key("columns") && map.contains_key("data")
}

fn split_records(mut map: Map<String, Json>) -> Result<Vec<Record>> {
    let Some(Json::Array(columns)) = map.remove("columns") else {
        return Err(ExtractError::file("split 'columns' must be an array"));
    };
    let Some(Json::Array(data)) = map.remove("data") else {
        return Err(ExtractError::file("split 'data' must be an array"));
    };
    let names: Vec<String> = columns
        .into_iter()
        .map(|c| match c {
            Json::String(s) => s,
            other => other.to_string(),
        })
        .collect();

    data.into_iter()
        .map(|row| match row {
            Json::Array(cells) => Ok(names
                .iter()
                .cloned()
                .zip(cells.into_iter().map(from_json_value))
                .collect()),
            other => Err(ExtractError::file(format!(
                "split rows must be arrays, got {other}"
            ))),
        })
        .collect()
}

/// Column-keyed objects, `{column: [values]}` or `{column: {row: value}}`.
/// Nested objects are always taken as column-keyed, so an index-oriented
/// document reads back transposed.
fn column_records(map: Map<String, Json>) -> Result<Vec<Record>> {
    let mut row_keys: Vec<String> = Vec::new();
    let mut cells: Vec<(String, String, Value)> = Vec::new();

    for (column, values) in map {
        match values {
            Json::Array(items) => {
                for (i, item) in items.into_iter().enumerate() {
                    cells.push((column.clone(), i.to_string(), from_json_value(item)));
                }
            }
            Json::Object(items) => {
                for (row, item) in items {
                    cells.push((column.clone(), row, from_json_value(item)));
                }
            }
            scalar => cells.push((column.clone(), "0".to_string(), from_json_value(scalar))),
        }
    }

    for (_, row, _) in &cells {
        if !row_keys.contains(row) {
            row_keys.push(row.clone());
        }
    }

    let mut records: Vec<Record> = vec![Vec::new(); row_keys.len()];
    for (column, row, value) in cells {
        if let Some(index) = row_keys.iter().position(|k| *k == row) {
            records[index].push((column, value));
        }
    }
    Ok(records)
}
