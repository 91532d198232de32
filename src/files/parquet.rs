//! Parquet datasets.
//!
//! A write produces a dataset directory: one file at the root, or one file
//! per partition under hive-style `column=value` subdirectories. Reads
//! accept a single file or a dataset directory and restore partition
//! columns from the directory names.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use ::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use ::parquet::arrow::ArrowWriter;
use ::parquet::basic::{BrotliLevel, Compression, GzipLevel};
use ::parquet::file::properties::WriterProperties;
use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Field, Float32Type, Float64Type, Int16Type, Int32Type,
    Int64Type, Int8Type, Schema, SchemaRef, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use tracing::debug;

use super::{file_error, infer_column};
use crate::db::{ColumnInfo, Record, Row, TabularResult, Value};
use crate::error::{ExtractError, Result};
use crate::query::fold_records;

/// Directory value used for a null partition key.
const NULL_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";
const PART_FILE: &str = "part-0.parquet";

/// Column compression codecs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ParquetCompression {
    #[default]
    Snappy,
    Gzip,
    Brotli,
    None,
}

impl ParquetCompression {
    fn codec(&self) -> Compression {
        match self {
            Self::Snappy => Compression::SNAPPY,
            Self::Gzip => Compression::GZIP(GzipLevel::default()),
            Self::Brotli => Compression::BROTLI(BrotliLevel::default()),
            Self::None => Compression::UNCOMPRESSED,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snappy => "snappy",
            Self::Gzip => "gzip",
            Self::Brotli => "brotli",
            Self::None => "none",
        }
    }
}

impl fmt::Display for ParquetCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParquetCompression {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "snappy" => Ok(Self::Snappy),
            "gzip" => Ok(Self::Gzip),
            "brotli" => Ok(Self::Brotli),
            "none" => Ok(Self::None),
            other => Err(ExtractError::invalid_argument(format!(
                "unsupported compression '{other}', expected one of snappy, gzip, brotli, none"
            ))),
        }
    }
}

/// Options for writing a dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParquetWriteOptions {
    pub partition_columns: Vec<String>,
    pub compression: ParquetCompression,
}

/// Writes `table` as a dataset rooted at `root`.
pub fn write(table: &TabularResult, root: &Path, options: &ParquetWriteOptions) -> Result<()> {
    std::fs::create_dir_all(root).map_err(|e| file_error(root, e))?;
    let props = WriterProperties::builder()
        .set_compression(options.compression.codec())
        .build();

    if options.partition_columns.is_empty() {
        let all: Vec<usize> = (0..table.columns.len()).collect();
        let rows: Vec<&Row> = table.rows.iter().collect();
        return write_file(&root.join(PART_FILE), table, &all, &rows, props);
    }

    let mut key_indices = Vec::with_capacity(options.partition_columns.len());
    for name in &options.partition_columns {
        let index = table.column_index(name).ok_or_else(|| {
            ExtractError::invalid_argument(format!("partition column '{name}' not in table"))
        })?;
        key_indices.push(index);
    }
    let data_indices: Vec<usize> = (0..table.columns.len())
        .filter(|i| !key_indices.contains(i))
        .collect();
    if data_indices.is_empty() {
        return Err(ExtractError::invalid_argument(
            "cannot partition on every column",
        ));
    }

    for (dir, rows) in partition_rows(table, &key_indices) {
        let dir = root.join(dir);
        std::fs::create_dir_all(&dir).map_err(|e| file_error(&dir, e))?;
        write_file(&dir.join(PART_FILE), table, &data_indices, &rows, props.clone())?;
    }
    Ok(())
}

/// Groups rows by partition key, in order of first appearance.
fn partition_rows<'a>(table: &'a TabularResult, key_indices: &[usize]) -> Vec<(PathBuf, Vec<&'a Row>)> {
    let mut groups: Vec<(PathBuf, Vec<&Row>)> = Vec::new();
    let mut positions: HashMap<PathBuf, usize> = HashMap::new();

    for row in &table.rows {
        let dir: PathBuf = key_indices
            .iter()
            .map(|&i| {
                let value = match &row[i] {
                    Value::Null => NULL_PARTITION.to_string(),
                    other => urlencoding::encode(&other.to_display_string()).into_owned(),
                };
                format!("{}={}", table.columns[i].name, value)
            })
            .collect();

        match positions.get(&dir) {
            Some(&index) => groups[index].1.push(row),
            None => {
                positions.insert(dir.clone(), groups.len());
                groups.push((dir, vec![row]));
            }
        }
    }
    groups
}

fn write_file(
    path: &Path,
    table: &TabularResult,
    column_indices: &[usize],
    rows: &[&Row],
    props: WriterProperties,
) -> Result<()> {
    let mut fields = Vec::with_capacity(column_indices.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(column_indices.len());
    for &index in column_indices {
        let values: Vec<&Value> = rows.iter().map(|row| &row[index]).collect();
        let array = build_array(&values);
        fields.push(Field::new(
            &table.columns[index].name,
            array.data_type().clone(),
            true,
        ));
        arrays.push(array);
    }
    let schema: SchemaRef = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(Arc::clone(&schema), arrays)
        .map_err(|e| file_error(path, e))?;

    let file = File::create(path).map_err(|e| file_error(path, e))?;
    let mut writer =
        ArrowWriter::try_new(file, schema, Some(props)).map_err(|e| file_error(path, e))?;
    writer.write(&batch).map_err(|e| file_error(path, e))?;
    writer.close().map_err(|e| file_error(path, e))?;

    debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int,
    Float,
    Timestamp,
    Bytes,
    Text,
}

/// Picks one Arrow type for a column. Ints widen to floats; any other mix
/// is written as text.
fn column_kind(values: &[&Value]) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for value in values {
        let this = match value {
            Value::Null => continue,
            Value::Bool(_) => ColumnKind::Bool,
            Value::Int(_) => ColumnKind::Int,
            Value::Float(_) => ColumnKind::Float,
            Value::Timestamp(_) => ColumnKind::Timestamp,
            Value::Bytes(_) => ColumnKind::Bytes,
            Value::String(_) => ColumnKind::Text,
        };
        kind = Some(match (kind, this) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(ColumnKind::Int), ColumnKind::Float)
            | (Some(ColumnKind::Float), ColumnKind::Int) => ColumnKind::Float,
            _ => ColumnKind::Text,
        });
    }
    kind.unwrap_or(ColumnKind::Text)
}

fn build_array(values: &[&Value]) -> ArrayRef {
    match column_kind(values) {
        ColumnKind::Bool => Arc::new(BooleanArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Int => Arc::new(Int64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Float => Arc::new(Float64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i as f64),
                    Value::Float(f) => Some(*f),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Timestamp => Arc::new(TimestampMicrosecondArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Timestamp(ts) => Some(ts.and_utc().timestamp_micros()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Bytes => Arc::new(BinaryArray::from_opt_vec(
            values
                .iter()
                .map(|v| match v {
                    Value::Bytes(b) => Some(b.as_slice()),
                    _ => None,
                })
                .collect(),
        )),
        ColumnKind::Text => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| (!v.is_null()).then(|| v.to_display_string()))
                .collect::<Vec<_>>(),
        )),
    }
}

/// Reads a single file or a dataset directory.
pub fn read(path: &Path) -> Result<TabularResult> {
    let files = if path.is_dir() {
        let mut files = Vec::new();
        collect_files(path, &mut files)?;
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    let partitions: Vec<Vec<(String, String)>> = files
        .iter()
        .map(|file| partition_values(path, file))
        .collect();
    let partition_columns = typed_partitions(&partitions);

    let mut records: Vec<Record> = Vec::new();
    let mut names: Vec<String> = Vec::new();
    let mut types: HashMap<String, String> = HashMap::new();
    for (file_index, file) in files.iter().enumerate() {
        let partition_record: Record = partition_columns
            .iter()
            .map(|(name, values)| (name.clone(), values[file_index].clone()))
            .collect();

        let (schema, batches) = read_batches(file)?;
        for field in schema.fields() {
            types
                .entry(field.name().clone())
                .or_insert_with(|| field.data_type().to_string());
            if !names.contains(field.name()) {
                names.push(field.name().clone());
            }
        }
        for (name, _) in &partition_record {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }

        for batch in batches {
            for row in 0..batch.num_rows() {
                let mut record: Record = batch
                    .schema()
                    .fields()
                    .iter()
                    .zip(batch.columns())
                    .map(|(field, array)| (field.name().clone(), array_value(array, row)))
                    .collect();
                record.extend(partition_record.iter().cloned());
                records.push(record);
            }
        }
    }

    let mut table = fold_records(records);
    // Columns of files without rows still belong to the header.
    for name in names {
        if table.column_index(&name).is_none() {
            table.columns.push(ColumnInfo::new(name, "null"));
            for row in &mut table.rows {
                row.push(Value::Null);
            }
        }
    }
    for column in &mut table.columns {
        if let Some(data_type) = types.get(&column.name) {
            column.data_type = data_type.clone();
        }
    }
    Ok(table)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| file_error(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| file_error(dir, e))?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.') || n.starts_with('_'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// `column=value` pairs from the directories between `root` and `file`.
fn partition_values(root: &Path, file: &Path) -> Vec<(String, String)> {
    let Ok(relative) = file.strip_prefix(root) else {
        return Vec::new();
    };
    relative
        .parent()
        .into_iter()
        .flat_map(|dir| dir.components())
        .filter_map(|component| {
            let part = component.as_os_str().to_str()?;
            let (name, value) = part.split_once('=')?;
            let value = urlencoding::decode(value).ok()?.into_owned();
            Some((name.to_string(), value))
        })
        .collect()
}

/// Types each partition key across all files, one value per file.
fn typed_partitions(partitions: &[Vec<(String, String)>]) -> Vec<(String, Vec<Value>)> {
    let mut names: Vec<String> = Vec::new();
    for (name, _) in partitions.iter().flatten() {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }

    names
        .into_iter()
        .map(|name| {
            let raw: Vec<Option<String>> = partitions
                .iter()
                .map(|pairs| {
                    pairs
                        .iter()
                        .find(|(key, _)| *key == name)
                        .map(|(_, value)| value.clone())
                        .filter(|value| value != NULL_PARTITION)
                })
                .collect();
            let (_, values) = infer_column(raw);
            (name, values)
        })
        .collect()
}

/// The file's Arrow schema and all of its record batches.
fn read_batches(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let file = File::open(path).map_err(|e| file_error(path, e))?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| file_error(path, e))?;
    let schema = builder.schema().clone();
    let reader = builder.build().map_err(|e| file_error(path, e))?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch.map_err(|e| file_error(path, e))?);
    }
    Ok((schema, batches))
}

fn array_value(array: &ArrayRef, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }

    match array.data_type() {
        DataType::Boolean => Value::Bool(array.as_boolean().value(row)),
        DataType::Int8 => Value::Int(array.as_primitive::<Int8Type>().value(row) as i64),
        DataType::Int16 => Value::Int(array.as_primitive::<Int16Type>().value(row) as i64),
        DataType::Int32 => Value::Int(array.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => Value::Int(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => Value::Int(array.as_primitive::<UInt8Type>().value(row) as i64),
        DataType::UInt16 => Value::Int(array.as_primitive::<UInt16Type>().value(row) as i64),
        DataType::UInt32 => Value::Int(array.as_primitive::<UInt32Type>().value(row) as i64),
        DataType::UInt64 => {
            let v = array.as_primitive::<UInt64Type>().value(row);
            i64::try_from(v)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::String(v.to_string()))
        }
        DataType::Float32 => Value::Float(array.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => Value::Float(array.as_primitive::<Float64Type>().value(row)),
        DataType::Utf8 => Value::String(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::String(array.as_string::<i64>().value(row).to_string()),
        DataType::Binary => Value::Bytes(array.as_binary::<i32>().value(row).to_vec()),
        DataType::LargeBinary => Value::Bytes(array.as_binary::<i64>().value(row).to_vec()),
        DataType::Timestamp(unit, _) => {
            let ts = match unit {
                TimeUnit::Second => array
                    .as_primitive::<TimestampSecondType>()
                    .value_as_datetime(row),
                TimeUnit::Millisecond => array
                    .as_primitive::<TimestampMillisecondType>()
                    .value_as_datetime(row),
                TimeUnit::Microsecond => array
                    .as_primitive::<TimestampMicrosecondType>()
                    .value_as_datetime(row),
                TimeUnit::Nanosecond => array
                    .as_primitive::<TimestampNanosecondType>()
                    .value_as_datetime(row),
            };
            ts.map(Value::Timestamp).unwrap_or(Value::Null)
        }
        DataType::Date32 => array
            .as_primitive::<Date32Type>()
            .value_as_date(row)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        DataType::Date64 => array
            .as_primitive::<Date64Type>()
            .value_as_date(row)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        _ => array_value_to_string(array.as_ref(), row)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}
