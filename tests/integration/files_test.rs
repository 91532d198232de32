//! File sink and reader integration tests.
//!
//! Moves tables between formats through the public `files` API.

use std::sync::Arc;

use etl_extract::connection::ConnectionResolver;
use etl_extract::db::mock::RecordingWideColumnConnector;
use etl_extract::db::{ColumnInfo, TabularResult, Value};
use etl_extract::error::ExtractError;
use etl_extract::files::{
    self, CsvReadOptions, CsvWriteOptions, FileFormat, JsonOrient, JsonWriteOptions,
    ParquetWriteOptions, ReadOptions, WriteOptions,
};
use etl_extract::query::execute;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn orders() -> TabularResult {
    TabularResult::with_data(
        vec![
            ColumnInfo::new("id", "int"),
            ColumnInfo::new("region", "string"),
            ColumnInfo::new("note", "string"),
        ],
        vec![
            vec![Value::Int(1), Value::String("eu".into()), Value::String("first".into())],
            vec![Value::Int(2), Value::String("us".into()), Value::Null],
            vec![Value::Int(3), Value::String("eu".into()), Value::String("a, b".into())],
        ],
    )
}

#[test]
fn test_csv_sink_creates_parent_directories() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("exports").join("2024").join("orders.csv");

    files::write_table(&orders(), &path, &WriteOptions::default_for(FileFormat::Csv)).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "id,region,note");
    assert_eq!(lines[1], "1,eu,first");
    assert_eq!(lines[2], "2,us,");
    assert_eq!(lines[3], "3,eu,\"a, b\"");
}

#[test]
fn test_csv_with_custom_separator_reads_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("orders.txt");

    files::write_table(
        &orders(),
        &path,
        &WriteOptions::Csv(CsvWriteOptions { separator: b'|' }),
    )
    .unwrap();
    let back = files::read_table(
        &path,
        &ReadOptions::Csv(CsvReadOptions {
            separator: b'|',
            ..Default::default()
        }),
    )
    .unwrap();

    assert_eq!(back.column_names(), vec!["id", "region", "note"]);
    assert_eq!(back.columns[0].data_type, "int");
    assert_eq!(back.rows, orders().rows);
}

#[test]
fn test_partitioned_parquet_to_json() {
    let dir = tempdir().unwrap();
    let dataset = dir.path().join("lake").join("orders");

    files::write_table(
        &orders(),
        &dataset,
        &WriteOptions::Parquet(ParquetWriteOptions {
            partition_columns: vec!["region".to_string()],
            ..Default::default()
        }),
    )
    .unwrap();
    assert!(dataset.join("region=eu").is_dir());
    assert!(dataset.join("region=us").is_dir());

    let table = files::read_table(&dataset, &ReadOptions::Parquet).unwrap();
    assert_eq!(table.column_names(), vec!["id", "note", "region"]);
    assert_eq!(table.row_count(), 3);

    let json_path = dir.path().join("orders.json");
    files::write_table(
        &table,
        &json_path,
        &WriteOptions::Json(JsonWriteOptions {
            orient: JsonOrient::Records,
            pretty: false,
        }),
    )
    .unwrap();

    let back = files::json::read_json(json_path.to_str().unwrap()).unwrap();
    assert_eq!(back.column_names(), vec!["id", "note", "region"]);
    let regions: Vec<&Value> = back.column_values(2).collect();
    assert_eq!(
        regions,
        vec![
            &Value::String("eu".into()),
            &Value::String("eu".into()),
            &Value::String("us".into())
        ]
    );
}

#[test]
fn test_inline_json_in_column_layout() {
    let table = files::json::read_json(r#"{"a": [1, 2], "b": ["x", null]}"#).unwrap();

    assert_eq!(table.column_names(), vec!["a", "b"]);
    assert_eq!(
        table.rows,
        vec![
            vec![Value::Int(1), Value::String("x".into())],
            vec![Value::Int(2), Value::Null],
        ]
    );
}

#[test]
fn test_missing_input_is_file_error() {
    let dir = tempdir().unwrap();
    let err = files::read_table(
        &dir.path().join("absent.csv"),
        &ReadOptions::default_for(FileFormat::Csv),
    )
    .unwrap_err();

    assert!(matches!(err, ExtractError::File(_)));
}

#[tokio::test]
async fn test_wide_column_query_to_excel() {
    let records = vec![
        vec![
            ("user".to_string(), Value::String("ann".into())),
            ("visits".to_string(), Value::Int(4)),
        ],
        vec![("user".to_string(), Value::String("bob".into()))],
    ];
    let resolver = ConnectionResolver::with_wide_column(Arc::new(
        RecordingWideColumnConnector::with_records(records),
    ));
    let mut handle = resolver
        .resolve_wide_column(vec!["10.0.0.7".to_string()], Some("tracking"))
        .await
        .unwrap();
    let table = execute(&mut handle, "SELECT user, visits FROM users").await.unwrap();
    handle.close().await.unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("out").join("users.xlsx");
    files::write_table(&table, &path, &WriteOptions::default_for(FileFormat::Excel)).unwrap();

    let back = files::read_table(&path, &ReadOptions::default_for(FileFormat::Excel)).unwrap();
    assert_eq!(back.column_names(), vec!["user", "visits"]);
    assert_eq!(
        back.rows,
        vec![
            vec![Value::String("ann".into()), Value::Int(4)],
            vec![Value::String("bob".into()), Value::Null],
        ]
    );
}
