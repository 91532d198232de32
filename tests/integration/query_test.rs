//! Query execution integration tests.
//!
//! Runs queries through resolved handles and checks the normalized result.

use std::sync::Arc;

use etl_extract::connection::{ConnectionResolver, SourceDescriptor};
use etl_extract::db::mock::{MockCursorSession, RecordingConnector, RecordingWideColumnConnector};
use etl_extract::db::{BackendFamily, ColumnInfo, ConnectionHandle, Record, TabularResult, Value};
use etl_extract::error::ExtractError;
use etl_extract::query::execute;
use pretty_assertions::assert_eq;

fn record(fields: &[(&str, Value)]) -> Record {
    fields
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

#[tokio::test]
async fn test_wide_column_records_fold_into_table() {
    let records = vec![
        record(&[("id", Value::Int(1)), ("name", Value::String("a".into()))]),
        record(&[("id", Value::Int(2)), ("score", Value::Float(0.5))]),
        record(&[("name", Value::Null), ("id", Value::Int(3))]),
    ];
    let resolver =
        ConnectionResolver::with_wide_column(Arc::new(RecordingWideColumnConnector::with_records(
            records,
        )));

    let mut handle = resolver
        .resolve_wide_column(["10.0.0.7"], Some("tracking"))
        .await
        .unwrap();
    let table = execute(&mut handle, "SELECT * FROM events").await.unwrap();
    handle.close().await.unwrap();

    assert_eq!(table.column_names(), vec!["id", "name", "score"]);
    assert_eq!(table.columns[0].data_type, "int");
    assert_eq!(table.columns[1].data_type, "string");
    assert_eq!(table.columns[2].data_type, "float");
    assert_eq!(
        table.rows,
        vec![
            vec![Value::Int(1), Value::String("a".into()), Value::Null],
            vec![Value::Int(2), Value::Null, Value::Float(0.5)],
            vec![Value::Int(3), Value::Null, Value::Null],
        ]
    );
}

#[tokio::test]
async fn test_empty_wide_column_result() {
    let resolver =
        ConnectionResolver::with_wide_column(Arc::new(RecordingWideColumnConnector::new()));

    let mut handle = resolver
        .resolve_wide_column(["10.0.0.7"], None)
        .await
        .unwrap();
    let table = execute(&mut handle, "SELECT * FROM empty_table").await.unwrap();

    assert!(table.columns.is_empty());
    assert!(table.is_empty());
}

#[tokio::test]
async fn test_resolved_cursor_handle_executes() {
    let recorder = RecordingConnector::new();
    let resolver =
        ConnectionResolver::with_wide_column(Arc::new(RecordingWideColumnConnector::new()))
            .with_connector(Arc::new(recorder.for_family(BackendFamily::Oracle)));

    let descriptor = SourceDescriptor::new("ORACLE", "10.0.0.1", 1521, "u", "p", "orcl");
    let mut handle = resolver.resolve(&descriptor).await.unwrap();
    let table = execute(&mut handle, "SELECT * FROM dual").await.unwrap();

    assert!(table.is_empty());
    assert_eq!(recorder.calls(), vec![BackendFamily::Oracle]);
}

#[tokio::test]
async fn test_cursor_result_is_passed_through() {
    let expected = TabularResult::with_data(
        vec![
            ColumnInfo::new("region", "VARCHAR"),
            ColumnInfo::new("total", "BIGINT"),
        ],
        vec![
            vec![Value::String("eu".into()), Value::Int(10)],
            vec![Value::String("us".into()), Value::Int(7)],
        ],
    );
    let mut handle = ConnectionHandle::cursor(
        "mysql",
        BackendFamily::MySql,
        Box::new(MockCursorSession::new("mysql").with_result(expected.clone())),
    );

    let table = execute(&mut handle, "SELECT region, total FROM sales").await.unwrap();

    assert_eq!(table.columns, expected.columns);
    assert_eq!(table.rows, expected.rows);
}

#[tokio::test]
async fn test_query_error_propagates_driver_diagnostic() {
    let mut handle = ConnectionHandle::cursor(
        "redshift",
        BackendFamily::Postgres,
        Box::new(MockCursorSession::new("redshift").with_error("syntax error at or near \"SELEC\"")),
    );

    let err = execute(&mut handle, "SELEC 1").await.unwrap_err();
    match err {
        ExtractError::Query {
            source_type,
            message,
        } => {
            assert_eq!(source_type, "redshift");
            assert!(message.contains("SELEC"));
        }
        other => panic!("expected query error, got {other:?}"),
    }

    // The handle stays usable after a failed query.
    assert!(execute(&mut handle, "SELECT 1").await.is_ok());
}

async fn live_handle(var: &str) -> Option<ConnectionHandle> {
    let url = std::env::var(var).ok()?;
    let descriptor = SourceDescriptor::from_url(&url).ok()?;
    ConnectionResolver::default().resolve(&descriptor).await.ok()
}

#[tokio::test]
async fn test_live_postgres_select() {
    let Some(mut handle) = live_handle("ETL_TEST_POSTGRES_URL").await else {
        eprintln!("Skipping test: ETL_TEST_POSTGRES_URL not set");
        return;
    };

    let table = execute(&mut handle, "SELECT 1 AS num, 'hello' AS greeting, NULL::text AS nothing")
        .await
        .unwrap();

    assert_eq!(table.column_names(), vec!["num", "greeting", "nothing"]);
    assert_eq!(
        table.rows,
        vec![vec![Value::Int(1), Value::String("hello".into()), Value::Null]]
    );

    let err = execute(&mut handle, "SELECT * FROM no_such_table_xyz")
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::Query { .. }));

    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_live_mysql_select() {
    let Some(mut handle) = live_handle("ETL_TEST_MYSQL_URL").await else {
        eprintln!("Skipping test: ETL_TEST_MYSQL_URL not set");
        return;
    };

    let table = execute(&mut handle, "SELECT 1 AS x").await.unwrap();

    assert_eq!(table.column_names(), vec!["x"]);
    assert_eq!(table.rows, vec![vec![Value::Int(1)]]);

    handle.close().await.unwrap();
}
