//! HiveServer2 sessions through ODBC.
//!
//! ODBC calls block, so connecting and fetching run on tokio's blocking
//! pool. Values are fetched as text and typed by the column's SQL type.

use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use odbc_api::buffers::TextRowSet;
use odbc_api::{Connection, ConnectionOptions, Cursor, DataType, Environment, ResultSetMetadata};
use tracing::debug;

use crate::connection::{BackendConnector, SourceDescriptor};
use crate::db::{
    BackendFamily, ColumnInfo, ConnectionHandle, CursorSession, Row, SourceType, TabularResult,
    Value,
};
use crate::error::{ExtractError, Result};

const LABEL: &str = "hive";
const BATCH_SIZE: usize = 5000;
const MAX_TEXT_LEN: usize = 65536;

static ENVIRONMENT: OnceLock<std::result::Result<Environment, String>> = OnceLock::new();

fn environment() -> Result<&'static Environment> {
    ENVIRONMENT
        .get_or_init(|| Environment::new().map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| ExtractError::connection(LABEL, format!("ODBC environment: {e}")))
}

/// Connector for HiveServer2.
#[derive(Debug, Clone)]
pub struct HiveConnector {
    driver: String,
}

impl HiveConnector {
    /// ODBC driver name used when none is configured.
    pub const DEFAULT_DRIVER: &'static str = "Cloudera ODBC Driver for Apache Hive";

    pub fn new(driver: &str) -> Self {
        Self {
            driver: driver.to_string(),
        }
    }

    fn connection_string(&self, descriptor: &SourceDescriptor) -> String {
        format!(
            "Driver={{{}}};Host={};Port={};Schema={};AuthMech=3;UID={};PWD={};",
            self.driver,
            descriptor.host,
            descriptor.port,
            descriptor.database,
            descriptor.username,
            descriptor.password
        )
    }
}

#[async_trait]
impl BackendConnector for HiveConnector {
    fn family(&self) -> BackendFamily {
        BackendFamily::Hive
    }

    async fn connect(
        &self,
        source_type: SourceType,
        descriptor: &SourceDescriptor,
    ) -> Result<ConnectionHandle> {
        debug!("Opening hive connection to {}", descriptor.display_string());
        let connection_string = self.connection_string(descriptor);

        let conn = tokio::task::spawn_blocking(move || {
            environment()?
                .connect_with_connection_string(&connection_string, ConnectionOptions::default())
                .map_err(|e| ExtractError::connection(LABEL, e))
        })
        .await
        .map_err(|e| ExtractError::internal(format!("hive connect task failed: {e}")))??;

        Ok(ConnectionHandle::cursor(
            source_type.as_str(),
            BackendFamily::Hive,
            Box::new(HiveSession {
                conn: Arc::new(Mutex::new(conn)),
            }),
        ))
    }
}

/// A single ODBC connection to HiveServer2.
pub struct HiveSession {
    conn: Arc<Mutex<Connection<'static>>>,
}

#[async_trait]
impl CursorSession for HiveSession {
    async fn fetch_all(&mut self, sql: &str) -> Result<TabularResult> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();

        let table = tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| ExtractError::internal("hive connection lock poisoned"))?;
            run_query(&conn, &sql)
        })
        .await
        .map_err(|e| ExtractError::internal(format!("hive query task failed: {e}")))??;

        debug!("Fetched {} rows from {}", table.row_count(), LABEL);
        Ok(table)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let conn = self.conn;
        tokio::task::spawn_blocking(move || drop(conn))
            .await
            .map_err(|e| ExtractError::internal(format!("hive close task failed: {e}")))
    }
}

fn run_query(conn: &Connection<'static>, sql: &str) -> Result<TabularResult> {
    let query_error = |e: odbc_api::Error| ExtractError::query(LABEL, e);

    let Some(mut cursor) = conn.execute(sql, (), None).map_err(query_error)? else {
        // Statements without a result set
        return Ok(TabularResult::new());
    };

    let names: Vec<String> = cursor
        .column_names()
        .map_err(query_error)?
        .collect::<std::result::Result<_, _>>()
        .map_err(query_error)?;

    let mut types = Vec::with_capacity(names.len());
    for index in 1..=names.len() {
        let column = u16::try_from(index)
            .map_err(|_| ExtractError::query(LABEL, "too many columns"))?;
        types.push(cursor.col_data_type(column).map_err(query_error)?);
    }

    let columns: Vec<ColumnInfo> = names
        .iter()
        .zip(&types)
        .map(|(name, data_type)| ColumnInfo::new(name, format!("{data_type:?}")))
        .collect();

    let buffer =
        TextRowSet::for_cursor(BATCH_SIZE, &mut cursor, Some(MAX_TEXT_LEN)).map_err(query_error)?;
    let mut block = cursor.bind_buffer(buffer).map_err(query_error)?;

    let mut rows: Vec<Row> = Vec::new();
    while let Some(batch) = block
        .fetch_with_truncation_check(true)
        .map_err(|e| fetch_error(&names, e))?
    {
        for row_index in 0..batch.num_rows() {
            rows.push(
                types
                    .iter()
                    .enumerate()
                    .map(|(col, data_type)| {
                        convert_text(batch.at(col, row_index), data_type)
                    })
                    .collect(),
            );
        }
    }

    Ok(TabularResult::with_data(columns, rows))
}

fn fetch_error(names: &[String], error: odbc_api::Error) -> ExtractError {
    match error {
        odbc_api::Error::TooLargeValueForBuffer { buffer_index, .. } => {
            let name = names.get(buffer_index).map(String::as_str).unwrap_or("?");
            ExtractError::query(
                LABEL,
                format!("value in column '{name}' exceeds {MAX_TEXT_LEN} bytes"),
            )
        }
        other => ExtractError::query(LABEL, other),
    }
}

fn convert_text(raw: Option<&[u8]>, data_type: &DataType) -> Value {
    let Some(raw) = raw else {
        return Value::Null;
    };
    let text = String::from_utf8_lossy(raw).into_owned();

    match data_type {
        DataType::TinyInt | DataType::SmallInt | DataType::Integer | DataType::BigInt => text
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or(Value::String(text)),
        DataType::Real | DataType::Float { .. } | DataType::Double => text
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or(Value::String(text)),
        DataType::Bit => match text.as_str() {
            "1" | "true" => Value::Bool(true),
            "0" | "false" => Value::Bool(false),
            _ => Value::String(text),
        },
        DataType::Timestamp { .. } => NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
            .map(Value::Timestamp)
            .unwrap_or(Value::String(text)),
        _ => Value::String(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_carries_driver_and_schema() {
        let descriptor = SourceDescriptor::new("hive", "10.0.0.9", 10000, "etl", "pw", "sales");
        let conn_str = HiveConnector::new("Hive Driver").connection_string(&descriptor);
        assert!(conn_str.starts_with("Driver={Hive Driver};Host=10.0.0.9;Port=10000;Schema=sales;"));
    }

    #[test]
    fn test_oversized_value_names_column() {
        let names = vec!["id".to_string(), "payload".to_string()];
        let err = fetch_error(
            &names,
            odbc_api::Error::TooLargeValueForBuffer {
                indicator: Some(70_000),
                buffer_index: 1,
            },
        );

        match err {
            ExtractError::Query { source_type, message } => {
                assert_eq!(source_type, "hive");
                assert!(message.contains("'payload'"));
                assert!(message.contains("65536"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_convert_text_by_type() {
        assert_eq!(convert_text(None, &DataType::Integer), Value::Null);
        assert_eq!(convert_text(Some(b"42"), &DataType::BigInt), Value::Int(42));
        assert_eq!(convert_text(Some(b"0.5"), &DataType::Double), Value::Float(0.5));
        assert_eq!(convert_text(Some(b"true"), &DataType::Bit), Value::Bool(true));
        assert_eq!(
            convert_text(Some(b"abc"), &DataType::Varchar { length: None }),
            Value::String("abc".to_string())
        );
    }
}
