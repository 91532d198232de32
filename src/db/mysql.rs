//! MySQL-protocol sessions (MySQL, MariaDB, RDS).

use crate::connection::{BackendConnector, SourceDescriptor};
use crate::db::sql::{decode, decode_error, row_columns, statement_columns};
use crate::db::{
    BackendFamily, ConnectionHandle, CursorSession, Row, SourceType, TabularResult, Value,
};
use crate::error::{ExtractError, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::types::BigDecimal;
use sqlx::{Column as _, Connection, Executor, Row as _, TypeInfo as _};
use tracing::debug;

/// Connector for the MySQL backend family.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlConnector;

#[async_trait]
impl BackendConnector for MySqlConnector {
    fn family(&self) -> BackendFamily {
        BackendFamily::MySql
    }

    async fn connect(
        &self,
        source_type: SourceType,
        descriptor: &SourceDescriptor,
    ) -> Result<ConnectionHandle> {
        let session = MySqlSession::connect(source_type, descriptor).await?;
        Ok(ConnectionHandle::cursor(
            source_type.as_str(),
            BackendFamily::MySql,
            Box::new(session),
        ))
    }
}

/// A single MySQL-protocol connection.
pub struct MySqlSession {
    label: &'static str,
    conn: MySqlConnection,
}

impl MySqlSession {
    /// Opens a connection. No retries are attempted.
    pub async fn connect(source_type: SourceType, descriptor: &SourceDescriptor) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&descriptor.host)
            .port(descriptor.port)
            .username(&descriptor.username)
            .password(&descriptor.password)
            .database(&descriptor.database);

        debug!("Opening mysql connection to {}", descriptor.display_string());
        let conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(|e| ExtractError::connection(source_type.as_str(), e))?;

        Ok(Self {
            label: source_type.as_str(),
            conn,
        })
    }
}

#[async_trait]
impl CursorSession for MySqlSession {
    async fn fetch_all(&mut self, sql: &str) -> Result<TabularResult> {
        let result: Vec<MySqlRow> = sqlx::query(sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| ExtractError::query(self.label, format_query_error(e)))?;

        let columns = match result.first() {
            Some(first_row) => row_columns(first_row),
            None => {
                let statement = (&mut self.conn)
                    .prepare(sql)
                    .await
                    .map_err(|e| ExtractError::query(self.label, format_query_error(e)))?;
                statement_columns(&statement)
            }
        };

        let rows = result
            .iter()
            .map(|row| convert_row(row, self.label))
            .collect::<Result<Vec<Row>>>()?;
        debug!("Fetched {} rows from {}", rows.len(), self.label);

        Ok(TabularResult::with_data(columns, rows))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let Self { label, conn } = *self;
        conn.close()
            .await
            .map_err(|e| ExtractError::internal(format!("closing {label} connection: {e}")))
    }
}

fn convert_row(row: &MySqlRow, label: &str) -> Result<Row> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name(), label))
        .collect()
}

fn convert_value(row: &MySqlRow, index: usize, type_name: &str, label: &str) -> Result<Value> {
    let upper = type_name.to_uppercase();

    if upper.ends_with("UNSIGNED") {
        return decode(row, index, label, |v: u64| match i64::try_from(v) {
            Ok(v) => Value::Int(v),
            Err(_) => Value::String(v.to_string()),
        });
    }

    match upper.as_str() {
        "BOOLEAN" => decode(row, index, label, Value::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            decode(row, index, label, Value::Int)
        }
        "YEAR" => decode(row, index, label, |v: u16| Value::Int(v.into())),
        "FLOAT" => decode(row, index, label, |v: f32| Value::Float(v.into())),
        "DOUBLE" => decode(row, index, label, Value::Float),
        "DECIMAL" => decode(row, index, label, |v: BigDecimal| Value::String(v.to_string())),
        "DATETIME" | "TIMESTAMP" => decode(row, index, label, Value::Timestamp),
        "DATE" => decode(row, index, label, |v: NaiveDate| Value::String(v.to_string())),
        "TIME" => decode(row, index, label, |v: NaiveTime| Value::String(v.to_string())),
        "JSON" => decode(row, index, label, |v: serde_json::Value| {
            Value::String(v.to_string())
        }),
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
            decode(row, index, label, Value::Bytes)
        }

        // Text types, plus anything else the server sends as a string
        _ => match row
            .try_get::<Option<String>, _>(index)
            .or_else(|_| row.try_get_unchecked::<Option<String>, _>(index))
        {
            Ok(value) => Ok(value.map(Value::String).unwrap_or(Value::Null)),
            Err(e) => Err(decode_error(row, index, label, e)),
        },
    }
}

fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => match db_error.code() {
            Some(code) => format!("ERROR {code}: {}", db_error.message()),
            None => format!("ERROR: {}", db_error.message()),
        },
        None => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::execute;

    // Requires a running MySQL or MariaDB server; skipped unless
    // ETL_TEST_MYSQL_URL is set.

    async fn get_test_handle() -> Option<ConnectionHandle> {
        let url = std::env::var("ETL_TEST_MYSQL_URL").ok()?;
        let descriptor = SourceDescriptor::from_url(&url).ok()?;
        MySqlConnector
            .connect(SourceType::Mysql, &descriptor)
            .await
            .ok()
    }

    #[tokio::test]
    async fn test_execute_select_literal() {
        let Some(mut handle) = get_test_handle().await else {
            eprintln!("Skipping test: ETL_TEST_MYSQL_URL not set");
            return;
        };

        let table = execute(&mut handle, "SELECT 1 AS x").await.unwrap();
        assert_eq!(table.column_names(), vec!["x"]);
        assert_eq!(table.rows, vec![vec![Value::Int(1)]]);

        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_malformed_sql() {
        let Some(mut handle) = get_test_handle().await else {
            eprintln!("Skipping test: ETL_TEST_MYSQL_URL not set");
            return;
        };

        let err = execute(&mut handle, "SELEC 1").await.unwrap_err();
        assert!(matches!(err, ExtractError::Query { ref source_type, .. } if source_type == "mysql"));

        handle.close().await.unwrap();
    }
}
