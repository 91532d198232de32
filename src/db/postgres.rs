//! PostgreSQL-protocol sessions (PostgreSQL, Redshift).
//!
//! Provides the `PostgresConnector` that opens one sqlx connection per
//! handle, and the `PostgresSession` that runs queries on it.

use crate::connection::{BackendConnector, SourceDescriptor};
use crate::db::sql::{decode, row_columns, statement_columns};
use crate::db::{
    BackendFamily, ConnectionHandle, CursorSession, Row, SourceType, TabularResult, Value,
};
use crate::error::{ExtractError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::postgres::types::{Oid, PgInterval, PgMoney};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::types::BigDecimal;
use sqlx::{Column as _, Connection, Executor, Row as _, TypeInfo as _};
use tracing::debug;

/// Connector for the PostgreSQL backend family.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresConnector;

#[async_trait]
impl BackendConnector for PostgresConnector {
    fn family(&self) -> BackendFamily {
        BackendFamily::Postgres
    }

    async fn connect(
        &self,
        source_type: SourceType,
        descriptor: &SourceDescriptor,
    ) -> Result<ConnectionHandle> {
        let session = PostgresSession::connect(source_type, descriptor).await?;
        Ok(ConnectionHandle::cursor(
            source_type.as_str(),
            BackendFamily::Postgres,
            Box::new(session),
        ))
    }
}

/// A single PostgreSQL connection.
#[derive(Debug)]
pub struct PostgresSession {
    label: &'static str,
    conn: PgConnection,
}

impl PostgresSession {
    /// Opens a connection. No retries are attempted.
    pub async fn connect(source_type: SourceType, descriptor: &SourceDescriptor) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&descriptor.host)
            .port(descriptor.port)
            .username(&descriptor.username)
            .password(&descriptor.password)
            .database(&descriptor.database);

        debug!("Opening postgres connection to {}", descriptor.display_string());
        let conn = PgConnection::connect_with(&options)
            .await
            .map_err(|e| map_connection_error(source_type, e, descriptor))?;

        Ok(Self {
            label: source_type.as_str(),
            conn,
        })
    }
}

#[async_trait]
impl CursorSession for PostgresSession {
    async fn fetch_all(&mut self, sql: &str) -> Result<TabularResult> {
        let result: Vec<PgRow> = sqlx::query(sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| ExtractError::query(self.label, format_query_error(e)))?;

        // An empty result still has a header; take it from the statement.
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

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow, label: &str) -> Result<Row> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name(), label))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str, label: &str) -> Result<Value> {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => decode(row, index, label, Value::Bool),
        "INT2" | "SMALLINT" => decode(row, index, label, |v: i16| Value::Int(v.into())),
        "INT4" | "INT" | "INTEGER" => decode(row, index, label, |v: i32| Value::Int(v.into())),
        "INT8" | "BIGINT" => decode(row, index, label, Value::Int),
        "OID" => decode(row, index, label, |v: Oid| Value::Int(v.0.into())),
        "FLOAT4" | "REAL" => decode(row, index, label, |v: f32| Value::Float(v.into())),
        "FLOAT8" | "DOUBLE PRECISION" => decode(row, index, label, Value::Float),
        "NUMERIC" => decode(row, index, label, |v: BigDecimal| Value::String(v.to_string())),
        "MONEY" => decode(row, index, label, |v: PgMoney| Value::String(format_money(v))),
        "TIMESTAMP" => decode(row, index, label, Value::Timestamp),
        "TIMESTAMPTZ" => decode(row, index, label, |v: DateTime<Utc>| {
            Value::Timestamp(v.naive_utc())
        }),
        "DATE" => decode(row, index, label, |v: NaiveDate| Value::String(v.to_string())),
        "TIME" => decode(row, index, label, |v: NaiveTime| Value::String(v.to_string())),
        "INTERVAL" => decode(row, index, label, |v: PgInterval| {
            Value::String(format_interval(&v))
        }),
        "JSON" | "JSONB" => decode(row, index, label, |v: serde_json::Value| {
            Value::String(v.to_string())
        }),
        "UUID" => decode(row, index, label, |v: sqlx::types::Uuid| Value::String(v.to_string())),
        "BYTEA" => decode(row, index, label, Value::Bytes),

        // Arrays are rendered as JSON text
        "TEXT[]" | "VARCHAR[]" => decode(row, index, label, array_text::<String>),
        "INT2[]" => decode(row, index, label, array_text::<i16>),
        "INT4[]" => decode(row, index, label, array_text::<i32>),
        "INT8[]" => decode(row, index, label, array_text::<i64>),
        "FLOAT8[]" => decode(row, index, label, array_text::<f64>),
        "BOOL[]" => decode(row, index, label, array_text::<bool>),

        // Character types, plus anything else that decodes as text
        _ => decode(row, index, label, Value::String).map_err(|_| {
            let name = row.columns()[index].name();
            ExtractError::query(
                label,
                format!("column '{name}' has unsupported type {type_name}; cast it to text in the query"),
            )
        }),
    }
}

fn array_text<T: serde::Serialize>(values: Vec<Option<T>>) -> Value {
    Value::String(serde_json::to_string(&values).unwrap_or_default())
}

/// Renders an interval the way PostgreSQL prints it by default.
fn format_interval(interval: &PgInterval) -> String {
    let sign = if interval.microseconds < 0 { "-" } else { "" };
    let micros = interval.microseconds.unsigned_abs();
    let secs = micros / 1_000_000;
    let mut text = format!(
        "{} mons {} days {sign}{:02}:{:02}:{:02}",
        interval.months,
        interval.days,
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    );
    if micros % 1_000_000 != 0 {
        text.push_str(&format!(".{:06}", micros % 1_000_000));
    }
    text
}

/// Money is stored in cents.
fn format_money(money: PgMoney) -> String {
    let sign = if money.0 < 0 { "-" } else { "" };
    let cents = money.0.unsigned_abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}

/// Maps sqlx connection errors to a stage-labelled error, adding a hint for
/// the common cases while keeping the driver's own diagnostic.
fn map_connection_error(
    source_type: SourceType,
    error: sqlx::Error,
    descriptor: &SourceDescriptor,
) -> ExtractError {
    let host = &descriptor.host;
    let port = descriptor.port;
    let error_str = error.to_string();
    let lower = error_str.to_lowercase();

    let hint = if lower.contains("connection refused") {
        format!("cannot reach {host}:{port}; check that the server is running")
    } else if lower.contains("password authentication failed") {
        format!(
            "authentication failed for user '{}'",
            descriptor.username
        )
    } else if lower.contains("does not exist") && lower.contains("database") {
        format!("database '{}' does not exist", descriptor.database)
    } else {
        return ExtractError::connection(source_type.as_str(), error_str);
    };

    ExtractError::connection(source_type.as_str(), format!("{hint} ({error_str})"))
}

/// Formats a query error with PostgreSQL detail and hint fields if available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }

        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }

        if let Some(table) = pg_error.table() {
            result.push_str("\n  TABLE: ");
            result.push_str(table);
        }

        if let Some(column) = pg_error.column() {
            result.push_str("\n  COLUMN: ");
            result.push_str(column);
        }
    }

    result
}
