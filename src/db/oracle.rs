//! Oracle sessions over OCI.
//!
//! The driver takes a single combined connect string rather than discrete
//! fields. The driver is blocking, so every call runs on tokio's blocking
//! pool and is awaited immediately.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use oracle::sql_type::OracleType;
use oracle::{Connection, SqlValue};
use tracing::debug;

use crate::connection::{BackendConnector, SourceDescriptor};
use crate::db::{
    BackendFamily, ColumnInfo, ConnectionHandle, CursorSession, Row, SourceType, TabularResult,
    Value,
};
use crate::error::{ExtractError, Result};

const LABEL: &str = "oracle";

/// Builds the combined Oracle connect string `username/password@host:port/database`.
pub fn oracle_connect_string(
    username: &str,
    password: &str,
    host: &str,
    port: u16,
    database: &str,
) -> String {
    format!("{username}/{password}@{host}:{port}/{database}")
}

/// A combined connect string split back into what the driver expects.
#[derive(Clone, PartialEq, Eq)]
pub struct OracleConnectString {
    pub username: String,
    pub password: String,
    /// Easy Connect descriptor, `host:port/database`.
    pub dsn: String,
}

impl OracleConnectString {
    /// Builds the connect string for a descriptor.
    pub fn from_descriptor(descriptor: &SourceDescriptor) -> Result<Self> {
        Self::parse(&oracle_connect_string(
            &descriptor.username,
            &descriptor.password,
            &descriptor.host,
            descriptor.port,
            &descriptor.database,
        ))
    }

    /// Splits `username/password@dsn`. The username ends at the first `/`
    /// and the password at the last `@`, so passwords may contain either.
    pub fn parse(combined: &str) -> Result<Self> {
        let (username, rest) = combined.split_once('/').ok_or_else(|| {
            ExtractError::invalid_argument("oracle connect string is missing '/'")
        })?;
        let (password, dsn) = rest.rsplit_once('@').ok_or_else(|| {
            ExtractError::invalid_argument("oracle connect string is missing '@'")
        })?;

        if dsn.is_empty() {
            return Err(ExtractError::invalid_argument(
                "oracle connect string has no host",
            ));
        }

        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
            dsn: dsn.to_string(),
        })
    }
}

impl fmt::Display for OracleConnectString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/***@{}", self.username, self.dsn)
    }
}

impl fmt::Debug for OracleConnectString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConnectString")
            .field("username", &self.username)
            .field("password", &"***")
            .field("dsn", &self.dsn)
            .finish()
    }
}

/// Connector for Oracle.
#[derive(Debug, Default, Clone, Copy)]
pub struct OracleConnector;

#[async_trait]
impl BackendConnector for OracleConnector {
    fn family(&self) -> BackendFamily {
        BackendFamily::Oracle
    }

    async fn connect(
        &self,
        source_type: SourceType,
        descriptor: &SourceDescriptor,
    ) -> Result<ConnectionHandle> {
        let connect_string = OracleConnectString::from_descriptor(descriptor)?;
        let session = OracleSession::connect(connect_string).await?;
        Ok(ConnectionHandle::cursor(
            source_type.as_str(),
            BackendFamily::Oracle,
            Box::new(session),
        ))
    }
}

/// A single Oracle connection.
pub struct OracleSession {
    conn: Arc<Mutex<Connection>>,
}

impl OracleSession {
    /// Opens a connection on the blocking pool.
    pub async fn connect(connect_string: OracleConnectString) -> Result<Self> {
        debug!("Opening oracle connection to {}", connect_string);
        let conn = tokio::task::spawn_blocking(move || {
            Connection::connect(
                &connect_string.username,
                &connect_string.password,
                &connect_string.dsn,
            )
        })
        .await
        .map_err(|e| ExtractError::internal(format!("oracle connect task failed: {e}")))?
        .map_err(|e| ExtractError::connection(LABEL, e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl CursorSession for OracleSession {
    async fn fetch_all(&mut self, sql: &str) -> Result<TabularResult> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();

        let table = tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| ExtractError::internal("oracle connection lock poisoned"))?;
            run_query(&conn, &sql)
        })
        .await
        .map_err(|e| ExtractError::internal(format!("oracle query task failed: {e}")))??;

        debug!("Fetched {} rows from {}", table.row_count(), LABEL);
        Ok(table)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let conn = self.conn;
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| ExtractError::internal("oracle connection lock poisoned"))?;
            conn.close()
                .map_err(|e| ExtractError::internal(format!("closing oracle connection: {e}")))
        })
        .await
        .map_err(|e| ExtractError::internal(format!("oracle close task failed: {e}")))?
    }
}

fn run_query(conn: &Connection, sql: &str) -> Result<TabularResult> {
    let result_set = conn
        .query(sql, &[])
        .map_err(|e| ExtractError::query(LABEL, e))?;

    let columns: Vec<ColumnInfo> = result_set
        .column_info()
        .iter()
        .map(|c| ColumnInfo::new(c.name(), c.oracle_type().to_string()))
        .collect();
    let types: Vec<OracleType> = result_set
        .column_info()
        .iter()
        .map(|c| c.oracle_type().clone())
        .collect();

    let mut rows: Vec<Row> = Vec::new();
    for row in result_set {
        let row = row.map_err(|e| ExtractError::query(LABEL, e))?;
        rows.push(
            row.sql_values()
                .iter()
                .zip(&types)
                .map(|(value, oracle_type)| convert_value(value, oracle_type))
                .collect::<Result<Row>>()?,
        );
    }

    Ok(TabularResult::with_data(columns, rows))
}

/// How values of a column are read from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Integer,
    Unsigned,
    /// NUMBER and FLOAT, read as text and narrowed by [`number_value`].
    Number,
    Float,
    Boolean,
    Timestamp,
    TimestampTz,
    Bytes,
    Text,
}

fn value_kind(oracle_type: &OracleType) -> ValueKind {
    match oracle_type {
        OracleType::Int64 => ValueKind::Integer,
        OracleType::UInt64 => ValueKind::Unsigned,
        // Unconstrained NUMBER reports scale -127 and may hold fractions
        OracleType::Number(..) | OracleType::Float(_) => ValueKind::Number,
        OracleType::BinaryFloat | OracleType::BinaryDouble => ValueKind::Float,
        OracleType::Boolean => ValueKind::Boolean,
        OracleType::Date | OracleType::Timestamp(_) => ValueKind::Timestamp,
        OracleType::TimestampTZ(_) | OracleType::TimestampLTZ(_) => ValueKind::TimestampTz,
        OracleType::Raw(_) | OracleType::LongRaw | OracleType::BLOB => ValueKind::Bytes,
        _ => ValueKind::Text,
    }
}

/// Integer when exact, float when at most 15 significant digits, else text.
fn number_value(text: String) -> Value {
    if let Ok(v) = text.parse::<i64>() {
        return Value::Int(v);
    }

    let significant = text
        .trim_start_matches(['-', '0', '.'])
        .chars()
        .filter(char::is_ascii_digit)
        .count();
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() && significant <= 15 => Value::Float(v),
        _ => Value::String(text),
    }
}

fn convert_value(value: &SqlValue, oracle_type: &OracleType) -> Result<Value> {
    let conversion_error =
        |e: oracle::Error| ExtractError::query(LABEL, format!("cannot read {oracle_type} value: {e}"));

    if value.is_null().map_err(conversion_error)? {
        return Ok(Value::Null);
    }

    let converted = match value_kind(oracle_type) {
        ValueKind::Integer => value.get::<i64>().map(Value::Int),
        ValueKind::Unsigned => value.get::<u64>().map(|v| {
            i64::try_from(v)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::String(v.to_string()))
        }),
        ValueKind::Number => value.get::<String>().map(number_value),
        ValueKind::Float => value.get::<f64>().map(Value::Float),
        ValueKind::Boolean => value.get::<bool>().map(Value::Bool),
        ValueKind::Timestamp => value.get::<NaiveDateTime>().map(Value::Timestamp),
        ValueKind::TimestampTz => value
            .get::<DateTime<FixedOffset>>()
            .map(|v| Value::Timestamp(v.naive_utc())),
        ValueKind::Bytes => value.get::<Vec<u8>>().map(Value::Bytes),
        ValueKind::Text => value.get::<String>().map(Value::String),
    };
    converted.map_err(conversion_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_connect_string_literal() {
        assert_eq!(
            oracle_connect_string("user", "pass", "10.0.0.1", 1521, "orcl"),
            "user/pass@10.0.0.1:1521/orcl"
        );
    }

    #[test]
    fn test_connect_string_from_descriptor() {
        let descriptor = SourceDescriptor::new("oracle", "10.0.0.1", 1521, "user", "pass", "orcl");
        let parsed = OracleConnectString::from_descriptor(&descriptor).unwrap();
        assert_eq!(parsed.username, "user");
        assert_eq!(parsed.password, "pass");
        assert_eq!(parsed.dsn, "10.0.0.1:1521/orcl");
    }

    #[test]
    fn test_connect_string_password_with_separators() {
        let combined = oracle_connect_string("scott", "t/ig@er", "db.internal", 1522, "svc");
        assert_eq!(combined, "scott/t/ig@er@db.internal:1522/svc");

        let parsed = OracleConnectString::parse(&combined).unwrap();
        assert_eq!(parsed.username, "scott");
        assert_eq!(parsed.password, "t/ig@er");
        assert_eq!(parsed.dsn, "db.internal:1522/svc");
    }

    #[test]
    fn test_connect_string_display_hides_password() {
        let parsed = OracleConnectString::parse("user/secret@h:1521/orcl").unwrap();
        assert_eq!(parsed.to_string(), "user/***@h:1521/orcl");
        assert!(!format!("{parsed:?}").contains("secret"));
    }

    #[test]
    fn test_number_columns_read_as_numbers() {
        // SELECT 1 AS x FROM dual reports an unconstrained NUMBER
        assert_eq!(value_kind(&OracleType::Number(0, -127)), ValueKind::Number);
        assert_eq!(value_kind(&OracleType::Number(10, 0)), ValueKind::Number);
        assert_eq!(value_kind(&OracleType::Number(10, 2)), ValueKind::Number);
        assert_eq!(value_kind(&OracleType::Int64), ValueKind::Integer);
        assert_eq!(value_kind(&OracleType::Varchar2(20)), ValueKind::Text);

        assert_eq!(number_value("1".to_string()), Value::Int(1));
        assert_eq!(number_value("-42".to_string()), Value::Int(-42));
        assert_eq!(number_value("12.5".to_string()), Value::Float(12.5));
        assert_eq!(number_value(".25".to_string()), Value::Float(0.25));
        assert_eq!(
            number_value("123456789012345678901234.5".to_string()),
            Value::String("123456789012345678901234.5".to_string())
        );
    }

    #[test]
    fn test_connect_string_rejects_malformed() {
        assert!(matches!(
            OracleConnectString::parse("no-separators"),
            Err(ExtractError::InvalidArgument(_))
        ));
        assert!(matches!(
            OracleConnectString::parse("user/pass@"),
            Err(ExtractError::InvalidArgument(_))
        ));
    }
}
