//! Microsoft SQL Server sessions over TDS.

use crate::connection::{BackendConnector, SourceDescriptor};
use crate::db::{
    BackendFamily, ColumnInfo, ConnectionHandle, CursorSession, Row, SourceType, TabularResult,
    Value,
};
use crate::error::{ExtractError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

/// Connector for SQL Server.
#[derive(Debug, Default, Clone, Copy)]
pub struct MssqlConnector;

#[async_trait]
impl BackendConnector for MssqlConnector {
    fn family(&self) -> BackendFamily {
        BackendFamily::Mssql
    }

    async fn connect(
        &self,
        source_type: SourceType,
        descriptor: &SourceDescriptor,
    ) -> Result<ConnectionHandle> {
        let session = MssqlSession::connect(descriptor).await?;
        Ok(ConnectionHandle::cursor(
            source_type.as_str(),
            BackendFamily::Mssql,
            Box::new(session),
        ))
    }
}

/// A single SQL Server connection.
#[derive(Debug)]
pub struct MssqlSession {
    client: Client<Compat<TcpStream>>,
}

impl MssqlSession {
    /// Opens a TCP connection and performs the TDS login.
    pub async fn connect(descriptor: &SourceDescriptor) -> Result<Self> {
        let label = SourceType::Mssql.as_str();

        let mut config = Config::new();
        config.host(&descriptor.host);
        config.port(descriptor.port);
        config.database(&descriptor.database);
        config.authentication(AuthMethod::sql_server(
            &descriptor.username,
            &descriptor.password,
        ));
        config.trust_cert();

        debug!("Opening mssql connection to {}", descriptor.display_string());
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| ExtractError::connection(label, e))?;
        tcp.set_nodelay(true)
            .map_err(|e| ExtractError::connection(label, e))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| ExtractError::connection(label, e))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl CursorSession for MssqlSession {
    async fn fetch_all(&mut self, sql: &str) -> Result<TabularResult> {
        let label = SourceType::Mssql.as_str();

        let mut stream = self
            .client
            .simple_query(sql)
            .await
            .map_err(|e| ExtractError::query(label, e))?;

        let columns: Vec<ColumnInfo> = stream
            .columns()
            .await
            .map_err(|e| ExtractError::query(label, e))?
            .map(|cols| {
                cols.iter()
                    .map(|c| ColumnInfo::new(c.name(), format!("{:?}", c.column_type())))
                    .collect()
            })
            .unwrap_or_default();

        let rows: Vec<Row> = stream
            .into_first_result()
            .await
            .map_err(|e| ExtractError::query(label, e))?
            .into_iter()
            .map(|row| row.into_iter().map(convert_value).collect())
            .collect();
        debug!("Fetched {} rows from {}", rows.len(), label);

        Ok(TabularResult::with_data(columns, rows))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.client
            .close()
            .await
            .map_err(|e| ExtractError::internal(format!("closing mssql connection: {e}")))
    }
}

fn convert_value(data: ColumnData<'static>) -> Value {
    match data {
        ColumnData::Bit(v) => v.into(),
        ColumnData::U8(v) => v.map(|v| Value::Int(v as i64)).unwrap_or(Value::Null),
        ColumnData::I16(v) => v.map(|v| Value::Int(v as i64)).unwrap_or(Value::Null),
        ColumnData::I32(v) => v.map(|v| Value::Int(v as i64)).unwrap_or(Value::Null),
        ColumnData::I64(v) => v.into(),
        ColumnData::F32(v) => v.map(|v| Value::Float(v as f64)).unwrap_or(Value::Null),
        ColumnData::F64(v) => v.into(),
        ColumnData::String(v) => v
            .map(|s| Value::String(s.into_owned()))
            .unwrap_or(Value::Null),
        ColumnData::Guid(v) => v
            .map(|g| Value::String(g.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Binary(v) => v
            .map(|b| Value::Bytes(b.into_owned()))
            .unwrap_or(Value::Null),
        ColumnData::Numeric(v) => v
            .map(|n| Value::String(n.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Xml(v) => v
            .map(|x| Value::String(x.into_owned().into_string()))
            .unwrap_or(Value::Null),
        temporal => convert_temporal(&temporal),
    }
}

/// Date and time columns go through tiberius' chrono conversions.
fn convert_temporal(data: &ColumnData<'static>) -> Value {
    if let Ok(v) = NaiveDateTime::from_sql(data) {
        return v.into();
    }
    if let Ok(v) = DateTime::<Utc>::from_sql(data) {
        return v.map(|v| Value::Timestamp(v.naive_utc())).unwrap_or(Value::Null);
    }
    if let Ok(v) = NaiveDate::from_sql(data) {
        return v.map(|v| Value::String(v.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = NaiveTime::from_sql(data) {
        return v.map(|v| Value::String(v.to_string())).unwrap_or(Value::Null);
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_convert_scalar_values() {
        assert_eq!(convert_value(ColumnData::I32(Some(7))), Value::Int(7));
        assert_eq!(convert_value(ColumnData::Bit(Some(true))), Value::Bool(true));
        assert_eq!(convert_value(ColumnData::F64(Some(1.5))), Value::Float(1.5));
        assert_eq!(
            convert_value(ColumnData::String(Some(Cow::Borrowed("abc")))),
            Value::String("abc".to_string())
        );
        assert_eq!(convert_value(ColumnData::I64(None)), Value::Null);
        assert_eq!(convert_value(ColumnData::String(None)), Value::Null);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let descriptor = SourceDescriptor::new("mssql", "127.0.0.1", 1, "sa", "pw", "master");
        let err = MssqlSession::connect(&descriptor).await.unwrap_err();
        assert!(matches!(err, ExtractError::Connection { ref source_type, .. } if source_type == "mssql"));
    }
}
