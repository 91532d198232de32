//! Cassandra wide-column sessions.
//!
//! Queries return an ordered list of records rather than a cursor; the query
//! layer folds those records into a table.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime};
use num_bigint::BigInt;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::value::{CqlValue, Row as CqlRow};
use tracing::{debug, info};

use crate::connection::{HostList, WideColumnConnector};
use crate::db::{BackendFamily, ConnectionHandle, Record, RecordSession, Value};
use crate::error::{ExtractError, Result};
use crate::files::json::to_json_value;

const LABEL: &str = "cassandra";

/// Day number of 1970-01-01 in the CQL `date` encoding.
const EPOCH_DAY: i64 = 1 << 31;

/// Connector for Cassandra clusters.
#[derive(Debug, Default, Clone, Copy)]
pub struct CassandraConnector;

#[async_trait]
impl WideColumnConnector for CassandraConnector {
    async fn connect(&self, hosts: &HostList, keyspace: Option<&str>) -> Result<ConnectionHandle> {
        let session = CassandraSession::connect(hosts, keyspace).await?;
        Ok(ConnectionHandle::wide_column(LABEL, Box::new(session)))
    }
}

/// A driver session against one cluster, optionally bound to a keyspace.
pub struct CassandraSession {
    session: Session,
}

impl CassandraSession {
    /// Contacts the given nodes and, if a keyspace is named, selects it.
    pub async fn connect(hosts: &HostList, keyspace: Option<&str>) -> Result<Self> {
        let nodes: Vec<String> = hosts.as_slice().iter().map(|h| with_port(h)).collect();
        info!("Connecting to cassandra nodes {:?}", nodes);

        let session = SessionBuilder::new()
            .known_nodes(&nodes)
            .build()
            .await
            .map_err(|e| ExtractError::connection(LABEL, e))?;

        if let Some(keyspace) = keyspace {
            debug!("Selecting keyspace {}", keyspace);
            session
                .use_keyspace(keyspace, false)
                .await
                .map_err(|e| ExtractError::connection(LABEL, e))?;
        }

        Ok(Self { session })
    }
}

#[async_trait]
impl RecordSession for CassandraSession {
    async fn fetch_records(&mut self, query: &str) -> Result<Vec<Record>> {
        let result = self
            .session
            .query_unpaged(query, ())
            .await
            .map_err(|e| ExtractError::query(LABEL, e))?;

        // Statements without a result set produce no records.
        if !result.is_rows() {
            return Ok(Vec::new());
        }

        let rows_result = result
            .into_rows_result()
            .map_err(|e| ExtractError::query(LABEL, e))?;
        let names: Vec<String> = rows_result
            .column_specs()
            .iter()
            .map(|column| column.name().to_string())
            .collect();

        let mut records = Vec::new();
        for row in rows_result
            .rows::<CqlRow>()
            .map_err(|e| ExtractError::query(LABEL, e))?
        {
            let row = row.map_err(|e| ExtractError::query(LABEL, e))?;
            records.push(
                names
                    .iter()
                    .cloned()
                    .zip(row.columns.into_iter().map(convert_value))
                    .collect(),
            );
        }
        debug!("Fetched {} records from {}", records.len(), LABEL);

        Ok(records)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        // The driver shuts its connections down on drop.
        drop(self.session);
        Ok(())
    }
}

fn with_port(host: &str) -> String {
    if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:{}", BackendFamily::Cassandra.default_port())
    }
}

fn convert_value(value: Option<CqlValue>) -> Value {
    let Some(value) = value else {
        return Value::Null;
    };

    match value {
        CqlValue::Boolean(v) => Value::Bool(v),
        CqlValue::TinyInt(v) => Value::Int(v as i64),
        CqlValue::SmallInt(v) => Value::Int(v as i64),
        CqlValue::Int(v) => Value::Int(v as i64),
        CqlValue::BigInt(v) => Value::Int(v),
        CqlValue::Counter(v) => Value::Int(v.0),
        CqlValue::Float(v) => Value::Float(v as f64),
        CqlValue::Double(v) => Value::Float(v),
        CqlValue::Ascii(v) | CqlValue::Text(v) => Value::String(v),
        CqlValue::Blob(v) => Value::Bytes(v),
        CqlValue::Uuid(v) => Value::String(v.to_string()),
        CqlValue::Timeuuid(v) => Value::String(v.to_string()),
        CqlValue::Inet(v) => Value::String(v.to_string()),
        CqlValue::Timestamp(v) => DateTime::from_timestamp_millis(v.0)
            .map(|t| Value::Timestamp(t.naive_utc()))
            .unwrap_or(Value::Null),
        CqlValue::Empty => Value::Null,
        CqlValue::Date(v) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(Duration::days(i64::from(v.0) - EPOCH_DAY)))
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        CqlValue::Time(v) => u32::try_from(v.0.div_euclid(1_000_000_000))
            .ok()
            .and_then(|secs| {
                let nanos = u32::try_from(v.0.rem_euclid(1_000_000_000)).ok()?;
                NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
            })
            .map(|t| Value::String(t.to_string()))
            .unwrap_or(Value::Null),
        CqlValue::Decimal(v) => Value::String(BigDecimal::from(v).to_string()),
        CqlValue::Varint(v) => {
            let n = BigInt::from(v);
            i64::try_from(&n)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::String(n.to_string()))
        }
        CqlValue::Duration(v) => {
            Value::String(format!("{}mo{}d{}ns", v.months, v.days, v.nanoseconds))
        }
        collection @ (CqlValue::List(_)
        | CqlValue::Set(_)
        | CqlValue::Map(_)
        | CqlValue::Tuple(_)
        | CqlValue::UserDefinedType { .. }) => Value::String(cql_json(collection).to_string()),
        other => Value::String(format!("{other:?}")),
    }
}

/// Collections as JSON; map keys that are not text use their JSON rendering.
fn cql_json(value: CqlValue) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        CqlValue::List(items) | CqlValue::Set(items) => {
            Json::Array(items.into_iter().map(cql_json).collect())
        }
        CqlValue::Tuple(items) => Json::Array(
            items
                .into_iter()
                .map(|item| item.map(cql_json).unwrap_or(Json::Null))
                .collect(),
        ),
        CqlValue::Map(entries) => Json::Object(
            entries
                .into_iter()
                .map(|(key, value)| {
                    let key = match cql_json(key) {
                        Json::String(s) => s,
                        other => other.to_string(),
                    };
                    (key, cql_json(value))
                })
                .collect(),
        ),
        CqlValue::UserDefinedType { fields, .. } => Json::Object(
            fields
                .into_iter()
                .map(|(name, value)| (name, value.map(cql_json).unwrap_or(Json::Null)))
                .collect(),
        ),
        scalar => to_json_value(&convert_value(Some(scalar))),
    }
}
