//! Database abstraction layer.
//!
//! Every backend is reached through one of two session traits: cursor-style
//! sessions that run SQL and hand back a fully materialized result set, and
//! wide-column sessions that hand back an ordered list of records. A
//! [`ConnectionHandle`] carries the session together with its capability tag
//! so the query layer can dispatch without knowing which driver produced it.

mod cassandra;
#[cfg(feature = "hive")]
mod hive;
#[cfg(not(feature = "hive"))]
#[path = "hive_disabled.rs"]
mod hive;
pub mod mock;
mod mssql;
mod mysql;
mod oracle;
mod postgres;
pub(crate) mod sql;
mod types;

pub use cassandra::{CassandraConnector, CassandraSession};
pub use hive::HiveConnector;
pub use mssql::{MssqlConnector, MssqlSession};
pub use mysql::{MySqlConnector, MySqlSession};
pub use oracle::{oracle_connect_string, OracleConnectString, OracleConnector, OracleSession};
pub use postgres::{PostgresConnector, PostgresSession};
pub use types::{ColumnInfo, Row, TabularResult, Value, TIMESTAMP_FORMAT};

use crate::error::{ExtractError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single wide-column record: field names paired with values, in the
/// order the driver returned them.
pub type Record = Vec<(String, Value)>;

/// Logical source types accepted by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Mysql,
    Mariadb,
    Rds,
    Postgresql,
    Redshift,
    Mssql,
    Oracle,
    Hive,
}

impl SourceType {
    /// Every supported source type, in documentation order.
    pub const ALL: [SourceType; 8] = [
        Self::Mysql,
        Self::Mariadb,
        Self::Rds,
        Self::Postgresql,
        Self::Redshift,
        Self::Mssql,
        Self::Oracle,
        Self::Hive,
    ];

    /// Returns the canonical lower-case tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Mariadb => "mariadb",
            Self::Rds => "rds",
            Self::Postgresql => "postgresql",
            Self::Redshift => "redshift",
            Self::Mssql => "mssql",
            Self::Oracle => "oracle",
            Self::Hive => "hive",
        }
    }

    /// Parses a tag case-insensitively.
    ///
    /// Unknown tags fail with [`ExtractError::UnsupportedSourceType`] naming
    /// the tag exactly as given.
    pub fn from_tag(tag: &str) -> Result<Self> {
        let normalized = tag.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ExtractError::unsupported(tag))
    }

    /// Returns the backend family whose protocol this source speaks.
    pub fn family(&self) -> BackendFamily {
        match self {
            Self::Mysql | Self::Mariadb | Self::Rds => BackendFamily::MySql,
            Self::Postgresql | Self::Redshift => BackendFamily::Postgres,
            Self::Mssql => BackendFamily::Mssql,
            Self::Oracle => BackendFamily::Oracle,
            Self::Hive => BackendFamily::Hive,
        }
    }

    /// Returns the default port for this source type.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Redshift => 5439,
            _ => self.family().default_port(),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A class of data sources sharing one connection and query protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendFamily {
    MySql,
    Postgres,
    Mssql,
    Oracle,
    Hive,
    Cassandra,
}

impl BackendFamily {
    /// Returns the family name for logs and error labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
            Self::Mssql => "mssql",
            Self::Oracle => "oracle",
            Self::Hive => "hive",
            Self::Cassandra => "cassandra",
        }
    }

    /// Returns the default port for this family.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::Postgres => 5432,
            Self::Mssql => 1433,
            Self::Oracle => 1521,
            Self::Hive => 10000,
            Self::Cassandra => 9042,
        }
    }

    /// Returns how handles of this family are queried.
    pub fn capability(&self) -> HandleCapability {
        match self {
            Self::Cassandra => HandleCapability::WideColumn,
            _ => HandleCapability::Cursor,
        }
    }
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which normalization path a handle requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleCapability {
    /// Execute-and-fetch over a SQL cursor.
    Cursor,
    /// Execute returning an iterator of records.
    WideColumn,
}

/// A session that executes SQL and materializes the whole result set.
#[async_trait]
pub trait CursorSession: Send {
    /// Runs the query and returns every row, with column names and types
    /// exactly as the result set reports them.
    async fn fetch_all(&mut self, sql: &str) -> Result<TabularResult>;

    /// Closes the underlying connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A session that executes a query and returns an ordered list of records.
#[async_trait]
pub trait RecordSession: Send {
    /// Runs the query and collects every returned record.
    async fn fetch_records(&mut self, query: &str) -> Result<Vec<Record>>;

    /// Closes the underlying session.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// The backend session held by a handle, tagged by capability.
pub enum Session {
    Cursor(Box<dyn CursorSession>),
    WideColumn(Box<dyn RecordSession>),
}

/// An open connection ready for query execution.
///
/// The handle is owned by the caller, who must release it with
/// [`ConnectionHandle::close`]. Executing a query needs `&mut self`, so a
/// handle cannot be used by two callers at once.
pub struct ConnectionHandle {
    label: String,
    family: BackendFamily,
    session: Session,
}

impl ConnectionHandle {
    /// Wraps a cursor-style session.
    pub fn cursor(
        label: impl Into<String>,
        family: BackendFamily,
        session: Box<dyn CursorSession>,
    ) -> Self {
        Self {
            label: label.into(),
            family,
            session: Session::Cursor(session),
        }
    }

    /// Wraps a wide-column session.
    pub fn wide_column(label: impl Into<String>, session: Box<dyn RecordSession>) -> Self {
        Self {
            label: label.into(),
            family: BackendFamily::Cassandra,
            session: Session::WideColumn(session),
        }
    }

    /// The source label used in logs and errors (e.g. `redshift`).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The backend family that produced this handle.
    pub fn family(&self) -> BackendFamily {
        self.family
    }

    /// The capability tag the query layer dispatches on.
    pub fn capability(&self) -> HandleCapability {
        match self.session {
            Session::Cursor(_) => HandleCapability::Cursor,
            Session::WideColumn(_) => HandleCapability::WideColumn,
        }
    }

    pub(crate) fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Releases the connection.
    pub async fn close(self) -> Result<()> {
        match self.session {
            Session::Cursor(session) => session.close().await,
            Session::WideColumn(session) => session.close().await,
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("label", &self.label)
            .field("family", &self.family)
            .field("capability", &self.capability())
            .finish_non_exhaustive()
    }
}
