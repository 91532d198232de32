//! Source type dispatch.
//!
//! The resolver owns one connector per backend family. Building the table
//! only stores constructors; a connection is attempted solely by the
//! connector selected for the descriptor's source type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{HostList, SourceDescriptor};
use crate::db::{
    BackendFamily, CassandraConnector, ConnectionHandle, HiveConnector, MssqlConnector,
    MySqlConnector, OracleConnector, PostgresConnector, SourceType,
};
use crate::error::{ExtractError, Result};

/// Opens connections for one backend family.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// The family this connector serves.
    fn family(&self) -> BackendFamily;

    /// Performs a single live connection attempt.
    async fn connect(
        &self,
        source_type: SourceType,
        descriptor: &SourceDescriptor,
    ) -> Result<ConnectionHandle>;
}

/// Opens wide-column sessions from a list of contact points.
#[async_trait]
pub trait WideColumnConnector: Send + Sync {
    /// Connects to the cluster and selects `keyspace` when given.
    async fn connect(&self, hosts: &HostList, keyspace: Option<&str>) -> Result<ConnectionHandle>;
}

/// Driver-level settings the default connectors need.
#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    /// ODBC driver name used for Hive connections.
    pub hive_odbc_driver: String,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            hive_odbc_driver: HiveConnector::DEFAULT_DRIVER.to_string(),
        }
    }
}

/// Resolves source descriptors into open connection handles.
pub struct ConnectionResolver {
    connectors: HashMap<BackendFamily, Arc<dyn BackendConnector>>,
    wide_column: Arc<dyn WideColumnConnector>,
}

impl ConnectionResolver {
    /// Creates a resolver with the driver-backed connector for every family.
    pub fn new(settings: &ConnectorSettings) -> Self {
        Self::with_wide_column(Arc::new(CassandraConnector))
            .with_connector(Arc::new(MySqlConnector))
            .with_connector(Arc::new(PostgresConnector))
            .with_connector(Arc::new(MssqlConnector))
            .with_connector(Arc::new(OracleConnector))
            .with_connector(Arc::new(HiveConnector::new(&settings.hive_odbc_driver)))
    }

    /// Creates a resolver with no relational connectors registered.
    pub fn with_wide_column(wide_column: Arc<dyn WideColumnConnector>) -> Self {
        Self {
            connectors: HashMap::new(),
            wide_column,
        }
    }

    /// Registers (or replaces) the connector for its family.
    pub fn with_connector(mut self, connector: Arc<dyn BackendConnector>) -> Self {
        self.connectors.insert(connector.family(), connector);
        self
    }

    /// Validates the descriptor's source type and connects through the
    /// matching family's connector.
    ///
    /// Unknown tags fail with [`ExtractError::UnsupportedSourceType`] before
    /// any connector is invoked.
    pub async fn resolve(&self, descriptor: &SourceDescriptor) -> Result<ConnectionHandle> {
        let source_type = SourceType::from_tag(&descriptor.type_tag)?;
        let family = source_type.family();
        debug!("Resolved source type {} to {} connector", source_type, family);

        let connector = self.connectors.get(&family).ok_or_else(|| {
            ExtractError::internal(format!("no connector registered for {family}"))
        })?;

        let handle = connector.connect(source_type, descriptor).await?;
        info!("Connected to {}", descriptor.display_string());
        Ok(handle)
    }

    /// Opens a wide-column session.
    ///
    /// `hosts` must convert into a [`HostList`]; anything that is not a
    /// non-empty list of addresses fails with
    /// [`ExtractError::InvalidArgument`] and no connection is attempted.
    pub async fn resolve_wide_column<H>(
        &self,
        hosts: H,
        keyspace: Option<&str>,
    ) -> Result<ConnectionHandle>
    where
        H: TryInto<HostList, Error = ExtractError>,
    {
        let hosts = hosts.try_into()?;
        debug!("Connecting to wide-column cluster at {:?}", hosts.as_slice());

        let handle = self.wide_column.connect(&hosts, keyspace).await?;
        info!(
            "Connected to cassandra cluster ({} contact points, keyspace {})",
            hosts.as_slice().len(),
            keyspace.unwrap_or("<none>")
        );
        Ok(handle)
    }
}

impl Default for ConnectionResolver {
    fn default() -> Self {
        Self::new(&ConnectorSettings::default())
    }
}
