//! Hive connector stand-in for builds without the `hive` feature.

use async_trait::async_trait;

use crate::connection::{BackendConnector, SourceDescriptor};
use crate::db::{BackendFamily, ConnectionHandle, SourceType};
use crate::error::{ExtractError, Result};

/// Connector for HiveServer2. This build has no ODBC support, so every
/// connection attempt fails.
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
}

#[async_trait]
impl BackendConnector for HiveConnector {
    fn family(&self) -> BackendFamily {
        BackendFamily::Hive
    }

    async fn connect(
        &self,
        source_type: SourceType,
        _descriptor: &SourceDescriptor,
    ) -> Result<ConnectionHandle> {
        Err(ExtractError::connection(
            source_type.as_str(),
            format!(
                "hive support not compiled in (rebuild with --features hive to use the '{}' driver)",
                self.driver
            ),
        ))
    }
}
