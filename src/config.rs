//! Configuration management for etl-extract.
//!
//! Handles loading named sources from a TOML file, with passwords optionally
//! supplied through the environment.

use crate::connection::{ConnectorSettings, HostList, SourceDescriptor};
use crate::db::{HiveConnector, SourceType};
use crate::error::{ExtractError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable consulted when a source has no password in the file.
pub const PASSWORD_ENV: &str = "ETL_EXTRACT_PASSWORD";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Named relational and Hive sources.
    #[serde(default)]
    pub sources: HashMap<String, SourceConfig>,

    /// Named wide-column clusters.
    #[serde(default)]
    pub wide_column: HashMap<String, WideColumnConfig>,

    /// Hive driver settings.
    #[serde(default)]
    pub hive: HiveConfig,
}

/// A named source in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source type tag (e.g. "postgresql", "MySQL").
    #[serde(rename = "type")]
    pub type_tag: String,

    #[serde(default = "default_host")]
    pub host: String,

    /// Port; the source type's default when omitted.
    pub port: Option<u16>,

    #[serde(default)]
    pub username: String,

    /// Password (not recommended to store in config).
    pub password: Option<String>,

    pub database: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl SourceConfig {
    /// Builds the descriptor for this source.
    ///
    /// The type tag is validated so the default port can be filled in; an
    /// unknown tag is reported here rather than at connect time.
    pub fn to_descriptor(&self) -> Result<SourceDescriptor> {
        let source_type = SourceType::from_tag(&self.type_tag)?;
        let password = self
            .password
            .clone()
            .or_else(|| std::env::var(PASSWORD_ENV).ok())
            .unwrap_or_default();

        Ok(SourceDescriptor::new(
            &self.type_tag,
            &self.host,
            self.port.unwrap_or_else(|| source_type.default_port()),
            &self.username,
            password,
            &self.database,
        ))
    }
}

/// A named wide-column cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WideColumnConfig {
    /// Contact points. Kept as a raw value so a non-list is reported as a
    /// host-list error rather than a parse error.
    pub hosts: toml::Value,

    pub keyspace: Option<String>,
}

impl WideColumnConfig {
    /// Validates the configured hosts.
    pub fn host_list(&self) -> Result<HostList> {
        let value = serde_json::to_value(&self.hosts)
            .map_err(|e| ExtractError::config(format!("Invalid hosts value: {e}")))?;
        HostList::try_from(value)
    }
}

/// Hive driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiveConfig {
    /// ODBC driver name as registered with the driver manager.
    #[serde(default = "default_odbc_driver")]
    pub odbc_driver: String,
}

fn default_odbc_driver() -> String {
    HiveConnector::DEFAULT_DRIVER.to_string()
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            odbc_driver: default_odbc_driver(),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("etl-extract")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file is an empty config.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ExtractError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            ExtractError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Gets a named source.
    pub fn source(&self, name: &str) -> Result<&SourceConfig> {
        self.sources
            .get(name)
            .ok_or_else(|| ExtractError::config(format!("Source '{name}' not found in config file")))
    }

    /// Gets a named wide-column cluster.
    pub fn wide_column(&self, name: &str) -> Result<&WideColumnConfig> {
        self.wide_column.get(name).ok_or_else(|| {
            ExtractError::config(format!("Cluster '{name}' not found in config file"))
        })
    }

    /// Settings for the default connectors.
    pub fn connector_settings(&self) -> ConnectorSettings {
        ConnectorSettings {
            hive_odbc_driver: self.hive.odbc_driver.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_valid_config() {
        let toml = r#"
[sources.warehouse]
type = "Redshift"
host = "dw.example.com"
username = "etl"
password = "pw"
database = "analytics"

[sources.orders]
type = "mysql"
port = 3307
database = "shop"

[wide_column.events]
hosts = ["10.0.0.7", "10.0.0.8"]
keyspace = "tracking"

[hive]
odbc_driver = "Hortonworks Hive ODBC Driver"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        let warehouse = config.source("warehouse").unwrap().to_descriptor().unwrap();
        assert_eq!(warehouse.type_tag, "Redshift");
        assert_eq!(warehouse.port, 5439);
        assert_eq!(warehouse.password, "pw");

        let orders = config.source("orders").unwrap();
        assert_eq!(orders.host, "localhost");
        assert_eq!(orders.port, Some(3307));

        let events = config.wide_column("events").unwrap();
        assert_eq!(events.host_list().unwrap().as_slice(), ["10.0.0.7", "10.0.0.8"]);
        assert_eq!(events.keyspace.as_deref(), Some("tracking"));

        assert_eq!(
            config.connector_settings().hive_odbc_driver,
            "Hortonworks Hive ODBC Driver"
        );
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.sources.is_empty());
        assert_eq!(config.hive.odbc_driver, HiveConnector::DEFAULT_DRIVER);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let toml = r#"
[sources.legacy]
type = "db2"
database = "x"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let err = config.source("legacy").unwrap().to_descriptor().unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedSourceType(ref t) if t == "db2"));
    }

    #[test]
    fn test_scalar_hosts_rejected() {
        let toml = r#"
[wide_column.bad]
hosts = "10.0.0.7"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let err = config.wide_column("bad").unwrap().host_list().unwrap_err();
        assert!(matches!(err, ExtractError::InvalidArgument(_)));
        assert!(err.to_string().contains("a list of hosts is required"));
    }

    #[test]
    fn test_missing_entries() {
        let config = Config::default();
        assert!(matches!(config.source("nope"), Err(ExtractError::Config(_))));
        assert!(matches!(config.wide_column("nope"), Err(ExtractError::Config(_))));
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_file(&dir.path().join("absent.toml")).unwrap();
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sources.x]\nhost = 1\n").unwrap();

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Configuration error"));
    }
}
