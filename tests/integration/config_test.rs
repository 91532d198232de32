//! Configuration integration tests.

use std::sync::Arc;

use etl_extract::config::Config;
use etl_extract::connection::ConnectionResolver;
use etl_extract::db::mock::{RecordingConnector, RecordingWideColumnConnector};
use etl_extract::db::{BackendFamily, HandleCapability};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

const CONFIG: &str = r#"
[sources.warehouse]
type = "Redshift"
host = "dw.example.com"
username = "etl"
password = "pw"
database = "analytics"

[sources.crm]
type = "mssql"
host = "crm.internal"
port = 14330
username = "reader"
password = "pw"
database = "crm"

[wide_column.events]
hosts = ["10.0.0.7", "10.0.0.8:9043"]
keyspace = "tracking"
"#;

fn load() -> Config {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, CONFIG).unwrap();
    Config::load_from_file(&path).unwrap()
}

#[tokio::test]
async fn test_named_sources_resolve_to_their_family() {
    let config = load();
    let recorder = RecordingConnector::new();
    let resolver =
        ConnectionResolver::with_wide_column(Arc::new(RecordingWideColumnConnector::new()))
            .with_connector(Arc::new(recorder.for_family(BackendFamily::Postgres)))
            .with_connector(Arc::new(recorder.for_family(BackendFamily::Mssql)));

    let warehouse = config.source("warehouse").unwrap().to_descriptor().unwrap();
    assert_eq!(warehouse.port, 5439);
    let handle = resolver.resolve(&warehouse).await.unwrap();
    assert_eq!(handle.label(), "redshift");

    let crm = config.source("crm").unwrap().to_descriptor().unwrap();
    assert_eq!(crm.port, 14330);
    resolver.resolve(&crm).await.unwrap();

    assert_eq!(
        recorder.calls(),
        vec![BackendFamily::Postgres, BackendFamily::Mssql]
    );
}

#[tokio::test]
async fn test_named_cluster_resolves() {
    let config = load();
    let cluster = config.wide_column("events").unwrap();
    let wide = Arc::new(RecordingWideColumnConnector::new());
    let resolver = ConnectionResolver::with_wide_column(wide.clone());

    let hosts = cluster.host_list().unwrap();
    assert_eq!(hosts.as_slice(), ["10.0.0.7", "10.0.0.8:9043"]);

    let handle = resolver
        .resolve_wide_column(hosts.into_vec(), cluster.keyspace.as_deref())
        .await
        .unwrap();

    assert_eq!(handle.capability(), HandleCapability::WideColumn);
    assert_eq!(wide.last_keyspace().as_deref(), Some("tracking"));
}

#[test]
fn test_default_hive_driver() {
    let config = load();
    assert_eq!(
        config.connector_settings().hive_odbc_driver,
        "Cloudera ODBC Driver for Apache Hive"
    );
}
