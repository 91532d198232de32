//! Connection integration tests.
//!
//! Exercises the default resolver against unreachable endpoints, and a live
//! database when one is configured.

use etl_extract::connection::{ConnectionResolver, SourceDescriptor};
use etl_extract::db::{BackendFamily, HandleCapability};
use etl_extract::error::ExtractError;
use serde_json::json;

fn unreachable(tag: &str) -> SourceDescriptor {
    // Nothing listens on port 1 locally, so the connect attempt is refused.
    SourceDescriptor::new(tag, "127.0.0.1", 1, "etl", "secret", "analytics")
}

fn assert_connection_error(err: ExtractError, expected_source: &str) {
    match err {
        ExtractError::Connection {
            source_type,
            message,
        } => {
            assert_eq!(source_type, expected_source);
            assert!(
                message.starts_with("error establishing connection"),
                "unexpected message: {message}"
            );
            assert!(!message.contains("secret"), "password leaked: {message}");
        }
        other => panic!("expected connection error, got {other:?}"),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn test_postgres_refused() {
    let resolver = ConnectionResolver::default();
    let err = resolver.resolve(&unreachable("PostgreSQL")).await.unwrap_err();
    assert_connection_error(err, "postgresql");
}

#[tokio::test(flavor = "current_thread")]
async fn test_redshift_refused_is_labelled_redshift() {
    let resolver = ConnectionResolver::default();
    let err = resolver.resolve(&unreachable("Redshift")).await.unwrap_err();
    assert_connection_error(err, "redshift");
}

#[tokio::test(flavor = "current_thread")]
async fn test_mysql_refused() {
    let resolver = ConnectionResolver::default();
    let err = resolver.resolve(&unreachable("MariaDB")).await.unwrap_err();
    assert_connection_error(err, "mariadb");
}

#[tokio::test(flavor = "current_thread")]
async fn test_mssql_refused() {
    let resolver = ConnectionResolver::default();
    let err = resolver.resolve(&unreachable("mssql")).await.unwrap_err();
    assert_connection_error(err, "mssql");
}

#[tokio::test]
async fn test_unsupported_tag_names_the_tag() {
    let resolver = ConnectionResolver::default();
    let err = resolver.resolve(&unreachable("mongodb")).await.unwrap_err();

    assert_eq!(err.category(), "Unsupported Source Type");
    assert_eq!(err.to_string(), "mongodb database type is not supported");
}

#[tokio::test]
async fn test_wide_column_rejects_bad_hosts_without_connecting() {
    let resolver = ConnectionResolver::default();

    let err = resolver
        .resolve_wide_column(json!({"host": "10.0.0.1"}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::InvalidArgument(_)));

    let err = resolver
        .resolve_wide_column(Vec::<String>::new(), Some("ks"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_live_postgres_handle() {
    let Ok(url) = std::env::var("ETL_TEST_POSTGRES_URL") else {
        eprintln!("Skipping test: ETL_TEST_POSTGRES_URL not set");
        return;
    };

    let descriptor = SourceDescriptor::from_url(&url).unwrap();
    let handle = ConnectionResolver::default()
        .resolve(&descriptor)
        .await
        .unwrap();

    assert_eq!(handle.family(), BackendFamily::Postgres);
    assert_eq!(handle.capability(), HandleCapability::Cursor);
    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_live_mysql_handle() {
    let Ok(url) = std::env::var("ETL_TEST_MYSQL_URL") else {
        eprintln!("Skipping test: ETL_TEST_MYSQL_URL not set");
        return;
    };

    let descriptor = SourceDescriptor::from_url(&url).unwrap();
    let handle = ConnectionResolver::default()
        .resolve(&descriptor)
        .await
        .unwrap();

    assert_eq!(handle.family(), BackendFamily::MySql);
    handle.close().await.unwrap();
}
