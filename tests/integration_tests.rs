//! Integration tests for etl-extract.
//!
//! Most tests run against mock sessions and temporary files. Tests that need
//! a live database are skipped unless `ETL_TEST_POSTGRES_URL` or
//! `ETL_TEST_MYSQL_URL` is set.
//!
//! Run with: `cargo test --test integration_tests`

mod integration;
