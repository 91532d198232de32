//! etl-extract - a unified connection and tabular normalization layer.
//!
//! Resolves a source descriptor to a live connection for one of several
//! relational, Hive, or wide-column backends, runs a query through it, and
//! hands back a uniform [`db::TabularResult`] that the `files` module can
//! write as CSV, Excel, Parquet, or JSON.

pub mod cli;
pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod files;
pub mod logging;
pub mod output;
pub mod query;
