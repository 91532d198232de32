pub mod config_test;
pub mod connection_test;
pub mod files_test;
pub mod query_test;
