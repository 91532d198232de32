//! Query execution against resolved connections.

pub mod executor;

pub use executor::{execute, fold_records};
