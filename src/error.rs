//! Error types for etl-extract.
//!
//! Defines the main error enum used throughout the crate. Every failure names
//! the stage it happened in; connection and query failures also name the
//! source type so a caller can tell which backend rejected the request.

use thiserror::Error;

/// Main error type for extraction operations.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The source type tag is not one of the supported backends.
    #[error("{0} database type is not supported")]
    UnsupportedSourceType(String),

    /// A structured argument has the wrong shape (e.g. hosts not a list).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend rejected or could not establish the connection.
    #[error("Connection error [{source_type}]: {message}")]
    Connection {
        source_type: String,
        message: String,
    },

    /// The backend rejected or failed to execute the query.
    #[error("Query error [{source_type}]: {message}")]
    Query {
        source_type: String,
        message: String,
    },

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// File reading or writing errors.
    #[error("File error: {0}")]
    File(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Creates an unsupported source type error naming the rejected tag.
    pub fn unsupported(tag: impl Into<String>) -> Self {
        Self::UnsupportedSourceType(tag.into())
    }

    /// Creates an invalid argument error with the given message.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates a connection error, labelled with the connect stage.
    pub fn connection(source_type: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Connection {
            source_type: source_type.into(),
            message: format!("error establishing connection: {cause}"),
        }
    }

    /// Creates a query error carrying the backend's own diagnostic.
    pub fn query(source_type: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Query {
            source_type: source_type.into(),
            message: cause.to_string(),
        }
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a file error with the given message.
    pub fn file(msg: impl Into<String>) -> Self {
        Self::File(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnsupportedSourceType(_) => "Unsupported Source Type",
            Self::InvalidArgument(_) => "Invalid Argument",
            Self::Connection { .. } => "Connection Error",
            Self::Query { .. } => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::File(_) => "File Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using ExtractError.
pub type Result<T> = std::result::Result<T, ExtractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_unsupported() {
        let err = ExtractError::unsupported("sybase");
        assert_eq!(err.to_string(), "sybase database type is not supported");
        assert_eq!(err.category(), "Unsupported Source Type");
    }

    #[test]
    fn test_error_display_invalid_argument() {
        let err = ExtractError::invalid_argument("a list of hosts is required");
        assert_eq!(
            err.to_string(),
            "Invalid argument: a list of hosts is required"
        );
        assert_eq!(err.category(), "Invalid Argument");
    }

    #[test]
    fn test_error_display_connection() {
        let err = ExtractError::connection("mysql", "Access denied for user 'etl'");
        assert_eq!(
            err.to_string(),
            "Connection error [mysql]: error establishing connection: Access denied for user 'etl'"
        );
        assert_eq!(err.category(), "Connection Error");
    }

    #[test]
    fn test_error_display_query() {
        let err = ExtractError::query("postgresql", "relation \"nope\" does not exist");
        assert_eq!(
            err.to_string(),
            "Query error [postgresql]: relation \"nope\" does not exist"
        );
        assert_eq!(err.category(), "Query Error");
    }

    #[test]
    fn test_error_display_config() {
        let err = ExtractError::config("missing field 'type' in sources.warehouse");
        assert_eq!(
            err.to_string(),
            "Configuration error: missing field 'type' in sources.warehouse"
        );
        assert_eq!(err.category(), "Configuration Error");
    }

    #[test]
    fn test_error_display_file() {
        let err = ExtractError::file("out.csv: permission denied");
        assert_eq!(err.to_string(), "File error: out.csv: permission denied");
        assert_eq!(err.category(), "File Error");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ExtractError>();
    }
}
