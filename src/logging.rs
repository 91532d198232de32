//! Logging configuration for etl-extract.
//!
//! Logs go to stderr by default so they never mix with table output on
//! stdout, or to a file under the platform state directory on request.

use std::fs::{self, File};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes logging to a file.
///
/// Location: `~/.local/state/etl-extract/etl-extract.log` on Linux (XDG
/// state directory), or the platform-appropriate directory elsewhere. Falls
/// back to stderr if the file cannot be created.
pub fn init_file_logging() {
    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            init_stderr_logging();
            return;
        }
    }

    // Appended across runs
    let log_file = match File::options().create(true).append(true).open(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file: {e}");
            init_stderr_logging();
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(log_file)
        .with_ansi(false)
        .init();
}

/// Initializes logging to stderr.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Returns the path for the log file.
pub fn get_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("etl-extract").join("etl-extract.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("etl-extract").join("etl-extract.log");
    }

    std::env::temp_dir().join("etl-extract.log")
}
