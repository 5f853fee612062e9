//! Tracing initialization for the Veo 3 MCP server.
//!
//! Logs always go to stderr: under the stdio transport stdout carries
//! JSON-RPC frames and must stay clean. A plain-text log file can be added on
//! top with `--log-file` or `VEO3_LOG_FILE`.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls the log level and filtering. Examples:
//!   - `RUST_LOG=debug` - Enable debug logging for all modules
//!   - `RUST_LOG=mcp_veo3=debug` - Enable debug for the server crate
//!   - `RUST_LOG=warn,mcp_veo3_common=debug` - Warn by default, debug for common

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

/// Environment variable naming an optional log file.
pub const ENV_LOG_FILE: &str = "VEO3_LOG_FILE";

/// Errors raised while installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Global tracing subscriber already set")]
    AlreadyInitialized,
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn open_log_file(path: &Path) -> Result<File, TracingError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| TracingError::LogFile {
            path: path.display().to_string(),
            source,
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| TracingError::LogFile {
            path: path.display().to_string(),
            source,
        })
}

/// Initialize the global subscriber.
///
/// - Filtering via `RUST_LOG` (defaults to `default_level`)
/// - Human-readable output on stderr
/// - Optional append-only log file without ANSI colors
///
/// # Errors
///
/// Returns `TracingError::LogFile` if the log file cannot be opened and
/// `TracingError::AlreadyInitialized` if a subscriber is already installed.
///
/// # Example
///
/// ```no_run
/// use mcp_veo3_common::tracing::init_tracing;
///
/// init_tracing("info", None).expect("tracing");
/// tracing::info!("Server starting");
/// ```
pub fn init_tracing(default_level: &str, log_file: Option<&Path>) -> Result<(), TracingError> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE);

    let file_layer = match log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(true)
                    .with_span_events(FmtSpan::NONE),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|_| TracingError::AlreadyInitialized)
}

/// Initialize stderr-only tracing, ignoring an already-installed subscriber.
///
/// Intended for tests, where several cases may race to install one.
pub fn try_init_tracing() {
    let _ = init_tracing("info", None);
}
