//! Configuration module for loading environment variables and settings.
//!
//! `Config` is built once at process start and handed to every component
//! constructor. Request-handling code never reads the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_API_KEY_FALLBACK: &str = "GOOGLE_API_KEY";
pub const ENV_API_BASE_URL: &str = "GEMINI_API_BASE_URL";
pub const ENV_AZURE_CONNECTION_STRING: &str = "AZURE_STORAGE_CONNECTION_STRING";
pub const ENV_AZURE_CONTAINER: &str = "AZURE_CONTAINER_NAME";
pub const ENV_AZURE_LIST_LIMIT: &str = "AZURE_LIST_LIMIT";
pub const ENV_OUTPUT_DIR: &str = "VEO3_OUTPUT_DIR";
pub const ENV_POLL_INTERVAL: &str = "VEO3_POLL_INTERVAL_SECS";
pub const ENV_POLL_TIMEOUT: &str = "VEO3_POLL_TIMEOUT_SECS";
pub const ENV_PORT: &str = "PORT";

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CONTAINER: &str = "generated-videos";
pub const DEFAULT_OUTPUT_DIR: &str = "generated_videos";
pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_PORT: u16 = 8080;

/// Azure Blob Storage settings. Present only when a connection string is set.
#[derive(Clone)]
pub struct AzureStorageConfig {
    /// Raw connection string
    pub connection_string: String,
    /// Target container
    pub container: String,
}

impl std::fmt::Debug for AzureStorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureStorageConfig")
            .field("connection_string", &"<redacted>")
            .field("container", &self.container)
            .finish()
    }
}

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Gemini API key (required)
    pub api_key: String,
    /// Base URL of the Gemini API
    pub api_base_url: String,
    /// Blob storage settings; `None` disables upload
    pub azure: Option<AzureStorageConfig>,
    /// Maximum number of blobs returned by a listing
    pub blob_list_limit: usize,
    /// Default directory for materialized videos
    pub output_dir: PathBuf,
    /// Delay between operation status queries
    pub poll_interval: Duration,
    /// Upper bound on the total time spent polling one operation
    pub poll_timeout: Duration,
    /// HTTP server port
    pub port: u16,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("azure", &self.azure)
            .field("blob_list_limit", &self.blob_list_limit)
            .field("output_dir", &self.output_dir)
            .field("poll_interval", &self.poll_interval)
            .field("poll_timeout", &self.poll_timeout)
            .field("port", &self.port)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables and .env file.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingEnvVar` if GEMINI_API_KEY is not set, or
    /// `ConfigError::InvalidValue` if a numeric setting does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get(ENV_API_KEY)
            .or_else(|| get(ENV_API_KEY_FALLBACK))
            .ok_or_else(|| ConfigError::missing_env_var(ENV_API_KEY))?;

        let api_base_url = get(ENV_API_BASE_URL)
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let azure = get(ENV_AZURE_CONNECTION_STRING).map(|connection_string| AzureStorageConfig {
            connection_string,
            container: get(ENV_AZURE_CONTAINER).unwrap_or_else(|| DEFAULT_CONTAINER.to_string()),
        });

        let blob_list_limit = parse_or(get(ENV_AZURE_LIST_LIMIT), ENV_AZURE_LIST_LIMIT, DEFAULT_LIST_LIMIT)?;

        let output_dir = get(ENV_OUTPUT_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        let poll_interval = parse_or(get(ENV_POLL_INTERVAL), ENV_POLL_INTERVAL, DEFAULT_POLL_INTERVAL_SECS)?;
        let poll_timeout = parse_or(get(ENV_POLL_TIMEOUT), ENV_POLL_TIMEOUT, DEFAULT_POLL_TIMEOUT_SECS)?;
        if poll_interval == 0 {
            return Err(ConfigError::invalid_value(ENV_POLL_INTERVAL, "must be at least 1 second"));
        }
        if poll_timeout < poll_interval {
            return Err(ConfigError::invalid_value(
                ENV_POLL_TIMEOUT,
                format!("must be at least the poll interval ({}s)", poll_interval),
            ));
        }

        let port = parse_or(get(ENV_PORT), ENV_PORT, DEFAULT_PORT)?;

        Ok(Self {
            api_key,
            api_base_url,
            azure,
            blob_list_limit,
            output_dir,
            poll_interval: Duration::from_secs(poll_interval),
            poll_timeout: Duration::from_secs(poll_timeout),
            port,
        })
    }

    /// Override the default output directory (e.g. from `--output-dir`).
    pub fn with_output_dir(mut self, output_dir: impl AsRef<Path>) -> Self {
        self.output_dir = output_dir.as_ref().to_path_buf();
        self
    }

    /// Whether blob upload is configured.
    pub fn upload_enabled(&self) -> bool {
        self.azure.is_some()
    }
}

fn parse_or<T>(value: Option<String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid_value(name, format!("'{}': {}", raw, e))),
        None => Ok(default),
    }
}
