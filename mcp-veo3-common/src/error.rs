//! Error types for the Veo 3 MCP server.
//!
//! This module provides a unified error hierarchy using `thiserror`. Every
//! failure a generation request can hit maps to exactly one [`ErrorKind`],
//! which is what callers see in a structured failure result.
//!
//! # Error Categories
//!
//! - `ConfigError`: Missing or invalid configuration
//! - `StorageError`: Azure Blob Storage setup and listing
//! - `Error::InvalidSource` / `InvalidModel` / `InvalidRequest`: Input validation
//! - `Error::ProviderUnavailable` / `ProviderError` / `EmptyResult`: Generation provider
//! - `Error::DownloadIncomplete` / `WriteFailure`: Local materialization
//! - `Error::UploadError`: Blob upload (non-fatal)
//! - `Error::PollTimeout` / `Cancelled`: Long-running operation lifecycle

use serde::Serialize;
use thiserror::Error;

/// Unified error type for the Veo 3 MCP server.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors (missing env vars, invalid values)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Object storage setup or listing errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The image source is malformed, unreachable, or does not exist
    #[error("Invalid image source '{source_ref}': {message}")]
    InvalidSource {
        /// The path or URL that was supplied
        source_ref: String,
        /// What went wrong
        message: String,
    },

    /// The model identifier is not one of the supported Veo models
    #[error("Invalid model '{model}'. Valid models: {valid}")]
    InvalidModel {
        /// The identifier that was supplied
        model: String,
        /// Comma-separated list of accepted identifiers
        valid: String,
    },

    /// Request parameters failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The provider could not be reached or failed at the transport level
    #[error("Generation provider unavailable ({endpoint}): {message}")]
    ProviderUnavailable {
        /// The endpoint that was called
        endpoint: String,
        /// Transport failure description
        message: String,
    },

    /// The provider reported a failure
    #[error("Generation provider error: {0}")]
    ProviderError(String),

    /// The operation completed without producing a video
    #[error("Video generation failed: {0}")]
    EmptyResult(String),

    /// The video stream ended before any bytes were written
    #[error("Video download incomplete: {0}")]
    DownloadIncomplete(String),

    /// Local file system write failed
    #[error("Failed to write video to {path}: {source}")]
    WriteFailure {
        /// Destination path
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Blob upload failed
    #[error("Upload of '{blob_name}' failed: {message}")]
    UploadError {
        /// Target blob name
        blob_name: String,
        /// Error message from the storage provider
        message: String,
    },

    /// The operation did not complete within the configured timeout
    #[error("Video generation timed out after {0} seconds")]
    PollTimeout(u64),

    /// The request was cancelled by the caller
    #[error("Request cancelled")]
    Cancelled,
}

/// Machine-readable error classification surfaced to tool callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidSource,
    InvalidModel,
    InvalidRequest,
    ProviderUnavailable,
    ProviderError,
    EmptyResult,
    DownloadIncomplete,
    WriteFailure,
    UploadError,
    PollTimeout,
    Cancelled,
    Configuration,
    Storage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidSource => "InvalidSource",
            ErrorKind::InvalidModel => "InvalidModel",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::ProviderError => "ProviderError",
            ErrorKind::EmptyResult => "EmptyResult",
            ErrorKind::DownloadIncomplete => "DownloadIncomplete",
            ErrorKind::WriteFailure => "WriteFailure",
            ErrorKind::UploadError => "UploadError",
            ErrorKind::PollTimeout => "PollTimeout",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Configuration => "Configuration",
            ErrorKind::Storage => "Storage",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Create an invalid source error.
    ///
    /// # Example
    ///
    /// ```
    /// use mcp_veo3_common::error::Error;
    ///
    /// let err = Error::invalid_source("/tmp/missing.png", "file not found");
    /// assert!(err.to_string().contains("/tmp/missing.png"));
    /// ```
    pub fn invalid_source(source_ref: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidSource {
            source_ref: source_ref.into(),
            message: message.into(),
        }
    }

    /// Create a provider-unavailable error for a transport failure.
    pub fn unavailable(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ProviderUnavailable {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a provider error.
    pub fn provider(message: impl Into<String>) -> Self {
        Error::ProviderError(message.into())
    }

    /// Create an invalid request error.
    ///
    /// # Example
    ///
    /// ```
    /// use mcp_veo3_common::error::Error;
    ///
    /// let err = Error::invalid_request("prompt cannot be empty");
    /// assert!(err.to_string().contains("prompt cannot be empty"));
    /// ```
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Error::InvalidRequest(message.into())
    }

    /// Create a write failure for the given destination.
    pub fn write_failure(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Error::WriteFailure {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Create an upload error.
    pub fn upload(blob_name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::UploadError {
            blob_name: blob_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Configuration,
            Error::Storage(_) => ErrorKind::Storage,
            Error::InvalidSource { .. } => ErrorKind::InvalidSource,
            Error::InvalidModel { .. } => ErrorKind::InvalidModel,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            Error::ProviderError(_) => ErrorKind::ProviderError,
            Error::EmptyResult(_) => ErrorKind::EmptyResult,
            Error::DownloadIncomplete(_) => ErrorKind::DownloadIncomplete,
            Error::WriteFailure { .. } => ErrorKind::WriteFailure,
            Error::UploadError { .. } => ErrorKind::UploadError,
            Error::PollTimeout(_) => ErrorKind::PollTimeout,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether this error aborts a generation request.
    ///
    /// Upload failures downgrade the result to "local success, remote upload
    /// failed"; everything else is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::UploadError { .. })
    }
}

/// Configuration errors.
///
/// These errors occur when loading or validating configuration from
/// environment variables or command-line arguments.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set
    #[error("Required environment variable {0} is not set")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl ConfigError {
    /// Create a new missing environment variable error.
    pub fn missing_env_var(name: impl Into<String>) -> Self {
        ConfigError::MissingEnvVar(name.into())
    }

    /// Create a new invalid value error.
    pub fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue(name.into(), reason.into())
    }
}

/// Object storage errors that are not tied to a single upload.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The connection string could not be parsed
    #[error("Invalid storage connection string: {0}")]
    InvalidConnectionString(String),

    /// The storage client could not be built
    #[error("Failed to initialize storage client: {0}")]
    Client(String),

    /// Listing the container failed
    #[error("Failed to list container {container}: {message}")]
    ListFailed {
        /// Container that was listed
        container: String,
        /// Error message from the storage provider
        message: String,
    },

    /// Upload is not configured
    #[error("Azure Blob Storage is not configured")]
    Disabled,
}

/// Result type alias using the unified Error type.
pub type Result<T> = std::result::Result<T, Error>;
