//! Shared building blocks for the Veo 3 MCP server.
//!
//! Configuration, the unified error type, the Veo model registry, the Azure
//! Blob Storage client, tracing setup and the MCP transport/server runner.

pub mod blob;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod tracing;
pub mod transport;

#[cfg(test)]
mod blob_test;

pub use blob::{AzureBlobStore, BlobDescriptor, BlobStore};
pub use config::{AzureStorageConfig, Config};
pub use error::{ConfigError, Error, ErrorKind, Result, StorageError};
pub use server::{McpServerBuilder, ServerError, shutdown_channel};
pub use transport::{Transport, TransportArgs, TransportMode};
