//! Veo 3 MCP server library.
//!
//! Turns MCP tool calls into Veo 3 generations: submit the request, poll the
//! long-running operation, stream the video to disk and optionally upload it
//! to Azure Blob Storage.

pub mod catalog;
pub mod generation;
pub mod handler;
pub mod materializer;
pub mod media;
pub mod poller;
pub mod provider;
pub mod reporter;
pub mod resources;
pub mod server;
pub mod uploader;


pub use handler::{GenerateVideoFromImageParams, GenerateVideoParams, GenerationResult, VideoHandler};
pub use provider::{GeminiVeoClient, VideoProvider};
pub use server::VeoServer;
