//! MCP resources for the Veo 3 server.
//!
//! - `video://models` - supported Veo models
//! - `video://storage` - where videos end up

use mcp_veo3_common::config::Config;
use mcp_veo3_common::models::{DEFAULT_MODEL, VEO_MODELS};
use serde::Serialize;

use crate::uploader::BlobUploader;

pub const MODELS_URI: &str = "video://models";
pub const STORAGE_URI: &str = "video://storage";

/// One entry of the models resource.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub aliases: Vec<&'static str>,
    pub supported_aspect_ratios: Vec<&'static str>,
    pub supports_image_input: bool,
    pub supports_audio: bool,
    pub fast: bool,
    pub is_default: bool,
}

/// The storage resource.
#[derive(Debug, Clone, Serialize)]
pub struct StorageInfo {
    pub output_dir: String,
    pub upload_enabled: bool,
    pub container: Option<String>,
    pub list_limit: usize,
    pub poll_interval_secs: u64,
    pub poll_timeout_secs: u64,
}

pub fn list_models() -> Vec<ModelInfo> {
    VEO_MODELS
        .iter()
        .map(|m| ModelInfo {
            id: m.id,
            aliases: m.aliases.to_vec(),
            supported_aspect_ratios: m.supported_aspect_ratios.to_vec(),
            supports_image_input: m.supports_image_input,
            supports_audio: m.supports_audio,
            fast: m.fast,
            is_default: m.id == DEFAULT_MODEL,
        })
        .collect()
}

pub fn storage_info(config: &Config, uploader: &BlobUploader) -> StorageInfo {
    StorageInfo {
        output_dir: config.output_dir.display().to_string(),
        upload_enabled: uploader.is_enabled(),
        container: uploader.container().map(str::to_string),
        list_limit: uploader.list_limit(),
        poll_interval_secs: config.poll_interval.as_secs(),
        poll_timeout_secs: config.poll_timeout.as_secs(),
    }
}

/// Get models resource as JSON string.
pub fn models_resource_json() -> String {
    serde_json::to_string_pretty(&list_models()).unwrap_or_else(|_| "[]".to_string())
}

/// Get storage resource as JSON string.
pub fn storage_resource_json(config: &Config, uploader: &BlobUploader) -> String {
    serde_json::to_string_pretty(&storage_info(config, uploader)).unwrap_or_else(|_| "{}".to_string())
}
