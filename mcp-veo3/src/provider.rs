//! Video generation provider.
//!
//! [`VideoProvider`] is the boundary to the remote generation service: start
//! an operation, query its status, download a finished video.
//! [`GeminiVeoClient`] implements it against the Gemini Developer API.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use async_trait::async_trait;
use mcp_veo3_common::config::Config;
use mcp_veo3_common::error::Error;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::generation::GenerationRequest;

/// Header carrying the Gemini API key.
pub const API_KEY_HEADER: &str = "x-goog-api-key";

/// Upper bound on a single submit or status call.
pub const API_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Connect timeout for the shared HTTP client.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest silence tolerated while reading any response body.
pub const READ_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP client for provider and image traffic.
///
/// Only connect and read stalls are bounded here; video downloads may take
/// longer than any fixed total.
pub fn http_client() -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .build()
        .map_err(|e| Error::unavailable("http client", format!("failed to build HTTP client: {}", e)))
}

/// Chunked video body.
pub type VideoByteStream = BoxStream<'static, Result<Bytes, Error>>;

/// Opaque name of a provider-side long-running operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationHandle(String);

impl OperationHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Download location of one generated video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoReference {
    pub uri: String,
}

/// Snapshot of an operation.
#[derive(Debug, Clone)]
pub struct OperationStatus {
    /// Handle to use for the next query
    pub handle: OperationHandle,
    pub done: bool,
    pub videos: Vec<VideoReference>,
    /// Provider-reported failure
    pub error: Option<String>,
    /// Number of outputs removed by safety filters
    pub filtered_count: Option<u32>,
    pub filtered_reasons: Vec<String>,
}

impl OperationStatus {
    /// Status of an operation that is still running.
    pub fn pending(handle: OperationHandle) -> Self {
        Self {
            handle,
            done: false,
            videos: Vec::new(),
            error: None,
            filtered_count: None,
            filtered_reasons: Vec::new(),
        }
    }
}

/// Remote generation service.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Start generating; makes exactly one network call.
    async fn submit(&self, request: &GenerationRequest) -> Result<OperationHandle, Error>;

    /// Query an operation. The handle is consumed and returned in the status.
    async fn get_status(&self, handle: OperationHandle) -> Result<OperationStatus, Error>;

    /// Open a byte stream for a generated video.
    async fn download(&self, video: &VideoReference) -> Result<VideoByteStream, Error>;
}

// =============================================================================
// Gemini API Request/Response Types
// =============================================================================

/// `predictLongRunning` request body.
#[derive(Debug, Serialize)]
pub struct VeoPredictRequest {
    pub instances: Vec<VeoInstance>,
    pub parameters: VeoParameters,
}

/// One prompt, optionally with a first-frame image.
#[derive(Debug, Serialize)]
pub struct VeoInstance {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<VeoImageInput>,
}

/// Inline image.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VeoImageInput {
    pub bytes_base64_encoded: String,
    pub mime_type: String,
}

/// Generation parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VeoParameters {
    pub aspect_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

impl VeoPredictRequest {
    pub fn from_request(request: &GenerationRequest) -> Self {
        let image = request.image.as_ref().map(|img| VeoImageInput {
            bytes_base64_encoded: BASE64.encode(&img.bytes),
            mime_type: img.mime_type.clone(),
        });
        Self {
            instances: vec![VeoInstance {
                prompt: request.prompt.clone(),
                image,
            }],
            parameters: VeoParameters {
                aspect_ratio: request.aspect_ratio.clone(),
                negative_prompt: request.negative_prompt.clone(),
            },
        }
    }
}

/// Long-running operation as returned by both submit and status calls.
#[derive(Debug, Deserialize)]
pub struct OperationResponse {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub done: Option<bool>,
    #[serde(default)]
    pub error: Option<OperationError>,
    #[serde(default)]
    pub response: Option<OperationResult>,
}

#[derive(Debug, Deserialize)]
pub struct OperationError {
    pub code: Option<i32>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    #[serde(default)]
    pub generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoResponse {
    #[serde(default)]
    pub generated_samples: Vec<GeneratedSample>,
    #[serde(default)]
    pub rai_media_filtered_count: Option<u32>,
    #[serde(default)]
    pub rai_media_filtered_reasons: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeneratedSample {
    pub video: Option<GeneratedVideo>,
}

#[derive(Debug, Deserialize)]
pub struct GeneratedVideo {
    pub uri: Option<String>,
}

impl OperationResponse {
    /// Convert to a status, keeping `fallback` if the body has no name.
    pub fn into_status(self, fallback: OperationHandle) -> OperationStatus {
        let handle = self.name.map(OperationHandle::new).unwrap_or(fallback);
        let error = self.error.map(|e| match (e.code, e.message) {
            (Some(code), Some(message)) => format!("{} (code {})", message, code),
            (None, Some(message)) => message,
            (Some(code), None) => format!("operation failed with code {}", code),
            (None, None) => "operation failed".to_string(),
        });

        let generated = self.response.and_then(|r| r.generate_video_response);
        let (videos, filtered_count, filtered_reasons) = match generated {
            Some(g) => (
                g.generated_samples
                    .into_iter()
                    .filter_map(|s| s.video.and_then(|v| v.uri))
                    .map(|uri| VideoReference { uri })
                    .collect(),
                g.rai_media_filtered_count,
                g.rai_media_filtered_reasons,
            ),
            None => (Vec::new(), None, Vec::new()),
        };

        OperationStatus {
            handle,
            done: self.done.unwrap_or(false),
            videos,
            error,
            filtered_count,
            filtered_reasons,
        }
    }
}

/// Pull `error.message` out of a Google API error body.
fn api_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Envelope {
        error: OperationError,
    }
    serde_json::from_str::<Envelope>(body)
        .ok()
        .and_then(|e| e.error.message)
        .unwrap_or_else(|| body.trim().to_string())
}

/// Map an HTTP failure: 5xx means the service is unavailable, anything else
/// is a rejection.
fn status_error(endpoint: &str, status: reqwest::StatusCode, body: &str) -> Error {
    let message = format!("HTTP {}: {}", status.as_u16(), api_error_message(body));
    if status.is_server_error() {
        Error::unavailable(endpoint, message)
    } else {
        Error::provider(message)
    }
}

/// REST client for Veo on the Gemini Developer API.
#[derive(Clone)]
pub struct GeminiVeoClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiVeoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiVeoClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiVeoClient {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.api_base_url.clone(),
        }
    }

    /// Point the client at a different API root (e.g. a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn generate_endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:predictLongRunning", self.base_url, model)
    }

    pub fn operation_endpoint(&self, handle: &OperationHandle) -> String {
        format!("{}/{}", self.base_url, handle.name().trim_start_matches('/'))
    }

    async fn parse_operation(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<OperationResponse, Error> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::unavailable(endpoint, format!("failed to read response: {}", e)))?;
        if !status.is_success() {
            return Err(status_error(endpoint, status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| Error::provider(format!("malformed operation response: {}", e)))
    }
}

#[async_trait]
impl VideoProvider for GeminiVeoClient {
    #[instrument(level = "info", skip(self, request), fields(model = %request.model.id))]
    async fn submit(&self, request: &GenerationRequest) -> Result<OperationHandle, Error> {
        let endpoint = self.generate_endpoint(request.model.id);
        let body = VeoPredictRequest::from_request(request);
        debug!(endpoint = %endpoint, has_image = request.image.is_some(), "Calling Veo API");

        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(API_REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::unavailable(&endpoint, format!("request failed: {}", e)))?;

        let operation = Self::parse_operation(&endpoint, response).await?;
        let name = operation
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::provider("operation response has no name"))?;

        info!(operation = %name, "Started video generation operation");
        Ok(OperationHandle::new(name))
    }

    async fn get_status(&self, handle: OperationHandle) -> Result<OperationStatus, Error> {
        let endpoint = self.operation_endpoint(&handle);
        debug!(operation = %handle, "Polling operation");

        let response = self
            .http
            .get(&endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(API_REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::unavailable(&endpoint, format!("status query failed: {}", e)))?;

        let operation = Self::parse_operation(&endpoint, response).await?;
        Ok(operation.into_status(handle))
    }

    #[instrument(level = "debug", skip(self))]
    async fn download(&self, video: &VideoReference) -> Result<VideoByteStream, Error> {
        if !(video.uri.starts_with("http://") || video.uri.starts_with("https://")) {
            return Err(Error::provider(format!("unsupported video URI '{}'", video.uri)));
        }

        let response = self
            .http
            .get(&video.uri)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| Error::unavailable(&video.uri, format!("download failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(&video.uri, status, &body));
        }

        Ok(response
            .bytes_stream()
            .map_err(|e| Error::DownloadIncomplete(e.to_string()))
            .boxed())
    }
}
