//! MCP server for the Veo 3 pipeline.
//!
//! This module provides the MCP server handler that exposes:
//! - `generate_video` tool for text-to-video generation
//! - `generate_video_from_image` tool for image-to-video generation
//! - `list_generated_videos` and `get_video_info` for the local catalog
//! - Resources for models and storage settings

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, Content, ListResourcesResult, ListToolsResult,
        PaginatedRequestParam, RawResource, ReadResourceRequestParam, ReadResourceResult, Resource,
        ResourceContents, ServerCapabilities, ServerInfo, SetLevelRequestParam, Tool,
    },
    service::{RequestContext, RoleServer},
};
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::handler::{
    GenerateVideoFromImageParams, GenerateVideoParams, GenerationFailure, GenerationResult, GetVideoInfoParams,
    ListGeneratedVideosParams, VideoHandler,
};
use crate::reporter::McpReporter;
use crate::resources::{self, MODELS_URI, STORAGE_URI};

pub const TOOL_GENERATE_VIDEO: &str = "generate_video";
pub const TOOL_GENERATE_VIDEO_FROM_IMAGE: &str = "generate_video_from_image";
pub const TOOL_LIST_GENERATED_VIDEOS: &str = "list_generated_videos";
pub const TOOL_GET_VIDEO_INFO: &str = "get_video_info";

/// MCP server for Veo 3 video generation.
#[derive(Clone)]
pub struct VeoServer {
    handler: Arc<VideoHandler>,
}

fn input_schema<T: JsonSchema>() -> Arc<serde_json::Map<String, serde_json::Value>> {
    match serde_json::to_value(schemars::schema_for!(T)) {
        Ok(serde_json::Value::Object(map)) => Arc::new(map),
        _ => Arc::new(serde_json::Map::new()),
    }
}

fn tool<T: JsonSchema>(name: &'static str, description: &'static str) -> Tool {
    Tool {
        name: Cow::Borrowed(name),
        description: Some(Cow::Borrowed(description)),
        input_schema: input_schema::<T>(),
        annotations: None,
        icons: None,
        meta: None,
        output_schema: None,
        title: None,
    }
}

fn resource(uri: &str, name: &str, description: &str) -> Resource {
    Resource {
        raw: RawResource {
            uri: uri.to_string(),
            name: name.to_string(),
            title: None,
            description: Some(description.to_string()),
            mime_type: Some("application/json".to_string()),
            size: None,
            icons: None,
            meta: None,
        },
        annotations: None,
    }
}

fn parse_params<T: DeserializeOwned>(
    arguments: Option<serde_json::Map<String, serde_json::Value>>,
) -> Result<T, McpError> {
    arguments
        .map(|args| serde_json::from_value(serde_json::Value::Object(args)))
        .transpose()
        .map_err(|e| McpError::invalid_params(format!("Invalid parameters: {}", e), None))?
        .ok_or_else(|| McpError::invalid_params("Missing parameters", None))
}

fn json_content<T: Serialize>(value: &T) -> Result<Vec<Content>, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Failed to serialize result: {}", e), None))?;
    Ok(vec![Content::text(text)])
}

/// Tool-level failure: the call succeeds at the protocol level and carries
/// `{success: false, error, error_kind}`.
fn error_result(err: &mcp_veo3_common::Error) -> Result<CallToolResult, McpError> {
    let body = GenerationResult::Failure(GenerationFailure::from(err));
    Ok(CallToolResult::error(json_content(&body)?))
}

impl VeoServer {
    pub fn new(handler: VideoHandler) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    pub fn handler(&self) -> &VideoHandler {
        &self.handler
    }

    fn generation_reply(result: &GenerationResult) -> Result<CallToolResult, McpError> {
        let content = json_content(result)?;
        Ok(if result.is_success() {
            CallToolResult::success(content)
        } else {
            CallToolResult::error(content)
        })
    }

    /// Generate a video from a text prompt.
    pub async fn generate_video(
        &self,
        params: GenerateVideoParams,
        context: &RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        info!(prompt = %params.prompt, "Generating video (text-to-video)");
        let reporter = McpReporter::new(context.peer.clone(), context.meta.get_progress_token());
        let result = self.handler.generate_video(params, &reporter, &context.ct).await;
        Self::generation_reply(&result)
    }

    /// Generate a video from an image and a prompt.
    pub async fn generate_video_from_image(
        &self,
        params: GenerateVideoFromImageParams,
        context: &RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        info!(prompt = %params.prompt, image = %params.image_path, "Generating video (image-to-video)");
        let reporter = McpReporter::new(context.peer.clone(), context.meta.get_progress_token());
        let result = self
            .handler
            .generate_video_from_image(params, &reporter, &context.ct)
            .await;
        Self::generation_reply(&result)
    }

    pub async fn list_generated_videos(&self, params: ListGeneratedVideosParams) -> Result<CallToolResult, McpError> {
        match self.handler.list_videos(params).await {
            Ok(listing) => Ok(CallToolResult::success(json_content(&listing)?)),
            Err(err) => error_result(&err),
        }
    }

    pub async fn get_video_info(&self, params: GetVideoInfoParams) -> Result<CallToolResult, McpError> {
        match self.handler.video_info(params).await {
            Ok(entry) => Ok(CallToolResult::success(json_content(&entry)?)),
            Err(err) => error_result(&err),
        }
    }
}

impl ServerHandler for VeoServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Video generation server using Google Veo 3 through the Gemini API. \
                 Use generate_video for text-to-video and generate_video_from_image to animate \
                 an image (local path or URL). Videos are saved locally and uploaded to Azure \
                 Blob Storage when configured. Generation takes minutes; progress is reported \
                 through log and progress notifications."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .enable_logging()
                .build(),
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _params: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        async move {
            Ok(ListToolsResult {
                tools: vec![
                    tool::<GenerateVideoParams>(
                        TOOL_GENERATE_VIDEO,
                        "Generate a video from a text prompt with Google Veo 3. Saves an MP4 to the \
                         output directory and returns its path, size, generation time and, when Azure \
                         Blob Storage is configured, the uploaded video URL (azure_video_url).",
                    ),
                    tool::<GenerateVideoFromImageParams>(
                        TOOL_GENERATE_VIDEO_FROM_IMAGE,
                        "Generate a video that starts from an image. image_path accepts a local file \
                         path or an http(s) URL. Returns the same fields as generate_video.",
                    ),
                    tool::<ListGeneratedVideosParams>(
                        TOOL_LIST_GENERATED_VIDEOS,
                        "List generated MP4 videos in the output directory, newest first, and \
                         optionally the videos uploaded to Azure Blob Storage.",
                    ),
                    tool::<GetVideoInfoParams>(
                        TOOL_GET_VIDEO_INFO,
                        "Get size and timestamps of a generated video by path or filename.",
                    ),
                ],
                next_cursor: None,
                meta: None,
            })
        }
    }

    fn call_tool(
        &self,
        params: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            match params.name.as_ref() {
                TOOL_GENERATE_VIDEO => {
                    self.generate_video(parse_params(params.arguments)?, &context).await
                }
                TOOL_GENERATE_VIDEO_FROM_IMAGE => {
                    self.generate_video_from_image(parse_params(params.arguments)?, &context)
                        .await
                }
                TOOL_LIST_GENERATED_VIDEOS => {
                    // Every field is optional, so a call without arguments is valid.
                    let list_params = match params.arguments {
                        None => ListGeneratedVideosParams::default(),
                        arguments => parse_params(arguments)?,
                    };
                    self.list_generated_videos(list_params).await
                }
                TOOL_GET_VIDEO_INFO => self.get_video_info(parse_params(params.arguments)?).await,
                _ => Err(McpError::invalid_params(format!("Unknown tool: {}", params.name), None)),
            }
        }
    }

    fn list_resources(
        &self,
        _params: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        async move {
            debug!("Listing resources");
            Ok(ListResourcesResult {
                resources: vec![
                    resource(MODELS_URI, "Available Veo Models", "Supported Veo models, aliases and capabilities"),
                    resource(STORAGE_URI, "Video Storage", "Output directory, blob upload and polling settings"),
                ],
                next_cursor: None,
                meta: None,
            })
        }
    }

    fn read_resource(
        &self,
        params: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move {
            let uri = &params.uri;
            debug!(uri = %uri, "Reading resource");

            let content = match uri.as_str() {
                MODELS_URI => resources::models_resource_json(),
                STORAGE_URI => resources::storage_resource_json(self.handler.config(), self.handler.uploader()),
                _ => {
                    return Err(McpError::resource_not_found(
                        format!("Unknown resource: {}", uri),
                        None,
                    ));
                }
            };

            Ok(ReadResourceResult {
                contents: vec![ResourceContents::text(content, uri.clone())],
            })
        }
    }

    fn set_level(
        &self,
        params: SetLevelRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<(), McpError>> + Send + '_ {
        async move {
            debug!(level = ?params.level, "Client set logging level");
            Ok(())
        }
    }
}
