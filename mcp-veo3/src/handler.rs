//! Video generation handler for the Veo 3 MCP server.
//!
//! [`VideoHandler`] wires the pipeline together:
//! validate, fetch the source image, submit, poll, materialize, upload.
//! Every generation ends in a [`GenerationResult`]; errors never escape as
//! protocol failures.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use mcp_veo3_common::blob::{BlobDescriptor, bytes_to_mb};
use mcp_veo3_common::config::Config;
use mcp_veo3_common::error::{Error, ErrorKind};
use mcp_veo3_common::models::{DEFAULT_ASPECT_RATIO, DEFAULT_MODEL};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, Serializer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{self, VideoEntry};
use crate::generation::{GenerationClient, GenerationRequest};
use crate::materializer::{VideoFile, VideoMaterializer};
use crate::media::MediaFetcher;
use crate::poller::OperationPoller;
use crate::provider::{GeminiVeoClient, VideoProvider, http_client};
use crate::reporter::ProgressReporter;
use crate::uploader::{BlobUploader, UploadResult};

/// Text-to-video parameters.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct GenerateVideoParams {
    /// Text prompt describing the video to generate
    pub prompt: String,
    /// Veo model id or alias (default: veo-3.0-generate-preview)
    #[serde(default)]
    pub model: Option<String>,
    /// Aspect ratio: 16:9 or 9:16 (default: 16:9)
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    /// What the video should not contain
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// Directory to save the video in (default: server output directory)
    #[serde(default)]
    pub output_dir: Option<String>,
}

/// Image-to-video parameters.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct GenerateVideoFromImageParams {
    /// Text prompt describing the motion to generate
    pub prompt: String,
    /// Local path or http(s) URL of the first-frame image
    pub image_path: String,
    /// Veo model id or alias (default: veo-3.0-generate-preview)
    #[serde(default)]
    pub model: Option<String>,
    /// Aspect ratio: 16:9 or 9:16 (default: 16:9)
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    /// What the video should not contain
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// Directory to save the video in (default: server output directory)
    #[serde(default)]
    pub output_dir: Option<String>,
}

impl From<GenerateVideoFromImageParams> for GenerateVideoParams {
    fn from(params: GenerateVideoFromImageParams) -> Self {
        Self {
            prompt: params.prompt,
            model: params.model,
            aspect_ratio: params.aspect_ratio,
            negative_prompt: params.negative_prompt,
            output_dir: params.output_dir,
        }
    }
}

/// Listing parameters.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ListGeneratedVideosParams {
    /// Directory to list (default: server output directory)
    #[serde(default)]
    pub output_dir: Option<String>,
    /// Also list videos uploaded to Azure Blob Storage (default: true when configured)
    #[serde(default)]
    pub include_remote: Option<bool>,
    /// Maximum number of entries per listing
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Video lookup parameters.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct GetVideoInfoParams {
    /// Full path, or a filename inside the output directory
    pub video_path: String,
}

/// A materialized video and how it got there.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSuccess {
    pub video_path: String,
    pub filename: String,
    pub file_size: u64,
    pub file_size_mb: f64,
    /// Seconds from submission to the end of upload
    pub generation_time: f64,
    pub model: String,
    pub prompt: String,
    pub aspect_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_source: Option<String>,
    pub operation: String,
    /// Always present; `null` when upload is disabled or failed
    pub azure_video_url: Option<String>,
    /// `null` when the upload failed
    pub upload: Option<UploadResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_error: Option<String>,
}

/// A request that did not produce a video.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationFailure {
    pub error: String,
    pub error_kind: ErrorKind,
}

impl From<&Error> for GenerationFailure {
    fn from(err: &Error) -> Self {
        Self {
            error: err.to_string(),
            error_kind: err.kind(),
        }
    }
}

/// Terminal outcome of a generation request, serialized with a `success` flag.
#[derive(Debug, Clone)]
pub enum GenerationResult {
    Success(Box<GenerationSuccess>),
    Failure(GenerationFailure),
}

impl GenerationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(f.error_kind),
        }
    }
}

impl From<Result<GenerationSuccess, Error>> for GenerationResult {
    fn from(result: Result<GenerationSuccess, Error>) -> Self {
        match result {
            Ok(success) => Self::Success(Box::new(success)),
            Err(err) => Self::Failure(GenerationFailure::from(&err)),
        }
    }
}

impl Serialize for GenerationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Flagged<'a, T> {
            success: bool,
            #[serde(flatten)]
            body: &'a T,
        }

        match self {
            Self::Success(body) => Flagged { success: true, body: body.as_ref() }.serialize(serializer),
            Self::Failure(body) => Flagged { success: false, body }.serialize(serializer),
        }
    }
}

/// Blob-side half of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteListing {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    pub count: usize,
    pub videos: Vec<BlobDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of `list_generated_videos`.
#[derive(Debug, Clone, Serialize)]
pub struct VideoListing {
    pub output_dir: String,
    pub count: usize,
    pub videos: Vec<VideoEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteListing>,
}

/// Runs generation requests end to end.
pub struct VideoHandler {
    config: Config,
    media: MediaFetcher,
    generator: GenerationClient,
    poller: OperationPoller,
    materializer: VideoMaterializer,
    uploader: BlobUploader,
}

impl VideoHandler {
    /// Build the production pipeline from configuration.
    ///
    /// # Errors
    /// Returns `Error::Storage` if an Azure connection string is present but
    /// malformed.
    #[instrument(level = "debug", name = "video_handler_new", skip_all)]
    pub fn new(config: Config) -> Result<Self, Error> {
        let http = http_client()?;
        let provider: Arc<dyn VideoProvider> = Arc::new(GeminiVeoClient::new(&config, http.clone()));
        let uploader = BlobUploader::from_config(&config)?;
        Ok(Self::with_components(config, provider, uploader, MediaFetcher::new(http)))
    }

    /// Build with an arbitrary provider, uploader and image fetcher.
    pub fn with_components(
        config: Config,
        provider: Arc<dyn VideoProvider>,
        uploader: BlobUploader,
        media: MediaFetcher,
    ) -> Self {
        debug!(
            poll_interval_secs = config.poll_interval.as_secs(),
            poll_timeout_secs = config.poll_timeout.as_secs(),
            upload_enabled = uploader.is_enabled(),
            "Initializing VideoHandler"
        );
        Self {
            media,
            generator: GenerationClient::new(Arc::clone(&provider)),
            poller: OperationPoller::new(Arc::clone(&provider), config.poll_interval, config.poll_timeout),
            materializer: VideoMaterializer::new(provider),
            uploader,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn uploader(&self) -> &BlobUploader {
        &self.uploader
    }

    fn output_dir(&self, requested: Option<&str>) -> PathBuf {
        requested
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.config.output_dir.clone())
    }

    /// Generate a video from a text prompt.
    #[instrument(level = "info", name = "generate_video", skip_all, fields(model = params.model.as_deref().unwrap_or(DEFAULT_MODEL)))]
    pub async fn generate_video(
        &self,
        params: GenerateVideoParams,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> GenerationResult {
        let result = self.run(params, None, reporter, cancel).await;
        self.finish(result, reporter).await
    }

    /// Generate a video whose first frame is the given image.
    #[instrument(level = "info", name = "generate_video_from_image", skip_all, fields(model = params.model.as_deref().unwrap_or(DEFAULT_MODEL)))]
    pub async fn generate_video_from_image(
        &self,
        params: GenerateVideoFromImageParams,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> GenerationResult {
        let image = params.image_path.clone();
        let result = self.run(params.into(), Some(&image), reporter, cancel).await;
        self.finish(result, reporter).await
    }

    async fn finish(&self, result: Result<GenerationSuccess, Error>, reporter: &dyn ProgressReporter) -> GenerationResult {
        if let Err(err) = &result {
            match err {
                Error::Cancelled => info!("Generation cancelled"),
                _ => {
                    warn!(error = %err, kind = %err.kind(), "Video generation failed");
                    reporter
                        .notify_error(&format!("Video generation failed: {}", err))
                        .await;
                }
            }
        }
        result.into()
    }

    async fn run(
        &self,
        params: GenerateVideoParams,
        image_source: Option<&str>,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<GenerationSuccess, Error> {
        let started = Instant::now();
        let output_dir = self.output_dir(params.output_dir.as_deref());

        let mut request = GenerationRequest::new(
            &params.prompt,
            params.model.as_deref().unwrap_or(DEFAULT_MODEL),
            params.aspect_ratio.as_deref().unwrap_or(DEFAULT_ASPECT_RATIO),
            output_dir,
        )?
        .with_negative_prompt(params.negative_prompt);

        if let Some(source) = image_source {
            reporter.notify_info(&format!("Processing image: {}", source)).await;
            let image = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                image = self.media.resolve(source, reporter) => image?,
            };
            request = request.with_image(image)?;
        }

        reporter
            .notify_info(&format!("Starting video generation with {}", request.model.id))
            .await;
        let handle = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            handle = self.generator.submit(&request) => handle?,
        };
        reporter
            .notify_info(&format!("Generation started; operation {}", handle))
            .await;

        let completed = self.poller.await_completion(handle, reporter, cancel).await?;
        let video = completed
            .videos
            .first()
            .ok_or_else(|| Error::EmptyResult("No videos generated".to_string()))?;

        reporter.notify_info("Downloading generated video...").await;
        let file = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            file = self.materializer.save(video, &request.output_dir) => file?,
        };
        reporter
            .notify_info(&format!("Video saved to {}", file.path.display()))
            .await;

        let (upload, upload_error) = self.upload(&file, reporter).await?;
        let generation_time = started.elapsed().as_secs_f64();

        info!(
            filename = %file.filename,
            size_bytes = file.size_bytes,
            generation_time,
            polls = completed.polls,
            uploaded = upload.as_ref().is_some_and(|u| u.url.is_some()),
            "Video generation completed"
        );
        reporter
            .notify_info(&format!("Video generation completed: {}", file.filename))
            .await;

        Ok(GenerationSuccess {
            video_path: file.path.display().to_string(),
            filename: file.filename.clone(),
            file_size: file.size_bytes,
            file_size_mb: bytes_to_mb(file.size_bytes),
            generation_time,
            model: request.model.id.to_string(),
            prompt: request.prompt,
            aspect_ratio: request.aspect_ratio,
            negative_prompt: request.negative_prompt,
            image_source: image_source.map(str::to_string),
            operation: completed.handle.to_string(),
            azure_video_url: upload.as_ref().and_then(|u| u.url.clone()),
            upload,
            upload_error,
        })
    }

    /// Non-fatal upload failures are reported and downgraded; the local file
    /// stands.
    async fn upload(
        &self,
        file: &VideoFile,
        reporter: &dyn ProgressReporter,
    ) -> Result<(Option<UploadResult>, Option<String>), Error> {
        if !self.uploader.is_enabled() {
            return Ok((Some(UploadResult::disabled()), None));
        }

        reporter.notify_info("Uploading video to Azure Blob Storage...").await;
        match self.uploader.upload(file).await {
            Ok(result) => {
                if let Some(url) = &result.url {
                    reporter.notify_info(&format!("Video uploaded: {}", url)).await;
                }
                Ok((Some(result), None))
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!(error = %err, filename = %file.filename, "Upload failed; keeping local file");
                let message = err.to_string();
                reporter
                    .notify_error(&format!("Azure upload failed: {}", message))
                    .await;
                Ok((None, Some(message)))
            }
        }
    }

    /// Local videos, and uploaded ones when requested.
    #[instrument(level = "info", skip_all)]
    pub async fn list_videos(&self, params: ListGeneratedVideosParams) -> Result<VideoListing, Error> {
        let output_dir = self.output_dir(params.output_dir.as_deref());
        let limit = params.limit.unwrap_or(self.uploader.list_limit());
        let videos = catalog::list_videos(&output_dir, limit).await?;

        let include_remote = params.include_remote.unwrap_or(self.uploader.is_enabled());
        let remote = if include_remote {
            Some(self.list_remote(limit).await)
        } else {
            None
        };

        Ok(VideoListing {
            output_dir: output_dir.display().to_string(),
            count: videos.len(),
            videos,
            remote,
        })
    }

    async fn list_remote(&self, limit: usize) -> RemoteListing {
        let container = self.uploader.container().map(str::to_string);
        match self.uploader.list(Some(limit)).await {
            Ok(videos) => RemoteListing {
                enabled: true,
                container,
                count: videos.len(),
                videos,
                message: None,
            },
            Err(err) => {
                if self.uploader.is_enabled() {
                    warn!(error = %err, "Failed to list uploaded videos");
                }
                RemoteListing {
                    enabled: self.uploader.is_enabled(),
                    container,
                    count: 0,
                    videos: Vec::new(),
                    message: Some(err.to_string()),
                }
            }
        }
    }

    /// Metadata of one local video.
    #[instrument(level = "info", skip_all, fields(video_path = %params.video_path))]
    pub async fn video_info(&self, params: GetVideoInfoParams) -> Result<VideoEntry, Error> {
        catalog::video_info(&params.video_path, &self.config.output_dir).await
    }
}
