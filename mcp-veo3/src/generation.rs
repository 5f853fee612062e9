//! Generation requests and submission.

use std::path::PathBuf;
use std::sync::Arc;

use mcp_veo3_common::error::Error;
use mcp_veo3_common::models::{ModelRegistry, VeoModel};
use tracing::{info, instrument};

use crate::media::ResolvedImage;
use crate::provider::{OperationHandle, VideoProvider};

/// Validation error details for a generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: &'static str,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A validated generation request.
///
/// Construct with [`GenerationRequest::new`]; the model is always one of the
/// registered Veo models.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub image: Option<ResolvedImage>,
    pub model: &'static VeoModel,
    pub aspect_ratio: String,
    pub output_dir: PathBuf,
}

impl GenerationRequest {
    /// Validate and build a text-to-video request.
    ///
    /// # Errors
    /// - `Error::InvalidModel` if `model` is not a known model or alias
    /// - `Error::InvalidRequest` listing every other invalid field
    pub fn new(
        prompt: &str,
        model: &str,
        aspect_ratio: &str,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, Error> {
        let resolved = ModelRegistry::resolve_veo(model).ok_or_else(|| Error::InvalidModel {
            model: model.to_string(),
            valid: ModelRegistry::veo_model_ids(),
        })?;

        let mut errors = Vec::new();

        let prompt = prompt.trim();
        if prompt.is_empty() {
            errors.push(ValidationError {
                field: "prompt",
                message: "Prompt cannot be empty".to_string(),
            });
        }

        let aspect_ratio = aspect_ratio.trim();
        if !resolved.supported_aspect_ratios.contains(&aspect_ratio) {
            errors.push(ValidationError {
                field: "aspect_ratio",
                message: format!(
                    "Invalid aspect ratio '{}'. Valid options for {}: {}",
                    aspect_ratio,
                    resolved.id,
                    resolved.supported_aspect_ratios.join(", ")
                ),
            });
        }

        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(Error::invalid_request(messages.join("; ")));
        }

        Ok(Self {
            prompt: prompt.to_string(),
            negative_prompt: None,
            image: None,
            model: resolved,
            aspect_ratio: aspect_ratio.to_string(),
            output_dir: output_dir.into(),
        })
    }

    /// Attach a negative prompt; blank values are dropped.
    pub fn with_negative_prompt(mut self, negative_prompt: Option<String>) -> Self {
        self.negative_prompt = negative_prompt
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self
    }

    /// Attach a first-frame image.
    ///
    /// # Errors
    /// Returns `Error::InvalidRequest` if the model does not accept images.
    pub fn with_image(mut self, image: ResolvedImage) -> Result<Self, Error> {
        if !self.model.supports_image_input {
            return Err(Error::invalid_request(format!(
                "model {} does not accept a source image",
                self.model.id
            )));
        }
        self.image = Some(image);
        Ok(self)
    }
}

/// Submits validated requests to the provider.
#[derive(Clone)]
pub struct GenerationClient {
    provider: Arc<dyn VideoProvider>,
}

impl GenerationClient {
    pub fn new(provider: Arc<dyn VideoProvider>) -> Self {
        Self { provider }
    }

    /// Start a generation. Never retried.
    #[instrument(level = "info", skip(self, request), fields(model = %request.model.id, aspect_ratio = %request.aspect_ratio))]
    pub async fn submit(&self, request: &GenerationRequest) -> Result<OperationHandle, Error> {
        info!(
            has_image = request.image.is_some(),
            has_negative_prompt = request.negative_prompt.is_some(),
            "Submitting generation request"
        );
        self.provider.submit(request).await
    }
}
