//! Veo model definitions and registry.
//!
//! This module provides static model definitions and a registry for resolving
//! model names and aliases to their full definitions. Only models listed here
//! are ever sent to the generation provider.

use serde::Serialize;

/// Veo model definition.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VeoModel {
    /// Full model identifier
    pub id: &'static str,
    /// Model aliases for convenience
    #[serde(skip)]
    pub aliases: &'static [&'static str],
    /// Supported aspect ratios
    pub supported_aspect_ratios: &'static [&'static str],
    /// Whether the model accepts a source image
    pub supports_image_input: bool,
    /// Whether the model generates an audio track
    pub supports_audio: bool,
    /// Whether this is a reduced-latency variant
    pub fast: bool,
}

/// Veo 3.0 Generate Preview model
pub const VEO_3_0_GENERATE_PREVIEW: VeoModel = VeoModel {
    id: "veo-3.0-generate-preview",
    aliases: &["veo-3", "veo-3.0", "veo3", "veo-3-preview"],
    supported_aspect_ratios: &["16:9", "9:16"],
    supports_image_input: true,
    supports_audio: true,
    fast: false,
};

/// Veo 3.0 Fast Generate Preview model
pub const VEO_3_0_FAST_GENERATE_PREVIEW: VeoModel = VeoModel {
    id: "veo-3.0-fast-generate-preview",
    aliases: &["veo-3-fast", "veo-3.0-fast", "veo3-fast", "veo-3-fast-preview"],
    supported_aspect_ratios: &["16:9", "9:16"],
    supports_image_input: true,
    supports_audio: true,
    fast: true,
};

/// Veo 3.0 Generate model (stable)
pub const VEO_3_0_GENERATE_001: VeoModel = VeoModel {
    id: "veo-3.0-generate-001",
    aliases: &["veo-3-stable"],
    supported_aspect_ratios: &["16:9", "9:16"],
    supports_image_input: true,
    supports_audio: true,
    fast: false,
};

/// Veo 3.0 Fast Generate model (stable)
pub const VEO_3_0_FAST_GENERATE_001: VeoModel = VeoModel {
    id: "veo-3.0-fast-generate-001",
    aliases: &["veo-3-fast-stable"],
    supported_aspect_ratios: &["16:9", "9:16"],
    supports_image_input: true,
    supports_audio: true,
    fast: true,
};

/// Veo 2.0 Generate model (stable)
pub const VEO_2_0_GENERATE_001: VeoModel = VeoModel {
    id: "veo-2.0-generate-001",
    aliases: &["veo-2", "veo-2.0", "veo2"],
    supported_aspect_ratios: &["16:9", "9:16"],
    supports_image_input: true,
    supports_audio: false,
    fast: false,
};

/// All available Veo models
pub const VEO_MODELS: &[VeoModel] = &[
    VEO_3_0_GENERATE_PREVIEW,
    VEO_3_0_FAST_GENERATE_PREVIEW,
    VEO_3_0_GENERATE_001,
    VEO_3_0_FAST_GENERATE_001,
    VEO_2_0_GENERATE_001,
];

/// Default model used when a tool call does not name one.
pub const DEFAULT_MODEL: &str = VEO_3_0_GENERATE_PREVIEW.id;

/// Aspect ratios accepted by every Veo model.
pub const VALID_ASPECT_RATIOS: &[&str] = &["16:9", "9:16"];

/// Default aspect ratio.
pub const DEFAULT_ASPECT_RATIO: &str = "16:9";

/// Model registry for resolution and listing.
pub struct ModelRegistry;

impl ModelRegistry {
    /// Resolve a Veo model name or alias to full model definition.
    ///
    /// Accepts either the canonical model ID (e.g., "veo-3.0-generate-preview")
    /// or any of its aliases (e.g., "veo-3", "veo3").
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_veo3_common::models::ModelRegistry;
    ///
    /// assert!(ModelRegistry::resolve_veo("veo-3.0-fast-generate-preview").is_some());
    /// assert!(ModelRegistry::resolve_veo("veo-3-fast").is_some());
    /// assert!(ModelRegistry::resolve_veo("sora").is_none());
    /// ```
    pub fn resolve_veo(name: &str) -> Option<&'static VeoModel> {
        let name = name.trim();
        VEO_MODELS
            .iter()
            .find(|model| model.id == name || model.aliases.contains(&name))
    }

    /// List all available Veo models.
    pub fn list_veo_models() -> &'static [VeoModel] {
        VEO_MODELS
    }

    /// Comma-separated canonical IDs, for error messages.
    pub fn veo_model_ids() -> String {
        VEO_MODELS
            .iter()
            .map(|m| m.id)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
