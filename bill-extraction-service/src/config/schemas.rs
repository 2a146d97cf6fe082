//! Configuration section structs.

use serde::Deserialize;
use std::time::Duration;

use super::defaults::*;

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Multimodal model server configuration (Ollama-compatible `/api/chat`)
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_url")]
    pub base_url: String,

    /// Vision-capable model used for every crop
    #[serde(default = "default_model_name")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_top_k")]
    pub top_k: u32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ModelConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Document download and rasterization
#[derive(Debug, Clone, Deserialize)]
pub struct AcquisitionConfig {
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_max_document_size")]
    pub max_document_size_bytes: u64,

    /// Resolution PDF pages are rendered at
    #[serde(default = "default_render_dpi")]
    pub render_dpi: u16,

    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Accept local paths and `file://` URLs as documents
    #[serde(default = "default_allow_local_paths")]
    pub allow_local_paths: bool,
}

/// Page cleanup applied before cropping
#[derive(Debug, Clone, Deserialize)]
pub struct PreprocessingConfig {
    /// Straighten pages rotated by half a degree or more
    #[serde(default = "default_deskew")]
    pub deskew: bool,

    /// Apply a 3x3 median filter
    #[serde(default = "default_denoise")]
    pub denoise: bool,

    /// 1.0 leaves contrast unchanged
    #[serde(default = "default_contrast_factor")]
    pub contrast_factor: f32,

    /// Gray level at or above which a pixel counts as margin
    #[serde(default = "default_margin_threshold")]
    pub margin_threshold: u8,

    /// Pixels of margin kept around the detected content
    #[serde(default = "default_margin_padding")]
    pub margin_padding: u32,
}

/// Crop generation and per-crop extraction
#[derive(Debug, Clone, Deserialize)]
pub struct CropConfig {
    #[serde(default = "default_column_splits")]
    pub column_splits: Vec<u32>,

    #[serde(default = "default_window_width")]
    pub window_width: u32,

    #[serde(default = "default_window_height")]
    pub window_height: u32,

    /// Fraction of a window shared with its neighbour (0.0-0.9)
    #[serde(default = "default_window_overlap")]
    pub window_overlap: f64,

    /// Column and window crops sent per page, in addition to the full page
    #[serde(default = "default_max_crops_per_page")]
    pub max_crops_per_page: usize,

    /// Model calls in flight per page
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Ask again with a simpler prompt when the full page yields no items
    #[serde(default = "default_retry_empty_full_page")]
    pub retry_empty_full_page: bool,
}
