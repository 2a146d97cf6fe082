//! Default value functions for configuration.

use super::schemas::{
    AcquisitionConfig, CropConfig, ModelConfig, PreprocessingConfig, ServerConfig,
};

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8000
}

pub(crate) fn default_model() -> ModelConfig {
    ModelConfig {
        base_url: default_model_url(),
        model: default_model_name(),
        temperature: default_temperature(),
        top_p: default_top_p(),
        top_k: default_top_k(),
        max_output_tokens: default_max_output_tokens(),
        request_timeout_secs: default_request_timeout_secs(),
    }
}

pub(crate) fn default_model_url() -> String {
    "http://localhost:11434".to_string()
}

pub(crate) fn default_model_name() -> String {
    "qwen2.5vl:7b".to_string()
}

pub(crate) fn default_temperature() -> f32 {
    0.0
}

pub(crate) fn default_top_p() -> f32 {
    1.0
}

pub(crate) fn default_top_k() -> u32 {
    32
}

pub(crate) fn default_max_output_tokens() -> u32 {
    4096
}

pub(crate) fn default_request_timeout_secs() -> u64 {
    120
}

pub(crate) fn default_acquisition() -> AcquisitionConfig {
    AcquisitionConfig {
        download_timeout_secs: default_download_timeout_secs(),
        max_document_size_bytes: default_max_document_size(),
        render_dpi: default_render_dpi(),
        max_pages: default_max_pages(),
        allow_local_paths: default_allow_local_paths(),
    }
}

pub(crate) fn default_download_timeout_secs() -> u64 {
    30
}

pub(crate) fn default_max_document_size() -> u64 {
    104_857_600 // 100MB
}

pub(crate) fn default_render_dpi() -> u16 {
    300
}

pub(crate) fn default_max_pages() -> usize {
    50
}

pub(crate) fn default_allow_local_paths() -> bool {
    false
}

pub(crate) fn default_preprocessing() -> PreprocessingConfig {
    PreprocessingConfig {
        deskew: default_deskew(),
        denoise: default_denoise(),
        contrast_factor: default_contrast_factor(),
        margin_threshold: default_margin_threshold(),
        margin_padding: default_margin_padding(),
    }
}

pub(crate) fn default_deskew() -> bool {
    true
}

pub(crate) fn default_denoise() -> bool {
    true
}

pub(crate) fn default_contrast_factor() -> f32 {
    1.5
}

pub(crate) fn default_margin_threshold() -> u8 {
    240
}

pub(crate) fn default_margin_padding() -> u32 {
    10
}

pub(crate) fn default_crops() -> CropConfig {
    CropConfig {
        column_splits: default_column_splits(),
        window_width: default_window_width(),
        window_height: default_window_height(),
        window_overlap: default_window_overlap(),
        max_crops_per_page: default_max_crops_per_page(),
        concurrency: default_concurrency(),
        retry_empty_full_page: default_retry_empty_full_page(),
    }
}

pub(crate) fn default_column_splits() -> Vec<u32> {
    vec![2, 3, 4]
}

pub(crate) fn default_window_width() -> u32 {
    3000
}

pub(crate) fn default_window_height() -> u32 {
    800
}

pub(crate) fn default_window_overlap() -> f64 {
    0.2
}

pub(crate) fn default_max_crops_per_page() -> usize {
    10
}

pub(crate) fn default_concurrency() -> usize {
    4
}

pub(crate) fn default_retry_empty_full_page() -> bool {
    true
}
