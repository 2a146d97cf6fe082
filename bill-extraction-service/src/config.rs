//! Service configuration.
//!
//! Everything is read once at startup; every field has a default so the
//! service runs without a config file.

mod defaults;
mod loader;
mod schemas;

use serde::Deserialize;

pub use loader::load_config;
pub use schemas::{AcquisitionConfig, CropConfig, ModelConfig, PreprocessingConfig, ServerConfig};

use defaults::{
    default_acquisition, default_crops, default_model, default_preprocessing, default_server,
};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_model")]
    pub model: ModelConfig,

    #[serde(default = "default_acquisition")]
    pub acquisition: AcquisitionConfig,

    #[serde(default = "default_preprocessing")]
    pub preprocessing: PreprocessingConfig,

    #[serde(default = "default_crops")]
    pub crops: CropConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            model: default_model(),
            acquisition: default_acquisition(),
            preprocessing: default_preprocessing(),
            crops: default_crops(),
        }
    }
}
