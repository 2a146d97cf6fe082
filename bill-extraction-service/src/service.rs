mod pipeline;
mod prompts;

pub use pipeline::ExtractionOutcome;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::ServiceResult;
use crate::ingestion::IngestionService;
use crate::model::ExtractionModel;
use crate::ollama::OllamaClient;

/// Main service coordinator
pub struct ExtractionService<M = OllamaClient> {
    config: Arc<AppConfig>,
    ingestion: IngestionService,
    model: M,
}

impl ExtractionService<OllamaClient> {
    /// Create a service backed by the configured Ollama server
    pub async fn new(config: Arc<AppConfig>) -> ServiceResult<Self> {
        info!("Initializing bill extraction service");

        let model = OllamaClient::new(config.model.clone())?;

        if model.health_check().await {
            info!(url = %config.model.base_url, model = %config.model.model, "Model server is available");
        } else {
            warn!(url = %config.model.base_url, "Model server is not available");
        }

        Self::with_model(config, model)
    }
}

impl<M: ExtractionModel> ExtractionService<M> {
    pub fn with_model(config: Arc<AppConfig>, model: M) -> ServiceResult<Self> {
        let ingestion = IngestionService::new(config.acquisition.clone())?;

        Ok(Self {
            config,
            ingestion,
            model,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}
