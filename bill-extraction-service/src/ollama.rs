use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bill::TokenUsage;
use crate::config::ModelConfig;
use crate::error::{ModelError, ServiceError, ServiceResult};
use crate::model::{ExtractionModel, ModelReply, VisionPrompt};

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    config: ModelConfig,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: ModelConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                ServiceError::Model(ModelError::Connection {
                    url: config.base_url.clone(),
                    source: e,
                })
            })?;

        Ok(Self { client, config })
    }

    fn chat_request(&self, prompt: VisionPrompt) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(prompt.system),
                ChatMessage::user_with_image(prompt.user, prompt.image_base64),
            ],
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                top_k: self.config.top_k,
                num_predict: self.config.max_output_tokens,
            },
        }
    }
}

impl ExtractionModel for OllamaClient {
    /// Send one crop to `/api/chat` and return the reply text with token counts
    async fn extract(&self, prompt: VisionPrompt) -> Result<ModelReply, ModelError> {
        let url = format!("{}/api/chat", self.config.base_url.trim_end_matches('/'));
        let request = self.chat_request(prompt);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout {
                        secs: self.config.request_timeout_secs,
                    }
                } else {
                    ModelError::Connection {
                        url: url.clone(),
                        source: e,
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();

            if message.contains("model") && message.contains("not found") {
                return Err(ModelError::ModelNotFound {
                    model: self.config.model.clone(),
                });
            }

            return Err(ModelError::Generation { status, message });
        }

        let body = response.text().await.map_err(|e| ModelError::Connection {
            url: url.clone(),
            source: e,
        })?;
        let chat_response: OllamaChatResponse = serde_json::from_str(&body)
            .map_err(|source| ModelError::InvalidResponse { source })?;

        let usage = TokenUsage::new(
            chat_response.prompt_eval_count,
            chat_response.eval_count,
        );
        debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Model reply received"
        );

        Ok(ModelReply {
            content: chat_response.message.content,
            usage,
        })
    }

    /// Check if Ollama is available
    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url.trim_end_matches('/'));

        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Model server health check failed");
                false
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Base64-encoded images for vision models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            images: None,
        }
    }

    /// Create a user message with an image for vision models
    pub fn user_with_image(content: impl Into<String>, image_base64: String) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            images: Some(vec![image_base64]),
        }
    }
}

// Internal Ollama API types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}
