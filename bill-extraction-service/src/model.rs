//! The seam between the pipeline and the multimodal model.

use std::future::Future;

use crate::bill::TokenUsage;
use crate::error::ModelError;

/// One image plus the instructions for reading it
#[derive(Debug, Clone)]
pub struct VisionPrompt {
    pub system: String,
    pub user: String,
    /// Base64-encoded PNG
    pub image_base64: String,
}

/// Raw reply text and what it cost
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub content: String,
    pub usage: TokenUsage,
}

/// A vision model that reads bill crops.
///
/// Implemented by [`crate::ollama::OllamaClient`]; tests substitute scripted models.
pub trait ExtractionModel: Send + Sync + 'static {
    fn extract(
        &self,
        prompt: VisionPrompt,
    ) -> impl Future<Output = Result<ModelReply, ModelError>> + Send;

    /// Whether the model server is reachable
    fn health_check(&self) -> impl Future<Output = bool> + Send;

    fn model_name(&self) -> &str;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted stand-in for the model server.

    use std::sync::Mutex;

    use super::*;

    type Script = dyn Fn(&VisionPrompt) -> Result<ModelReply, ModelError> + Send + Sync;

    pub(crate) struct ScriptedModel {
        script: Box<Script>,
        prompts: Mutex<Vec<String>>,
        healthy: bool,
    }

    impl ScriptedModel {
        pub(crate) fn new(
            script: impl Fn(&VisionPrompt) -> Result<ModelReply, ModelError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                script: Box::new(script),
                prompts: Mutex::new(Vec::new()),
                healthy: true,
            }
        }

        pub(crate) fn unhealthy(mut self) -> Self {
            self.healthy = false;
            self
        }

        /// User prompts received so far, in call order
        pub(crate) fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl ExtractionModel for ScriptedModel {
        async fn extract(&self, prompt: VisionPrompt) -> Result<ModelReply, ModelError> {
            self.prompts.lock().unwrap().push(prompt.user.clone());
            (self.script)(&prompt)
        }

        async fn health_check(&self) -> bool {
            self.healthy
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    /// Crop id quoted in a crop prompt, e.g. `p1_col2_1`
    pub(crate) fn crop_id(prompt: &VisionPrompt) -> Option<&str> {
        let rest = prompt.user.split_once("crop \"")?.1;
        rest.split_once('"').map(|(id, _)| id)
    }

    pub(crate) fn reply(content: &str) -> Result<ModelReply, ModelError> {
        Ok(ModelReply {
            content: content.to_string(),
            usage: TokenUsage::new(100, 10),
        })
    }
}
