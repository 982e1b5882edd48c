
use anyhow::Result;

use super::{GenerationOptions, LanguageModel, LlmError};
use crate::embeddings::OllamaClient;
use crate::embeddings::ollama::{GenerateOptions, GenerateRequest};

/// Generation through a locally served Ollama model.
#[derive(Debug, Clone)]
pub struct OllamaModel {
    client: OllamaClient,
    model: String,
}

impl OllamaModel {
    #[inline]
    pub fn new(client: OllamaClient, model: String) -> Self {
        Self { client, model }
    }
}

impl LanguageModel for OllamaModel {
    #[inline]
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            images: Vec::new(),
            options: GenerateOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        let response = self.client.generate(&request)?;
        if response.is_empty() {
            return Err(LlmError::EmptyResponse.into());
        }
        Ok(response)
    }

    #[inline]
    fn identifier(&self) -> String {
        format!("ollama: {}", self.model)
    }
}
