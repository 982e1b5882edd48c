//! Interchangeable answer-generation backends.

#[cfg(test)]
mod tests;

pub mod llama_cpp;
pub mod ollama;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::{Config, LlmBackendKind, LlmConfig};
use crate::embeddings::OllamaClient;
use crate::{RagError, Result};

pub use llama_cpp::LlamaCppModel;
pub use ollama::OllamaModel;
pub use openai::OpenAiModel;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl From<&LlmConfig> for GenerationOptions {
    #[inline]
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// A text-in, text-out language model.
pub trait LanguageModel: Send + Sync {
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> anyhow::Result<String>;

    /// Human-readable `"<backend>: <model>"` label.
    fn identifier(&self) -> String;
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Failed to run {binary}: {message}")]
    Process { binary: String, message: String },
    #[error("Model returned an empty response")]
    EmptyResponse,
}

/// Pick the backend named by `llm.backend`.
///
/// Missing credentials or model files fail here, before any question is asked.
#[inline]
pub fn from_config(config: &Config) -> Result<Arc<dyn LanguageModel>> {
    let llm = &config.llm;
    let model: Arc<dyn LanguageModel> = match llm.backend {
        LlmBackendKind::Ollama => {
            let client = OllamaClient::new(&config.embeddings)?
                .with_timeout(Duration::from_secs(llm.timeout_seconds));
            Arc::new(OllamaModel::new(client, llm.model.clone()))
        }
        LlmBackendKind::LlamaCpp => {
            let model_path = llm.model_path.clone().ok_or_else(|| {
                RagError::Config("llm.model_path must be set for the llama_cpp backend".to_string())
            })?;
            if !model_path.is_file() {
                return Err(RagError::Config(format!(
                    "llama.cpp model file not found: {}",
                    model_path.display()
                )));
            }
            Arc::new(LlamaCppModel::new(
                llm.llama_cpp_binary.clone(),
                model_path,
                llm.context_window,
            ))
        }
        LlmBackendKind::Openai => {
            let api_key = resolve_api_key(
                config.openai.api_key.as_deref(),
                std::env::var(OPENAI_API_KEY_ENV).ok(),
            )
            .ok_or_else(|| {
                RagError::Config(format!(
                    "OpenAI backend selected but no API key configured; set openai.api_key or {}",
                    OPENAI_API_KEY_ENV
                ))
            })?;
            Arc::new(OpenAiModel::new(
                &config.openai.base_url,
                api_key,
                llm.model.clone(),
                Duration::from_secs(llm.timeout_seconds),
            )?)
        }
    };

    info!("Using language model {}", model.identifier());
    Ok(model)
}

/// The configured key wins over the environment. Blank values count as unset.
#[inline]
pub fn resolve_api_key(configured: Option<&str>, from_env: Option<String>) -> Option<String> {
    configured
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(ToString::to_string)
        .or_else(|| {
            from_env
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
        })
}
