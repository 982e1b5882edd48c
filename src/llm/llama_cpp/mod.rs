
use anyhow::Result;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

use super::{GenerationOptions, LanguageModel, LlmError};

/// Markers after which a completion has started writing the next conversation turn.
const STOP_SEQUENCES: [&str; 2] = ["Human:", "User:"];

/// Generation by running a local llama.cpp binary against a GGUF model file.
#[derive(Debug, Clone)]
pub struct LlamaCppModel {
    binary: String,
    model_path: PathBuf,
    context_window: u32,
}

impl LlamaCppModel {
    #[inline]
    pub fn new(binary: String, model_path: PathBuf, context_window: u32) -> Self {
        Self {
            binary,
            model_path,
            context_window,
        }
    }

    fn command(&self, prompt: &str, options: &GenerationOptions) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("-m")
            .arg(&self.model_path)
            .arg("-p")
            .arg(prompt)
            .arg("-n")
            .arg(options.max_tokens.to_string())
            .arg("--temp")
            .arg(options.temperature.to_string())
            .arg("-c")
            .arg(self.context_window.to_string())
            .arg("--no-display-prompt");
        command
    }
}

impl LanguageModel for LlamaCppModel {
    #[inline]
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        debug!(
            "Running {} with model {}",
            self.binary,
            self.model_path.display()
        );

        let output = self
            .command(prompt, options)
            .output()
            .map_err(|e| LlmError::Process {
                binary: self.binary.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(LlmError::Process {
                binary: self.binary.clone(),
                message: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }
            .into());
        }

        let text = truncate_at_stop(&String::from_utf8_lossy(&output.stdout))
            .trim()
            .to_string();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse.into());
        }
        Ok(text)
    }

    #[inline]
    fn identifier(&self) -> String {
        format!("llama_cpp: {}", self.model_path.display())
    }
}

/// Cut `text` at the earliest stop sequence.
#[inline]
pub fn truncate_at_stop(text: &str) -> &str {
    STOP_SEQUENCES
        .iter()
        .filter_map(|stop| text.find(stop))
        .min()
        .and_then(|end| text.get(..end))
        .unwrap_or(text)
}
