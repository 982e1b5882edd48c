#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::{Path, PathBuf};

use super::{Config, ConfigError, EmbeddingConfig, LlmBackendKind, LlmConfig};

#[inline]
pub fn run_interactive_config(base_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Paper RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(base_dir)?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure the Ollama instance used for embeddings and image descriptions.");
    eprintln!();

    configure_ollama(&mut config.embeddings)?;

    eprintln!();
    eprintln!("{}", style("Language Model").bold().yellow());
    configure_llm(&mut config.llm)?;

    eprintln!();
    config.images.enabled = Confirm::new()
        .with_prompt(format!(
            "Describe figures with the '{}' vision model?",
            config.images.vision_model
        ))
        .default(config.images.enabled)
        .interact()?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.embeddings) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before building the index.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embeddings:").bold().yellow());
    eprintln!("  Model: {}", style(&config.embeddings.model).cyan());
    eprintln!("  Batch Size: {}", style(config.embeddings.batch_size).cyan());
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Chunking:").bold().yellow());
    eprintln!("  Chunk Size: {}", style(config.chunking.chunk_size).cyan());
    eprintln!("  Overlap: {}", style(config.chunking.chunk_overlap).cyan());
    eprintln!(
        "  Min Chunk Size: {}",
        style(config.chunking.min_chunk_size).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Language Model:").bold().yellow());
    eprintln!("  Backend: {}", style(config.llm.identifier()).cyan());
    eprintln!("  Temperature: {}", style(config.llm.temperature).cyan());
    eprintln!("  Max Tokens: {}", style(config.llm.max_tokens).cyan());

    eprintln!();
    eprintln!("{}", style("Storage:").bold().yellow());
    eprintln!(
        "  Papers: {}",
        style(config.papers_dir().display()).cyan()
    );
    eprintln!(
        "  Index: {}",
        style(config.embeddings_dir().display()).cyan()
    );
    eprintln!(
        "  Image Descriptions: {}",
        if config.images.enabled {
            style("enabled").green()
        } else {
            style("disabled").dim()
        }
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}

fn load_existing_config(base_dir: &Path) -> Result<Config> {
    Config::load(base_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Ok(Config::with_base_dir(base_dir))
        },
        |config| {
            if config.config_file_path().exists() {
                eprintln!("{}", style("Found existing configuration.").green());
            }
            Ok(config)
        },
    )
}

fn configure_ollama(embeddings: &mut EmbeddingConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == embeddings.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(embeddings.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = EmbeddingConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..EmbeddingConfig::default()
            };
            temp_config.ollama_url()?;
            Ok(())
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(embeddings.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(embeddings.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(embeddings.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    embeddings.set_protocol(protocol)?;
    embeddings.set_host(host)?;
    embeddings.set_port(port)?;
    embeddings.set_model(model)?;
    embeddings.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_llm(llm: &mut LlmConfig) -> Result<()> {
    let backends: Vec<&str> = LlmBackendKind::ALL.iter().map(|b| b.as_str()).collect();
    let default_index = LlmBackendKind::ALL
        .iter()
        .position(|&b| b == llm.backend)
        .unwrap_or(0);

    let backend_index = Select::new()
        .with_prompt("Language model backend")
        .default(default_index)
        .items(&backends)
        .interact()?;
    llm.backend = LlmBackendKind::ALL[backend_index];

    match llm.backend {
        LlmBackendKind::LlamaCpp => {
            let current = llm
                .model_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            let path: String = Input::new()
                .with_prompt("Path to GGUF model file")
                .default(current)
                .validate_with(|input: &String| -> Result<(), &str> {
                    if Path::new(input).is_file() {
                        Ok(())
                    } else {
                        Err("Model file does not exist")
                    }
                })
                .interact_text()?;
            llm.model_path = Some(PathBuf::from(path));

            llm.llama_cpp_binary = Input::new()
                .with_prompt("llama.cpp executable")
                .default(llm.llama_cpp_binary.clone())
                .interact_text()?;
        }
        LlmBackendKind::Ollama | LlmBackendKind::Openai => {
            llm.model = Input::new()
                .with_prompt("Model name")
                .default(llm.model.clone())
                .validate_with(|input: &String| -> Result<(), &str> {
                    if input.trim().is_empty() {
                        Err("Model name cannot be empty")
                    } else {
                        Ok(())
                    }
                })
                .interact_text()?;
        }
    }

    let temperature: f32 = Input::new()
        .with_prompt("Temperature")
        .default(llm.temperature)
        .interact_text()?;
    llm.set_temperature(temperature)?;

    let max_tokens: u32 = Input::new()
        .with_prompt("Max tokens per answer")
        .default(llm.max_tokens)
        .interact_text()?;
    llm.set_max_tokens(max_tokens)?;

    if llm.backend == LlmBackendKind::Openai {
        eprintln!(
            "{}",
            style("Set OPENAI_API_KEY (or [openai] api_key) before asking questions.").dim()
        );
    }

    Ok(())
}

fn test_ollama_connection(embeddings: &EmbeddingConfig) -> bool {
    let url = format!(
        "{}://{}:{}/api/version",
        embeddings.protocol, embeddings.host, embeddings.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) => (400..500).contains(&code),
        Err(_) => false,
    }
}
