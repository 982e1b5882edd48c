
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;

const CONFIG_FILE_NAME: &str = "config.toml";
const BASE_DIR_NAME: &str = ".paper-rag";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub preprocessing: PreprocessingConfig,
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory scanned for PDFs. Relative paths resolve against the base directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub papers_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub remove_headers_footers: bool,
    pub remove_page_numbers: bool,
}

impl Default for PreprocessingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            remove_headers_footers: true,
            remove_page_numbers: true,
        }
    }
}

/// Ollama connection plus embedding model settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub retry_attempts: u32,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 32,
            retry_attempts: 3,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub similarity_search_k: usize,
    /// Number of buffered chunks that triggers an embed-and-append pass during a build.
    pub batch_threshold: usize,
    pub lru_cache_size: usize,
}

impl Default for VectorStoreConfig {
    #[inline]
    fn default() -> Self {
        Self {
            similarity_search_k: 5,
            batch_threshold: 100,
            lru_cache_size: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmBackendKind {
    #[default]
    Ollama,
    LlamaCpp,
    Openai,
}

impl LlmBackendKind {
    pub const ALL: [Self; 3] = [Self::Ollama, Self::LlamaCpp, Self::Openai];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::LlamaCpp => "llama_cpp",
            Self::Openai => "openai",
        }
    }
}

impl std::fmt::Display for LlmBackendKind {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: LlmBackendKind,
    /// Model name for the ollama and openai backends.
    pub model: String,
    /// GGUF model file for the llama_cpp backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
    pub llama_cpp_binary: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub context_window: u32,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    #[inline]
    fn default() -> Self {
        Self {
            backend: LlmBackendKind::Ollama,
            model: "llama2".to_string(),
            model_path: None,
            llama_cpp_binary: "llama-cli".to_string(),
            max_tokens: 2048,
            temperature: 0.1,
            context_window: 4096,
            timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OpenAiConfig {
    /// Falls back to the `OPENAI_API_KEY` environment variable when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for OpenAiConfig {
    #[inline]
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImageConfig {
    pub enabled: bool,
    pub vision_model: String,
    /// Streams smaller than this many bytes are treated as icons and skipped.
    pub min_image_size: usize,
    pub max_images_per_page: usize,
}

impl Default for ImageConfig {
    #[inline]
    fn default() -> Self {
        Self {
            enabled: true,
            vision_model: "llava".to_string(),
            min_image_size: 1000,
            max_images_per_page: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 3600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid chunk size: {0} (must be between 50 and 16384)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    InvalidChunkOverlap(usize, usize),
    #[error("Min chunk size ({0}) must not exceed chunk size ({1})")]
    InvalidMinChunkSize(usize, usize),
    #[error("Invalid similarity search k: {0} (must be between 1 and 200)")]
    InvalidSearchK(usize),
    #[error("Invalid batch threshold: {0} (must be between 1 and 10000)")]
    InvalidBatchThreshold(usize),
    #[error("Invalid LRU cache size: {0} (must be at most 100000)")]
    InvalidCacheSize(usize),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid max tokens: {0} (must be between 1 and 32768)")]
    InvalidMaxTokens(u32),
    #[error("Invalid context window: {0} (must be between 256 and 131072)")]
    InvalidContextWindow(u32),
    #[error("Invalid max images per page: {0} (must be at least 1)")]
    InvalidImagesPerPage(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default base directory, `~/.paper-rag`.
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(BASE_DIR_NAME))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Defaults rooted at `base_dir`, without touching the filesystem.
    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::with_base_dir(config_dir));
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embeddings.validate()?;
        self.validate_chunking_config()?;
        self.validate_vector_store_config()?;
        self.llm.validate()?;
        self.validate_image_config()?;

        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(self.server.port));
        }

        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(50..=16384).contains(&config.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }

        if config.chunk_overlap >= config.chunk_size {
            return Err(ConfigError::InvalidChunkOverlap(
                config.chunk_overlap,
                config.chunk_size,
            ));
        }

        if config.min_chunk_size > config.chunk_size {
            return Err(ConfigError::InvalidMinChunkSize(
                config.min_chunk_size,
                config.chunk_size,
            ));
        }

        Ok(())
    }

    fn validate_vector_store_config(&self) -> Result<(), ConfigError> {
        let config = &self.vector_store;

        if !(1..=200).contains(&config.similarity_search_k) {
            return Err(ConfigError::InvalidSearchK(config.similarity_search_k));
        }

        if !(1..=10_000).contains(&config.batch_threshold) {
            return Err(ConfigError::InvalidBatchThreshold(config.batch_threshold));
        }

        if config.lru_cache_size > 100_000 {
            return Err(ConfigError::InvalidCacheSize(config.lru_cache_size));
        }

        Ok(())
    }

    fn validate_image_config(&self) -> Result<(), ConfigError> {
        if !self.images.enabled {
            return Ok(());
        }

        if self.images.vision_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.images.vision_model.clone()));
        }

        if self.images.max_images_per_page == 0 {
            return Err(ConfigError::InvalidImagesPerPage(
                self.images.max_images_per_page,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.embeddings.ollama_url()
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    #[inline]
    pub fn papers_dir(&self) -> PathBuf {
        match &self.paths.papers_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.get_base_dir().join(dir),
            None => self.get_base_dir().join("papers"),
        }
    }

    /// Directory holding the vector index and document store
    #[inline]
    pub fn embeddings_dir(&self) -> PathBuf {
        self.get_base_dir().join("embeddings")
    }

    /// Directory holding the processed documents manifest
    #[inline]
    pub fn data_dir(&self) -> PathBuf {
        self.get_base_dir().join("data")
    }

    #[inline]
    pub fn vector_index_path(&self) -> PathBuf {
        self.embeddings_dir().join("vector_index.bin")
    }

    #[inline]
    pub fn document_store_path(&self) -> PathBuf {
        self.embeddings_dir().join("document_store.db")
    }

    #[inline]
    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir().join("processed_documents.json")
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        if !(1..=3600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = EmbeddingConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.ollama_url()?;
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    #[inline]
    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }
}

impl LlmConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend != LlmBackendKind::LlamaCpp && self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        if !(1..=32_768).contains(&self.max_tokens) {
            return Err(ConfigError::InvalidMaxTokens(self.max_tokens));
        }

        if !(256..=131_072).contains(&self.context_window) {
            return Err(ConfigError::InvalidContextWindow(self.context_window));
        }

        if !(1..=3600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    #[inline]
    pub fn set_temperature(&mut self, temperature: f32) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidTemperature(temperature));
        }
        self.temperature = temperature;
        Ok(())
    }

    #[inline]
    pub fn set_max_tokens(&mut self, max_tokens: u32) -> Result<(), ConfigError> {
        if !(1..=32_768).contains(&max_tokens) {
            return Err(ConfigError::InvalidMaxTokens(max_tokens));
        }
        self.max_tokens = max_tokens;
        Ok(())
    }

    /// Human readable `"<backend>: <model>"` label.
    #[inline]
    pub fn identifier(&self) -> String {
        match self.backend {
            LlmBackendKind::LlamaCpp => format!(
                "{}: {}",
                self.backend,
                self.model_path
                    .as_deref()
                    .map_or_else(|| "<unset>".into(), Path::to_string_lossy)
            ),
            LlmBackendKind::Ollama | LlmBackendKind::Openai => {
                format!("{}: {}", self.backend, self.model)
            }
        }
    }
}
