pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, EmbeddingConfig, ImageConfig, LlmBackendKind, LlmConfig, OpenAiConfig,
    PathsConfig, PreprocessingConfig, ServerConfig, VectorStoreConfig,
};

/// Get the default base directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
