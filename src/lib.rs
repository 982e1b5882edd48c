use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index not built: {0}")]
    IndexNotBuilt(String),

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("Embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// True when the persisted index is absent or unusable and a rebuild would fix it.
    #[inline]
    pub fn is_missing_index(&self) -> bool {
        matches!(self, Self::IndexNotBuilt(_) | Self::IndexCorrupted(_))
    }
}

impl From<ConfigError> for RagError {
    #[inline]
    fn from(error: ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

pub mod builder;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod extraction;
pub mod llm;
pub mod query;
pub mod server;
pub mod store;

#[cfg(test)]
mod testing;
