use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::ChunkRecord;
use crate::Result;
use crate::embeddings::chunking::char_len;

const PREVIEW_CHARS: usize = 200;

/// Per-document summary written to `processed_documents.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentSummary {
    pub filename: String,
    pub title: String,
    pub total_chunks: usize,
    pub total_length: usize,
    pub avg_chunk_length: usize,
    pub first_chunk_preview: String,
}

impl DocumentSummary {
    /// Summarize the chunks of one document. `None` when there are no chunks.
    #[inline]
    pub fn from_chunks(chunks: &[ChunkRecord]) -> Option<Self> {
        let first = chunks.first()?;
        let total_length: usize = chunks.iter().map(|c| char_len(&c.content)).sum();

        let mut first_chunk_preview: String = first.content.chars().take(PREVIEW_CHARS).collect();
        first_chunk_preview.push_str("...");

        Some(Self {
            filename: first.metadata.source.filename.clone(),
            title: first.metadata.source.title.clone(),
            total_chunks: chunks.len(),
            total_length,
            avg_chunk_length: total_length / chunks.len(),
            first_chunk_preview,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub total_documents: usize,
    pub total_chunks: usize,
    pub embedding_dimension: Option<usize>,
    pub embedding_model: String,
    #[serde(default)]
    pub built_at: Option<DateTime<Utc>>,
    pub documents: Vec<DocumentSummary>,
}

impl IndexManifest {
    #[inline]
    pub fn new(
        documents: Vec<DocumentSummary>,
        total_chunks: usize,
        embedding_dimension: Option<usize>,
        embedding_model: String,
    ) -> Self {
        Self {
            total_documents: documents.len(),
            total_chunks,
            embedding_dimension,
            embedding_model,
            built_at: Some(Utc::now()),
            documents,
        }
    }

    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
        Ok(())
    }

    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let manifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChunkMetadata, SourceMetadata};
    use tempfile::TempDir;

    fn chunks(contents: &[&str]) -> Vec<ChunkRecord> {
        let source = SourceMetadata {
            filename: "graph_networks_2020.pdf".to_string(),
            title: "graph networks".to_string(),
            year: Some("2020".to_string()),
            file_path: "/papers/graph_networks_2020.pdf".to_string(),
            file_size: 2048,
        };
        contents
            .iter()
            .enumerate()
            .map(|(i, content)| {
                ChunkRecord::new(
                    (*content).to_string(),
                    ChunkMetadata::text(source.clone(), i, contents.len(), content),
                )
            })
            .collect()
    }

    #[test]
    fn summary_aggregates_lengths() {
        let long = "x".repeat(250);
        let summary =
            DocumentSummary::from_chunks(&chunks(&[&long, "short"])).expect("should summarize");

        assert_eq!(summary.filename, "graph_networks_2020.pdf");
        assert_eq!(summary.total_chunks, 2);
        assert_eq!(summary.total_length, 255);
        assert_eq!(summary.avg_chunk_length, 127);
        assert_eq!(summary.first_chunk_preview, format!("{}...", "x".repeat(200)));

        assert!(DocumentSummary::from_chunks(&[]).is_none());
    }

    #[test]
    fn manifest_round_trip() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let path = temp_dir.path().join("processed_documents.json");

        let summary = DocumentSummary::from_chunks(&chunks(&["a chunk"])).expect("summary");
        let manifest = IndexManifest::new(vec![summary], 1, Some(768), "nomic".to_string());
        manifest.save(&path).expect("should save manifest");

        let loaded = IndexManifest::load(&path).expect("should load manifest");
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.total_documents, 1);
    }
}
