//! Persistent retrieval state.
//!
//! The vector index and the document store are two parallel, append-only sequences:
//! vector `i` always describes `document_store[i]`. Every write path in the crate goes
//! through [`crate::builder::IndexBuilder`], which appends to both in lockstep.

pub mod cache;
pub mod document_store;
pub mod manifest;
pub mod vector_index;

use serde::{Deserialize, Serialize};

pub use cache::LruCache;
pub use document_store::{DocumentStore, PersistedDocumentStore};
pub use manifest::{DocumentSummary, IndexManifest};
pub use vector_index::{SearchHit, VectorIndex};

use crate::embeddings::chunking::char_len;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    ImageDescription,
}

/// Provenance shared by every chunk cut from one source document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceMetadata {
    pub filename: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    pub file_path: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    #[serde(flatten)]
    pub source: SourceMetadata,
    pub chunk_id: usize,
    pub total_chunks: usize,
    pub chunk_length: usize,
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_dimensions: Option<(u32, u32)>,
}

impl ChunkMetadata {
    #[inline]
    pub fn text(
        source: SourceMetadata,
        chunk_id: usize,
        total_chunks: usize,
        content: &str,
    ) -> Self {
        Self {
            source,
            chunk_id,
            total_chunks,
            chunk_length: char_len(content),
            content_type: ContentType::Text,
            page_number: None,
            image_index: None,
            image_format: None,
            image_dimensions: None,
        }
    }

    #[inline]
    pub fn is_image_description(&self) -> bool {
        self.content_type == ContentType::ImageDescription
    }
}

/// The atomic retrievable unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkRecord {
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Position in the document store, assigned on append. Equal to the vector id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faiss_id: Option<usize>,
}

impl ChunkRecord {
    #[inline]
    pub fn new(content: String, metadata: ChunkMetadata) -> Self {
        Self {
            content,
            metadata,
            faiss_id: None,
        }
    }
}
