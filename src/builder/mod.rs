//! Batch construction of the retrieval index from a directory of PDFs.
//!
//! A build discovers PDFs, validates and extracts each one, chunks the cleaned text,
//! adds image-description chunks, and embeds chunks in batches. Every successful batch
//! is appended to the vector index and the document store together, so vector `i`
//! always describes record `i`. The finished index, store and manifest replace any
//! previous build.


use indicatif::{ProgressBar, ProgressStyle};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::embeddings::{Embedder, OllamaClient, chunk_document};
use crate::extraction::{
    ImageProcessor, TextExtractor, discover_pdfs, preprocess_text, source_metadata, validate_pdf,
};
use crate::store::{
    ChunkRecord, DocumentStore, DocumentSummary, IndexManifest, SourceMetadata, VectorIndex,
};
use crate::{RagError, Result};

/// Already-extracted input for one source document.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub metadata: SourceMetadata,
    /// Preprocessed text. Empty when extraction produced nothing.
    pub text: String,
    /// Image-description chunks, numbered among themselves.
    pub image_chunks: Vec<ChunkRecord>,
}

impl SourceDocument {
    #[inline]
    pub fn text(metadata: SourceMetadata, text: impl Into<String>) -> Self {
        Self {
            metadata,
            text: text.into(),
            image_chunks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub documents_found: usize,
    /// Documents whose chunks made it into the index.
    pub documents_indexed: usize,
    /// Files that failed PDF validation or could not be processed.
    pub documents_skipped: usize,
    /// Documents that produced no chunks at all.
    pub documents_empty: usize,
    /// Documents lost because their embedding batch failed.
    pub documents_failed: usize,
    pub text_extraction_failures: usize,
    pub text_chunks: usize,
    pub image_chunks: usize,
    pub batches_embedded: usize,
    pub batches_failed: usize,
}

impl BuildStats {
    #[inline]
    pub fn total_chunks(&self) -> usize {
        self.text_chunks + self.image_chunks
    }
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub stats: BuildStats,
    pub manifest: IndexManifest,
}

#[derive(Debug, Clone)]
pub enum BuildOutcome {
    /// No eligible input documents; nothing was written.
    NothingToDo,
    Built(BuildReport),
}

/// Validation, extraction and image description for one PDF. Runs on the blocking pool.
struct PdfPipeline {
    extractor: TextExtractor,
    image_processor: Option<ImageProcessor>,
    config: Config,
}

struct LoadedPdf {
    document: SourceDocument,
    text_extracted: bool,
}

impl PdfPipeline {
    fn load(&self, path: &Path) -> Result<LoadedPdf> {
        validate_pdf(path).map_err(|e| RagError::Extraction(format!("{:#}", e)))?;
        let metadata = source_metadata(path)?;

        let (text, text_extracted) = match self.extractor.extract(path) {
            Some(extracted) => (
                preprocess_text(&extracted.text, &self.config.preprocessing),
                true,
            ),
            None => (String::new(), false),
        };

        let image_chunks = self.image_processor.as_ref().map_or_else(Vec::new, |processor| {
            processor.image_chunks(path, &metadata, self.config.chunking.min_chunk_size)
        });

        Ok(LoadedPdf {
            document: SourceDocument {
                metadata,
                text,
                image_chunks,
            },
            text_extracted,
        })
    }
}

/// Single-use builder for one index. Not safe to run concurrently with another build
/// over the same base directory.
pub struct IndexBuilder {
    config: Config,
    embedder: Arc<dyn Embedder>,
    extractor: TextExtractor,
    image_processor: Option<ImageProcessor>,
    vector_index: VectorIndex,
    document_store: DocumentStore,
    pending: Vec<ChunkRecord>,
    pending_documents: usize,
    stats: BuildStats,
}

impl std::fmt::Debug for IndexBuilder {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuilder")
            .field("embedding_model", &self.embedder.model_name())
            .field("indexed", &self.document_store.len())
            .field("pending", &self.pending.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl IndexBuilder {
    #[inline]
    pub fn new(config: Config, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            config,
            embedder,
            extractor: TextExtractor::new(),
            image_processor: None,
            vector_index: VectorIndex::new(),
            document_store: DocumentStore::new(),
            pending: Vec::new(),
            pending_documents: 0,
            stats: BuildStats::default(),
        }
    }

    /// Builder wired to the configured Ollama embedding model, plus the vision model
    /// when image processing is enabled.
    #[inline]
    pub fn from_config(config: Config) -> Result<Self> {
        let client = OllamaClient::new(&config.embeddings)?;
        let image_processor = config.images.enabled.then(|| {
            let vision_client = client
                .clone()
                .with_timeout(Duration::from_secs(config.llm.timeout_seconds));
            ImageProcessor::ollama(config.images.clone(), vision_client)
        });

        let mut builder = Self::new(config, Arc::new(client));
        builder.image_processor = image_processor;
        Ok(builder)
    }

    #[inline]
    pub fn with_image_processor(mut self, processor: ImageProcessor) -> Self {
        self.image_processor = Some(processor);
        self
    }

    #[inline]
    pub fn with_text_extractor(mut self, extractor: TextExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    #[inline]
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Index every PDF under `papers_dir` and persist the result.
    #[inline]
    pub async fn build_from_directory(mut self, papers_dir: &Path) -> Result<BuildOutcome> {
        let pdfs = discover_pdfs(papers_dir);
        if pdfs.is_empty() {
            info!("No PDF files found in {}", papers_dir.display());
            return Ok(BuildOutcome::NothingToDo);
        }

        info!("Found {} PDF files in {}", pdfs.len(), papers_dir.display());
        self.stats.documents_found = pdfs.len();

        let pipeline = Arc::new(PdfPipeline {
            extractor: std::mem::take(&mut self.extractor),
            image_processor: self.image_processor.take(),
            config: self.config.clone(),
        });

        let bar = progress_bar(pdfs.len() as u64);
        for path in pdfs {
            bar.set_message(
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );

            let task_pipeline = Arc::clone(&pipeline);
            let task_path = path.clone();
            let loaded = tokio::task::spawn_blocking(move || task_pipeline.load(&task_path)).await;

            match loaded {
                Ok(Ok(loaded)) => {
                    if !loaded.text_extracted {
                        self.stats.text_extraction_failures += 1;
                        warn!("No text could be extracted from {}", path.display());
                    }
                    self.ingest(loaded.document).await;
                }
                Ok(Err(e)) => {
                    warn!("Skipping invalid PDF {}: {}", path.display(), e);
                    self.stats.documents_skipped += 1;
                }
                Err(e) => {
                    warn!("Skipping {} after processing failed: {}", path.display(), e);
                    self.stats.documents_skipped += 1;
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        if self.stats.documents_skipped == self.stats.documents_found {
            warn!("None of the discovered files are readable PDFs");
            return Ok(BuildOutcome::NothingToDo);
        }

        self.finish().await.map(BuildOutcome::Built)
    }

    /// Chunk `document` and queue its chunks, flushing when the batch threshold is reached.
    #[inline]
    pub async fn ingest(&mut self, document: SourceDocument) {
        let mut chunks = chunk_document(&document.text, &document.metadata, &self.config.chunking);
        chunks.extend(document.image_chunks);

        if chunks.is_empty() {
            warn!("{} produced no chunks", document.metadata.filename);
            self.stats.documents_empty += 1;
            return;
        }

        debug!(
            "Queued {} chunks from {}",
            chunks.len(),
            document.metadata.filename
        );
        self.pending.extend(chunks);
        self.pending_documents += 1;

        if self.pending.len() >= self.config.vector_store.batch_threshold.max(1) {
            self.flush_isolated().await;
        }
    }

    /// Embed the queued chunks and append them to both stores.
    ///
    /// On failure neither store changes and the queued documents are counted as failed.
    #[inline]
    pub async fn flush(&mut self) -> Result<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let batch = std::mem::take(&mut self.pending);
        let documents = std::mem::take(&mut self.pending_documents);
        let image_chunks = batch
            .iter()
            .filter(|c| c.metadata.is_image_description())
            .count();
        let total = batch.len();

        match self.embed_and_append(batch).await {
            Ok(()) => {
                self.stats.documents_indexed += documents;
                self.stats.image_chunks += image_chunks;
                self.stats.text_chunks += total - image_chunks;
                self.stats.batches_embedded += 1;
                info!(
                    "Indexed batch of {} chunks, {} total",
                    total,
                    self.document_store.len()
                );
                Ok(total)
            }
            Err(e) => {
                self.stats.documents_failed += documents;
                self.stats.batches_failed += 1;
                Err(e)
            }
        }
    }

    async fn flush_isolated(&mut self) {
        if let Err(e) = self.flush().await {
            error!("Dropping embedding batch: {}", e);
        }
    }

    async fn embed_and_append(&mut self, batch: Vec<ChunkRecord>) -> Result<()> {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let embedder = Arc::clone(&self.embedder);
        let vectors = tokio::task::spawn_blocking(move || embedder.embed(&texts))
            .await
            .map_err(|e| anyhow::anyhow!("Embedding task failed: {}", e))?
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        // Validates every vector before storing any of them
        self.vector_index.add(&vectors)?;
        for chunk in batch {
            self.document_store.append(chunk);
        }
        debug_assert_eq!(self.vector_index.len(), self.document_store.len());

        Ok(())
    }

    /// Flush what is left and persist the vector index, document store and manifest.
    #[inline]
    pub async fn finish(mut self) -> Result<BuildReport> {
        self.flush_isolated().await;

        if self.stats.batches_failed > 0 && self.document_store.is_empty() {
            return Err(RagError::Embedding(
                "every embedding batch failed; the previous index was left in place".to_string(),
            ));
        }

        let manifest = IndexManifest::new(
            summarize_documents(&self.document_store),
            self.document_store.len(),
            self.vector_index.dimension(),
            self.embedder.model_name().to_string(),
        );

        self.persist(&manifest).await?;

        info!(
            "Index built: {} chunks from {} documents",
            manifest.total_chunks, manifest.total_documents
        );
        Ok(BuildReport {
            stats: self.stats,
            manifest,
        })
    }

    async fn persist(&self, manifest: &IndexManifest) -> Result<()> {
        fs::create_dir_all(self.config.embeddings_dir())?;
        fs::create_dir_all(self.config.data_dir())?;

        let index_path = self.config.vector_index_path();
        let store_path = self.config.document_store_path();
        let manifest_path = self.config.manifest_path();

        let index_tmp = temp_path(&index_path);
        let store_tmp = temp_path(&store_path);
        let manifest_tmp = temp_path(&manifest_path);

        self.vector_index.save(&index_tmp)?;
        self.document_store.save(&store_tmp).await?;
        manifest.save(&manifest_tmp)?;

        fs::rename(&index_tmp, &index_path)?;
        fs::rename(&store_tmp, &store_path)?;
        fs::rename(&manifest_tmp, &manifest_path)?;

        debug!(
            "Persisted index to {} and {}",
            index_path.display(),
            store_path.display()
        );
        Ok(())
    }
}

/// One summary per source document, in store order. Chunks of a document are contiguous.
fn summarize_documents(store: &DocumentStore) -> Vec<DocumentSummary> {
    let mut summaries = Vec::new();
    let mut current: Vec<ChunkRecord> = Vec::new();

    for chunk in store.iter() {
        let same_document = current
            .last()
            .is_none_or(|last| last.metadata.source.file_path == chunk.metadata.source.file_path);
        if !same_document {
            summaries.extend(DocumentSummary::from_chunks(&current));
            current.clear();
        }
        current.push(chunk.clone());
    }
    summaries.extend(DocumentSummary::from_chunks(&current));

    summaries
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(OsString::new, ToOwned::to_owned);
    name.push(".tmp");
    path.with_file_name(name)
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new(len).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Indexing {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_length(len);
    bar
}

/// Delete the persisted index, document store and manifest. Returns how many files
/// were removed.
#[inline]
pub fn reset_index(config: &Config) -> Result<usize> {
    let mut removed = 0;
    for path in [
        config.vector_index_path(),
        config.document_store_path(),
        config.manifest_path(),
    ] {
        for candidate in [temp_path(&path), path] {
            if candidate.exists() {
                fs::remove_file(&candidate)?;
                info!("Removed {}", candidate.display());
                removed += 1;
            }
        }
    }
    Ok(removed)
}
