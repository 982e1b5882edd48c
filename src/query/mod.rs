//! Question answering over a built index.


use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::llm::{GenerationOptions, LanguageModel};
use crate::store::{ChunkMetadata, IndexManifest, PersistedDocumentStore, VectorIndex};
use crate::{RagError, Result};

pub const NO_INFORMATION_ANSWER: &str =
    "I couldn't find any relevant information in the scientific papers to answer your question.";

const CONTEXT_RULE_WIDTH: usize = 50;

/// Attribution for one retrieved chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub title: String,
    pub filename: String,
    pub chunk_id: usize,
    pub similarity_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedDocument {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub similarity_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub question: String,
    pub answer: String,
    pub sources: Vec<Source>,
    pub relevant_docs: Vec<RetrievedDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemStats {
    pub total_vectors: usize,
    pub total_documents: usize,
    pub embedding_dimension: usize,
    pub embedding_model: String,
    pub llm_model: String,
    pub index_location: String,
}

/// Loaded retrieval state plus the models needed to answer questions.
///
/// Open one per process and share it by reference or `Arc`.
pub struct QueryEngine {
    config: Config,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    vector_index: VectorIndex,
    document_store: PersistedDocumentStore,
    manifest: Option<IndexManifest>,
}

impl std::fmt::Debug for QueryEngine {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("vectors", &self.vector_index.len())
            .field("embedding_model", &self.embedder.model_name())
            .field("llm", &self.llm.identifier())
            .finish_non_exhaustive()
    }
}

impl QueryEngine {
    /// Load the persisted vector index and document store under the configured base
    /// directory. Both must be present and agree on their length.
    #[inline]
    pub async fn open(
        config: Config,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let index_path = config.vector_index_path();
        let store_path = config.document_store_path();

        match (index_path.exists(), store_path.exists()) {
            (true, true) => {}
            (false, false) => {
                return Err(RagError::IndexNotBuilt(format!(
                    "no index found under {}",
                    config.embeddings_dir().display()
                )));
            }
            (true, false) => return Err(one_missing(&store_path, &index_path)),
            (false, true) => return Err(one_missing(&index_path, &store_path)),
        }

        let vector_index = VectorIndex::load(&index_path)?;
        let document_store =
            PersistedDocumentStore::open(&store_path, config.vector_store.lru_cache_size).await?;

        if vector_index.len() != document_store.len() {
            return Err(RagError::IndexCorrupted(format!(
                "vector index holds {} vectors but document store holds {} records",
                vector_index.len(),
                document_store.len()
            )));
        }

        let manifest = load_manifest(&config.manifest_path());
        if let Some(manifest) = &manifest {
            if manifest.embedding_model != embedder.model_name() {
                warn!(
                    "Index was built with embedding model '{}' but '{}' is configured",
                    manifest.embedding_model,
                    embedder.model_name()
                );
            }
        }

        info!(
            "Loaded index with {} vectors from {}",
            vector_index.len(),
            index_path.display()
        );

        Ok(Self {
            config,
            embedder,
            llm,
            vector_index,
            document_store,
            manifest,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vector_index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vector_index.is_empty()
    }

    #[inline]
    pub fn manifest(&self) -> Option<&IndexManifest> {
        self.manifest.as_ref()
    }

    #[inline]
    pub fn clear_cache(&self) {
        self.document_store.clear_cache();
    }

    /// Top-`k` chunks for `question`, most similar first.
    #[inline]
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        if self.vector_index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let embedder = Arc::clone(&self.embedder);
        let texts = vec![question.to_string()];
        let query = tokio::task::spawn_blocking(move || embedder.embed(&texts))
            .await
            .map_err(|e| anyhow::anyhow!("Embedding task failed: {}", e))?
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?
            .pop()
            .ok_or_else(|| RagError::Embedding("no vector returned for the question".to_string()))?;

        let hits = self.vector_index.search(&query, k)?;

        let mut documents = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.document_store.get(hit.vector_id).await? {
                Some(record) => documents.push(RetrievedDocument {
                    content: record.content,
                    metadata: record.metadata,
                    similarity_score: hit.score,
                }),
                None => warn!(
                    "Vector {} has no document record, skipping",
                    hit.vector_id
                ),
            }
        }

        debug!("Retrieved {} documents for question", documents.len());
        Ok(documents)
    }

    /// Retrieve context for `question` and generate an answer from it.
    ///
    /// Language model failures are reported inside `answer` rather than as errors.
    #[inline]
    pub async fn ask(&self, question: &str, k: usize) -> Result<QueryResult> {
        info!("Processing question: {}", question);

        let relevant_docs = self.retrieve(question, k).await?;
        if relevant_docs.is_empty() {
            return Ok(QueryResult {
                question: question.to_string(),
                answer: NO_INFORMATION_ANSWER.to_string(),
                sources: Vec::new(),
                relevant_docs,
            });
        }

        let prompt = build_prompt(question, &format_context(&relevant_docs));
        let options = GenerationOptions::from(&self.config.llm);
        let llm = Arc::clone(&self.llm);

        let answer = match tokio::task::spawn_blocking(move || llm.generate(&prompt, &options)).await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                error!("Error querying language model: {:#}", e);
                format!("Error generating response: {}", e)
            }
            Err(e) => {
                error!("Language model task failed: {}", e);
                format!("Error generating response: {}", e)
            }
        };

        Ok(QueryResult {
            question: question.to_string(),
            answer,
            sources: dedup_sources(&relevant_docs),
            relevant_docs,
        })
    }

    #[inline]
    pub fn stats(&self) -> SystemStats {
        SystemStats {
            total_vectors: self.vector_index.len(),
            total_documents: self.manifest.as_ref().map_or(0, |m| m.total_documents),
            embedding_dimension: self.vector_index.dimension().unwrap_or(0),
            embedding_model: self.embedder.model_name().to_string(),
            llm_model: self.llm.identifier(),
            index_location: self.config.vector_index_path().display().to_string(),
        }
    }

    #[inline]
    pub async fn close(&self) {
        self.document_store.close().await;
    }
}

fn one_missing(missing: &Path, present: &Path) -> RagError {
    RagError::IndexCorrupted(format!(
        "{} exists but {} is missing",
        present.display(),
        missing.display()
    ))
}

fn load_manifest(path: &Path) -> Option<IndexManifest> {
    if !path.exists() {
        warn!("Processed documents manifest not found at {}", path.display());
        return None;
    }
    match IndexManifest::load(path) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            warn!("Ignoring unreadable manifest: {}", e);
            None
        }
    }
}

/// Number each document and separate the block from the prompt with a rule.
#[inline]
pub fn format_context(documents: &[RetrievedDocument]) -> String {
    let parts: Vec<String> = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            format!(
                "Document {} (from {} - {}):\n{}\n",
                i + 1,
                doc.metadata.source.title,
                doc.metadata.source.filename,
                doc.content
            )
        })
        .collect();

    format!("\n{}{}", "=".repeat(CONTEXT_RULE_WIDTH), parts.join("\n"))
}

#[inline]
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a helpful AI assistant specialized in answering questions about scientific papers. Use the provided context from relevant scientific papers to answer the user's question accurately and comprehensively.

Context from relevant papers:
{context}

User Question: {question}

Instructions:
- Base your answer primarily on the provided context
- If the context doesn't contain enough information, clearly state what's missing
- Cite specific papers when referencing information (use titles or filenames)
- Provide detailed, well-structured answers
- If asked about methodology, results, or conclusions, be specific and accurate

Answer:"
    )
}

/// One source per distinct (title, filename, chunk id, score), first occurrence first.
#[inline]
pub fn dedup_sources(documents: &[RetrievedDocument]) -> Vec<Source> {
    let mut sources: Vec<Source> = Vec::with_capacity(documents.len());
    for doc in documents {
        let source = Source {
            title: doc.metadata.source.title.clone(),
            filename: doc.metadata.source.filename.clone(),
            chunk_id: doc.metadata.chunk_id,
            similarity_score: doc.similarity_score,
        };
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    sources
}
