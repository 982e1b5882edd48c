#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end build and query through the public API, with in-process models.

use paper_rag::builder::{BuildOutcome, IndexBuilder, SourceDocument, reset_index};
use paper_rag::config::Config;
use paper_rag::embeddings::Embedder;
use paper_rag::llm::{GenerationOptions, LanguageModel};
use paper_rag::query::{NO_INFORMATION_ANSWER, QueryEngine};
use paper_rag::store::SourceMetadata;
use std::sync::Arc;
use tempfile::TempDir;

const VOCABULARY: [&str; 8] = [
    "attention", "protein", "folding", "graph", "transformer", "galaxy", "neural", "climate",
];

/// One dimension per vocabulary word, plus one for everything else.
struct VocabularyEmbedder;

impl Embedder for VocabularyEmbedder {
    fn model_name(&self) -> &str {
        "vocabulary"
    }

    fn embed_raw(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; VOCABULARY.len() + 1];
                for word in text.split(|c: char| !c.is_alphanumeric()) {
                    let word = word.to_lowercase();
                    match VOCABULARY.iter().position(|v| *v == word) {
                        Some(i) => vector[i] += 1.0,
                        None => vector[VOCABULARY.len()] += 0.01,
                    }
                }
                vector
            })
            .collect())
    }
}

/// Answers with the first line of context it was given.
struct EchoModel;

impl LanguageModel for EchoModel {
    fn generate(&self, prompt: &str, _options: &GenerationOptions) -> anyhow::Result<String> {
        let first_document = prompt
            .lines()
            .skip_while(|line| !line.contains("Document 1 ("))
            .nth(1)
            .unwrap_or_default();
        Ok(format!("According to the papers: {}", first_document))
    }

    fn identifier(&self) -> String {
        "echo: test".to_string()
    }
}

fn paper(filename: &str, title: &str, year: &str) -> SourceMetadata {
    SourceMetadata {
        filename: filename.to_string(),
        title: title.to_string(),
        year: Some(year.to_string()),
        file_path: format!("/papers/{}", filename),
        file_size: 2048,
    }
}

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::with_base_dir(dir.path());
    config.chunking.chunk_size = 120;
    config.chunking.chunk_overlap = 20;
    config.chunking.min_chunk_size = 20;
    config.vector_store.batch_threshold = 3;
    config
}

async fn build_corpus(config: &Config) {
    let mut builder = IndexBuilder::new(config.clone(), Arc::new(VocabularyEmbedder));
    builder
        .ingest(SourceDocument::text(
            paper("attention_2017.pdf", "attention is all you need", "2017"),
            "The transformer relies entirely on attention.\n\nMulti-head attention attends to several positions at once.\n\nNo recurrence is needed in the transformer.",
        ))
        .await;
    builder
        .ingest(SourceDocument::text(
            paper("alphafold_2021.pdf", "alphafold", "2021"),
            "Protein folding is predicted from sequence.\n\nThe network reasons over a graph of residue pairs.",
        ))
        .await;
    builder
        .ingest(SourceDocument::text(
            paper("survey_2019.pdf", "galaxy survey", "2019"),
            "We catalogue every galaxy in the survey field.",
        ))
        .await;

    let report = builder.finish().await.expect("build should succeed");
    assert_eq!(report.manifest.total_documents, 3);
    assert_eq!(report.stats.documents_indexed, 3);
    assert_eq!(report.manifest.total_chunks, report.stats.total_chunks());
}

async fn open_engine(config: &Config) -> QueryEngine {
    QueryEngine::open(config.clone(), Arc::new(VocabularyEmbedder), Arc::new(EchoModel))
        .await
        .expect("engine should open")
}

#[tokio::test]
async fn build_then_ask() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    build_corpus(&config).await;

    let engine = open_engine(&config).await;
    let result = engine
        .ask("How does protein folding work?", 2)
        .await
        .expect("ask should succeed");

    assert_eq!(result.relevant_docs.len(), 2);
    assert_eq!(result.sources[0].filename, "alphafold_2021.pdf");
    assert_eq!(
        result.relevant_docs[0].metadata.source.year.as_deref(),
        Some("2021")
    );
    assert_eq!(
        result.answer,
        "According to the papers: Protein folding is predicted from sequence."
    );
    for pair in result.relevant_docs.windows(2) {
        assert!(pair[0].similarity_score >= pair[1].similarity_score);
    }

    let stats = engine.stats();
    assert_eq!(stats.total_documents, 3);
    assert_eq!(stats.embedding_dimension, VOCABULARY.len() + 1);
    assert_eq!(stats.llm_model, "echo: test");
}

#[tokio::test]
async fn every_chunk_of_a_document_is_numbered() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    build_corpus(&config).await;

    let engine = open_engine(&config).await;
    let docs = engine
        .retrieve("transformer attention", engine.len())
        .await
        .expect("retrieve should succeed");
    assert_eq!(docs.len(), engine.len());

    let attention: Vec<_> = docs
        .iter()
        .filter(|d| d.metadata.source.filename == "attention_2017.pdf")
        .collect();
    assert!(attention.len() > 1, "expected several chunks");
    let total = attention[0].metadata.total_chunks;
    assert_eq!(attention.len(), total);

    let mut ids: Vec<usize> = attention.iter().map(|d| d.metadata.chunk_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..total).collect::<Vec<_>>());
}

#[tokio::test]
async fn rebuild_replaces_the_previous_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    build_corpus(&config).await;

    let mut builder = IndexBuilder::new(config.clone(), Arc::new(VocabularyEmbedder));
    builder
        .ingest(SourceDocument::text(
            paper("climate_2020.pdf", "climate", "2020"),
            "Climate models are neural now.",
        ))
        .await;
    builder.finish().await.expect("rebuild should succeed");

    let engine = open_engine(&config).await;
    assert_eq!(engine.len(), 1);
    assert_eq!(engine.stats().total_documents, 1);
}

#[tokio::test]
async fn reset_removes_the_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    build_corpus(&config).await;

    assert_eq!(reset_index(&config).expect("reset should succeed"), 3);

    let error = QueryEngine::open(config, Arc::new(VocabularyEmbedder), Arc::new(EchoModel))
        .await
        .expect_err("index is gone");
    assert!(error.is_missing_index());
}

#[tokio::test]
async fn nothing_to_do_leaves_no_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    let papers = temp_dir.path().join("papers");
    std::fs::create_dir_all(&papers).expect("should create papers dir");
    std::fs::write(papers.join("notes.txt"), "not a paper").expect("should write");

    let outcome = IndexBuilder::new(config.clone(), Arc::new(VocabularyEmbedder))
        .build_from_directory(&papers)
        .await
        .expect("build should not fail");
    assert!(matches!(outcome, BuildOutcome::NothingToDo));
    assert!(!config.vector_index_path().exists());
}

#[tokio::test]
async fn unrelated_question_still_gets_an_answer_from_a_nonempty_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    build_corpus(&config).await;

    let engine = open_engine(&config).await;
    let result = engine.ask("zzz", 1).await.expect("ask should succeed");
    assert_eq!(result.relevant_docs.len(), 1);
    assert_ne!(result.answer, NO_INFORMATION_ANSWER);
}
