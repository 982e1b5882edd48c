#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance
// Run with: cargo test --test integration_ollama -- --ignored

use paper_rag::config::{EmbeddingConfig, LlmConfig};
use paper_rag::embeddings::{Embedder, OllamaClient, dot};
use paper_rag::llm::{GenerationOptions, LanguageModel, OllamaModel};
use std::env;
use std::time::Duration;
use tracing::{debug, info};

const TEST_MODEL: &str = "nomic-embed-text:latest";
const DEFAULT_OLLAMA_HOST: &str = "localhost";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

fn create_integration_test_client() -> OllamaClient {
    let host = env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string());
    let port = env::var("OLLAMA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_OLLAMA_PORT);
    let model = env::var("OLLAMA_MODEL").unwrap_or_else(|_| TEST_MODEL.to_string());

    let config = EmbeddingConfig {
        host,
        port,
        model,
        batch_size: 5,
        ..EmbeddingConfig::default()
    };

    OllamaClient::new(&config)
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(3)
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_health_check() {
    init_test_tracing();

    let client = create_integration_test_client();

    info!("Testing health check against real Ollama instance");
    let result = client.health_check();

    assert!(
        result.is_ok(),
        "Health check should succeed with local Ollama: {:?}",
        result
    );
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_list_models() {
    init_test_tracing();

    let models = create_integration_test_client()
        .list_models()
        .expect("Model listing should succeed");
    assert!(
        !models.is_empty(),
        "Should have at least one model available"
    );

    for model in &models {
        debug!("Available model: {} (size: {:?})", model.name, model.size);
    }
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_embeddings_are_normalized() {
    init_test_tracing();

    let client = create_integration_test_client();
    let texts: Vec<String> = (0..7)
        .map(|i| {
            format!(
                "Paper {} studies protein folding with graph neural networks.",
                i + 1
            )
        })
        .collect();

    let vectors = client.embed(&texts).expect("embedding should succeed");
    assert_eq!(vectors.len(), texts.len());

    let dimension = vectors[0].len();
    assert!(dimension >= 100, "unexpected dimension {}", dimension);
    for vector in &vectors {
        assert_eq!(vector.len(), dimension);
        let norm = dot(vector, vector).sqrt();
        assert!((norm - 1.0).abs() < 1e-3, "norm was {}", norm);
    }

    info!("Embedded {} texts with dimension {}", vectors.len(), dimension);
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_related_texts_score_higher() {
    init_test_tracing();

    let client = create_integration_test_client();
    let texts = vec![
        "How do transformers use self-attention?".to_string(),
        "Self-attention lets a transformer weigh every token in the sequence.".to_string(),
        "The recipe calls for two cups of flour and an egg.".to_string(),
    ];

    let vectors = client.embed(&texts).expect("embedding should succeed");
    let related = dot(&vectors[0], &vectors[1]);
    let unrelated = dot(&vectors[0], &vectors[2]);
    assert!(
        related > unrelated,
        "related {} should beat unrelated {}",
        related,
        unrelated
    );
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_empty_input() {
    init_test_tracing();

    let vectors = create_integration_test_client()
        .embed(&[])
        .expect("empty batch should be handled gracefully");
    assert!(vectors.is_empty());
}

#[test]
#[ignore = "requires a local Ollama instance with a generation model"]
fn real_ollama_generation() {
    init_test_tracing();

    let model = env::var("OLLAMA_LLM_MODEL").unwrap_or_else(|_| LlmConfig::default().model);
    let client = create_integration_test_client().with_timeout(Duration::from_secs(300));
    let llm = OllamaModel::new(client, model);

    let options = GenerationOptions {
        max_tokens: 32,
        temperature: 0.0,
    };
    let answer = llm
        .generate("Reply with the single word: yes", &options)
        .expect("generation should succeed");

    assert!(!answer.is_empty());
    info!("{} answered: {}", llm.identifier(), answer);
}
