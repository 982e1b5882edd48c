use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::builder::{BuildOutcome, BuildReport, IndexBuilder, reset_index};
use crate::config::{Config, get_config_dir};
use crate::embeddings::OllamaClient;
use crate::llm;
use crate::query::{QueryEngine, QueryResult, SystemStats};
use crate::server::{self, AppState};

const EXIT_COMMANDS: [&str; 3] = ["quit", "exit", "q"];

/// Load configuration from `config_dir`, or from the default base directory.
#[inline]
pub fn load_config(config_dir: Option<PathBuf>) -> Result<Config> {
    let dir = match config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };
    Config::load(&dir)
}

/// Build the index from every PDF under `papers`, or the configured papers directory.
#[inline]
pub async fn build_index(config: Config, papers: Option<PathBuf>) -> Result<()> {
    let papers_dir = papers.unwrap_or_else(|| config.papers_dir());
    info!("Building index from {}", papers_dir.display());

    let builder = IndexBuilder::from_config(config)?;
    match builder.build_from_directory(&papers_dir).await? {
        BuildOutcome::NothingToDo => {
            println!(
                "{}",
                style(format!(
                    "No usable PDF files found in {}. Nothing to index.",
                    papers_dir.display()
                ))
                .yellow()
            );
        }
        BuildOutcome::Built(report) => print_build_report(&report),
    }

    Ok(())
}

fn print_build_report(report: &BuildReport) {
    let stats = &report.stats;
    println!("{}", style("✓ Index built").green().bold());
    println!("  PDFs found: {}", stats.documents_found);
    println!("  Indexed: {}", stats.documents_indexed);
    if stats.documents_skipped > 0 {
        println!("  Skipped (invalid PDF): {}", stats.documents_skipped);
    }
    if stats.documents_empty > 0 {
        println!("  No usable text: {}", stats.documents_empty);
    }
    if stats.documents_failed > 0 {
        println!(
            "  {} {}",
            style("Failed to embed:").red(),
            stats.documents_failed
        );
    }
    println!(
        "  Chunks: {} ({} text, {} image descriptions)",
        stats.total_chunks(),
        stats.text_chunks,
        stats.image_chunks
    );
    if let Some(dimension) = report.manifest.embedding_dimension {
        println!("  Embedding dimension: {}", dimension);
    }
}

async fn open_engine(config: Config) -> Result<QueryEngine> {
    let embedder = Arc::new(OllamaClient::new(&config.embeddings)?);
    let llm = llm::from_config(&config)?;

    match QueryEngine::open(config, embedder, llm).await {
        Ok(engine) => Ok(engine),
        Err(e) if e.is_missing_index() => {
            eprintln!(
                "{}",
                style("No usable index found. Run `paper-rag build` first.").yellow()
            );
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Answer a single question and print the result.
#[inline]
pub async fn ask(config: Config, question: &str, k: Option<usize>) -> Result<()> {
    let k = k.unwrap_or(config.vector_store.similarity_search_k);
    let engine = open_engine(config).await?;

    let result = engine.ask(question, k).await?;
    print!("{}", format_result(&result));

    engine.close().await;
    Ok(())
}

/// Interactive question loop. `quit`, `exit` or `q` leaves.
#[inline]
pub async fn chat(config: Config, k: Option<usize>) -> Result<()> {
    let k = k.unwrap_or(config.vector_store.similarity_search_k);
    let engine = open_engine(config).await?;

    println!("{}", style("📚 Scientific paper assistant").bold().cyan());
    println!("Ask a question about your papers. Type 'quit' to leave.");

    loop {
        println!();
        let question: String = tokio::task::spawn_blocking(|| {
            Input::<String>::new()
                .with_prompt("Question")
                .allow_empty(true)
                .interact_text()
        })
        .await
        .context("Input task failed")??;

        let question = question.trim();
        if is_exit_command(question) {
            break;
        }
        if question.is_empty() {
            continue;
        }

        let result = engine.ask(question, k).await?;
        print!("{}", format_result(&result));
    }

    engine.close().await;
    println!("Goodbye!");
    Ok(())
}

#[inline]
pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    EXIT_COMMANDS
        .iter()
        .any(|command| input.eq_ignore_ascii_case(command))
}

#[inline]
pub fn format_result(result: &QueryResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", style("Answer:").bold().green());
    let _ = writeln!(out, "{}", result.answer);

    if !result.sources.is_empty() {
        let _ = writeln!(out, "\n{}", style("Sources:").bold().yellow());
        for (i, source) in result.sources.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {} ({}, chunk {}, score {:.3})",
                i + 1,
                source.title,
                source.filename,
                source.chunk_id,
                source.similarity_score
            );
        }
    }

    out
}

/// Print index statistics.
#[inline]
pub async fn show_stats(config: Config) -> Result<()> {
    let engine = open_engine(config).await?;
    print!("{}", format_stats(&engine.stats()));
    engine.close().await;
    Ok(())
}

#[inline]
pub fn format_stats(stats: &SystemStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", style("📊 Paper RAG Statistics").bold().cyan());
    let _ = writeln!(out, "{}", "=".repeat(50));
    let _ = writeln!(out, "  Vectors: {}", stats.total_vectors);
    let _ = writeln!(out, "  Documents: {}", stats.total_documents);
    let _ = writeln!(out, "  Embedding dimension: {}", stats.embedding_dimension);
    let _ = writeln!(out, "  Embedding model: {}", stats.embedding_model);
    let _ = writeln!(out, "  Language model: {}", stats.llm_model);
    let _ = writeln!(out, "  Index location: {}", stats.index_location);
    out
}

/// Delete every persisted index artifact, after confirmation unless `yes` is set.
#[inline]
pub fn reset(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        println!("This deletes the vector index, document store and manifest.");
        let confirmed = Confirm::new()
            .with_prompt("Reset the index? This action cannot be undone.")
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Reset cancelled.");
            return Ok(());
        }
    }

    let removed = reset_index(config)?;
    if removed == 0 {
        println!("Nothing to reset.");
    } else {
        println!(
            "{} Removed {} index file(s)",
            style("✓").green(),
            removed
        );
    }
    Ok(())
}

/// Serve the HTTP API. Host and port default to the `[server]` section.
#[inline]
pub async fn serve(config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let state = AppState::from_config(config)?;
    server::serve(state, &host, port).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Source;
    use tempfile::TempDir;

    #[test]
    fn exit_commands() {
        for input in ["quit", "exit", "q", "  Q ", "EXIT"] {
            assert!(is_exit_command(input), "{input} should exit");
        }
        for input in ["", "question", "quite", "qq"] {
            assert!(!is_exit_command(input), "{input} should not exit");
        }
    }

    #[test]
    fn result_lists_sources_in_order() {
        let result = QueryResult {
            question: "q".to_string(),
            answer: "Attention is all you need.".to_string(),
            sources: vec![
                Source {
                    title: "attention".to_string(),
                    filename: "attention_2017.pdf".to_string(),
                    chunk_id: 4,
                    similarity_score: 0.91234,
                },
                Source {
                    title: "bert".to_string(),
                    filename: "bert_2018.pdf".to_string(),
                    chunk_id: 0,
                    similarity_score: 0.5,
                },
            ],
            relevant_docs: Vec::new(),
        };

        let text = format_result(&result);
        assert!(text.contains("Attention is all you need.\n"));
        assert!(text.contains("  1. attention (attention_2017.pdf, chunk 4, score 0.912)\n"));
        assert!(text.contains("  2. bert (bert_2018.pdf, chunk 0, score 0.500)\n"));
    }

    #[test]
    fn result_without_sources_has_no_sources_section() {
        let result = QueryResult {
            question: "q".to_string(),
            answer: "Nothing found.".to_string(),
            sources: Vec::new(),
            relevant_docs: Vec::new(),
        };
        assert!(!format_result(&result).contains("Sources"));
    }

    #[test]
    fn stats_text() {
        let text = format_stats(&SystemStats {
            total_vectors: 12,
            total_documents: 3,
            embedding_dimension: 768,
            embedding_model: "nomic-embed-text:latest".to_string(),
            llm_model: "ollama: llama2".to_string(),
            index_location: "/data/vector_index.bin".to_string(),
        });
        assert!(text.contains("  Vectors: 12\n"));
        assert!(text.contains("  Documents: 3\n"));
        assert!(text.contains("  Language model: ollama: llama2\n"));
    }

    #[test]
    fn load_config_from_explicit_dir() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let config =
            load_config(Some(temp_dir.path().to_path_buf())).expect("defaults should load");
        assert_eq!(config.get_base_dir(), temp_dir.path());
        assert_eq!(config.papers_dir(), temp_dir.path().join("papers"));
    }

    #[test]
    fn reset_without_index_is_a_no_op() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let config = Config::with_base_dir(temp_dir.path());
        reset(&config, true).expect("reset should succeed");
    }
}
