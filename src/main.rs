use clap::{Parser, Subcommand};
use paper_rag::commands::{ask, build_index, chat, load_config, reset, serve, show_stats};
use paper_rag::config::{get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "paper-rag")]
#[command(about = "Ask questions about a local collection of scientific papers")]
#[command(version)]
struct Cli {
    /// Base directory holding config.toml, the papers and the index (default: ~/.paper-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama, the language model backend and image processing
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Extract, chunk and embed every PDF into a fresh index
    Build {
        /// Directory of PDF papers (defaults to the configured papers directory)
        #[arg(long)]
        papers: Option<PathBuf>,
    },
    /// Answer a single question
    Ask {
        question: String,
        /// Number of chunks to retrieve
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=200))]
        k: Option<u32>,
    },
    /// Interactive question session
    Chat {
        /// Number of chunks to retrieve per question
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=200))]
        k: Option<u32>,
    },
    /// Show index statistics
    Stats,
    /// Delete the vector index, document store and manifest
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            let base_dir = match cli.config_dir {
                Some(dir) => dir,
                None => get_config_dir()?,
            };
            if show {
                show_config(&load_config(Some(base_dir))?);
            } else {
                run_interactive_config(&base_dir)?;
            }
        }
        Commands::Build { papers } => {
            build_index(load_config(cli.config_dir)?, papers).await?;
        }
        Commands::Ask { question, k } => {
            ask(load_config(cli.config_dir)?, &question, k.map(|k| k as usize)).await?;
        }
        Commands::Chat { k } => {
            chat(load_config(cli.config_dir)?, k.map(|k| k as usize)).await?;
        }
        Commands::Stats => {
            show_stats(load_config(cli.config_dir)?).await?;
        }
        Commands::Reset { yes } => {
            reset(&load_config(cli.config_dir)?, yes)?;
        }
        Commands::Serve { host, port } => {
            serve(load_config(cli.config_dir)?, host, port).await?;
        }
    }

    Ok(())
}
