//! Ragline CLI - ask questions about a local document corpus.

use clap::{Parser, Subcommand};
use ragline_rag::RagConfig;
use std::path::PathBuf;

mod commands;

/// Ragline - retrieval-augmented answers from a local model server
#[derive(Parser)]
#[command(name = "ragline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Backend URL (overrides LMSTUDIO_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed a JSONL corpus into a vector index
    BuildIndex {
        /// Corpus file (one JSON document per line)
        #[arg(long)]
        corpus: Option<PathBuf>,
        /// Index file to write
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Embedding model for the remote embedder
        #[arg(long)]
        embedding_model: Option<String>,
        /// Embedder backend: hash or remote
        #[arg(long)]
        embedder: Option<String>,
    },

    /// Answer a single question
    Ask {
        /// The question
        question: String,
        /// Number of documents to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Chat model to answer with
        #[arg(short, long)]
        model: Option<String>,
        /// Index file to search
        #[arg(long)]
        index: Option<PathBuf>,
        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// Interactive conversation over stdin
    Chat {
        /// Chat model to answer with
        #[arg(short, long)]
        model: Option<String>,
        /// Index file to search
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// List models available on the backend
    Models,

    /// Show configuration and index status
    Info,
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "warn" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let mut config = RagConfig::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| miette::miette!("Failed to start async runtime: {}", e))?;

    match cli.command {
        Commands::BuildIndex {
            corpus,
            output,
            embedding_model,
            embedder,
        } => {
            if let Some(corpus) = corpus {
                config.corpus_path = corpus;
            }
            if let Some(output) = output {
                config.index_path = output;
            }
            if let Some(model) = embedding_model {
                config.embedding_model = model;
            }
            if let Some(embedder) = embedder {
                config.embedding_backend = embedder;
            }
            runtime.block_on(commands::build_index::run(config))
        }
        Commands::Ask {
            question,
            top_k,
            model,
            index,
            stream,
        } => {
            apply_overrides(&mut config, model, index);
            if let Some(k) = top_k {
                config.top_k = k;
            }
            runtime.block_on(commands::ask::run(config, &question, stream))
        }
        Commands::Chat { model, index } => {
            apply_overrides(&mut config, model, index);
            runtime.block_on(commands::chat::run(config))
        }
        Commands::Models => runtime.block_on(commands::models::run(&config)),
        Commands::Info => commands::info::run(&config),
    }
}

fn apply_overrides(config: &mut RagConfig, model: Option<String>, index: Option<PathBuf>) {
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(index) = index {
        config.index_path = index;
    }
}
