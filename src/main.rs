//! # Oracolo CLI
//!
//! Entry point for the lore-constrained persona chat service.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `oracolo serve` | Build the index and start the HTTP server |
//! | `oracolo index` | Build the index once and report its size |
//! | `oracolo search "<query>"` | Print the evidence retrieved for a query |
//!
//! All commands accept a `--config` flag pointing to a TOML configuration
//! file. See `config/oracolo.example.toml` for a full example.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use oracolo::config::{load_config, Config};
use oracolo::embedding::create_embedder;
use oracolo::index::{assemble_corpus, IndexService, IndexStatus};
use oracolo::retrieve::retrieve_and_augment;
use oracolo::server::run_server;

/// Oracolo — a lore-constrained retrieval-augmented persona chat service.
#[derive(Parser)]
#[command(
    name = "oracolo",
    about = "A lore-constrained retrieval-augmented persona chat service",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/oracolo.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (chat, tts, health).
    Serve,

    /// Build the semantic index once and print its state.
    Index {
        /// Show document and chunk counts without calling the embedding
        /// service.
        #[arg(long)]
        dry_run: bool,
    },

    /// Retrieve the evidence chunks for a query and print them.
    Search {
        query: String,

        /// Number of chunks to retrieve.
        #[arg(long)]
        k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => run_server(&config).await,
        Commands::Index { dry_run } => run_index(&config, dry_run).await,
        Commands::Search { query, k } => run_search(&config, &query, k).await,
    }
}

async fn run_index(config: &Config, dry_run: bool) -> anyhow::Result<()> {
    if dry_run {
        println!("index (dry-run)");
        match assemble_corpus(&config.data.dir, &config.chunking)? {
            Some(corpus) => {
                println!("  documents with text: {}", corpus.documents);
                println!("  chunks: {}", corpus.chunks.len());
            }
            None => println!("  no indexable text found"),
        }
        return Ok(());
    }

    let embedder = create_embedder(&config.embedding)?;
    let index = IndexService::new();
    index.build_once(embedder.as_ref(), config).await;

    match index.status() {
        IndexStatus::Ready { chunks, dims, .. } => {
            println!("index ready");
            println!("  chunks: {}", chunks);
            println!("  dims: {}", dims);
        }
        _ => println!("index inactive"),
    }
    Ok(())
}

async fn run_search(config: &Config, query: &str, k: Option<usize>) -> anyhow::Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let index = IndexService::new();
    index.build_once(embedder.as_ref(), config).await;

    let k = k.unwrap_or(config.retrieval.top_k);
    let evidence = retrieve_and_augment(&index, embedder.as_ref(), query, k).await?;

    if evidence.is_empty() {
        println!("No results.");
    } else {
        println!("{}", evidence);
    }
    Ok(())
}
