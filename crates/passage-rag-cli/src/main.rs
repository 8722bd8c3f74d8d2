//! passage-rag CLI
//!
//! Command-line interface for ingesting documents into a persistent vector
//! store and retrieving quality-filtered context from it.
//!
//! ## Features
//!
//! - `embeddings` - Enable semantic embeddings via fastembed (ONNX Runtime)
//!
//! ## Usage
//!
//! ```bash
//! passage-rag --store ./vector_store ingest --path report.txt
//! passage-rag --store ./vector_store query "invoice total" --threshold 0.3
//! passage-rag --store ./vector_store remove report_1a2b3c4d
//! ```
//!
//! Configuration is read from `--config <file.toml>` and `RAG_*` environment
//! variables; command-line flags take precedence. Logs go to stderr and are
//! controlled by `-v`/`-q` or `PASSAGE_RAG_LOG`.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use passage_rag::{
    embed::EmbeddingProvider, new_document_id, HashingEmbedder, RagConfig, RagPipeline,
    RetrievalResult,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "embeddings")]
use passage_rag::{EmbeddingModelType, FastEmbedder};

/// Embedding provider selection
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum EmbedderType {
    /// Feature-hashing embeddings (default, no downloads)
    #[default]
    Hashing,
    /// Semantic embeddings via fastembed (requires `embeddings` feature)
    Semantic,
}

/// Output format for query and stats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Parser)]
#[command(name = "passage-rag")]
#[command(version)]
#[command(about = "Document retrieval engine CLI", long_about = None)]
struct Cli {
    /// Vector store directory (overrides `vector_db_path`)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Embedding provider
    #[arg(short, long, value_enum, default_value = "hashing", global = true)]
    embedder: EmbedderType,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk and index a text file
    Ingest {
        /// Path to a UTF-8 text file (`[PAGE n]` markers are honored)
        #[arg(short, long)]
        path: PathBuf,

        /// Document id (generated from the file name when omitted)
        #[arg(short, long)]
        document_id: Option<String>,

        /// Chunk size in characters
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Chunk overlap in characters
        #[arg(long)]
        chunk_overlap: Option<usize>,

        /// Cut fixed character windows instead of packing sentences
        #[arg(long)]
        char_mode: bool,
    },

    /// Retrieve context for a query
    Query {
        /// Query string
        query: String,

        /// Number of results
        #[arg(short, long)]
        top_k: Option<usize>,

        /// Restrict results to one document
        #[arg(short, long)]
        document_id: Option<String>,

        /// Minimum similarity score
        #[arg(long)]
        threshold: Option<f32>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Remove a document from the index
    Remove {
        /// Document id
        document_id: String,
    },

    /// Replace a document's chunks with a fresh copy of its text
    Reindex {
        /// Document id
        document_id: String,

        /// Path to the new text
        #[arg(short, long)]
        path: PathBuf,
    },

    /// List indexed documents
    Documents,

    /// Show index and engine statistics
    Stats {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Remove every document from the index
    Clear,

    /// Show version and components
    Info,
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("PASSAGE_RAG_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let embedder = cli.embedder;
    let load = || load_config(cli.config.as_deref(), cli.store.as_deref());

    match cli.command {
        Commands::Ingest {
            path,
            document_id,
            chunk_size,
            chunk_overlap,
            char_mode,
        } => {
            let mut config = load()?;
            if let Some(size) = chunk_size {
                config.chunk_size = size;
            }
            if let Some(overlap) = chunk_overlap {
                config.chunk_overlap = overlap;
            }
            if char_mode {
                config.preserve_sentences = false;
            }
            let pipeline = open_pipeline(config, embedder)?;
            run_ingest(&pipeline, &path, document_id)?;
        }
        Commands::Query {
            query,
            top_k,
            document_id,
            threshold,
            format,
        } => {
            let mut config = load()?;
            if let Some(threshold) = threshold {
                config.similarity_threshold = threshold;
            }
            let pipeline = open_pipeline(config, embedder)?;
            run_query(&pipeline, &query, top_k, document_id.as_deref(), format)?;
        }
        Commands::Remove { document_id } => {
            let pipeline = open_pipeline(load()?, embedder)?;
            let removed = pipeline
                .remove(&document_id)
                .with_context(|| format!("Failed to remove document {document_id}"))?;
            println!("Removed {removed} vectors for document {document_id}");
        }
        Commands::Reindex { document_id, path } => {
            let pipeline = open_pipeline(load()?, embedder)?;
            let text = read_text(&path)?;
            let report = pipeline
                .reindex(&text, &document_id)
                .with_context(|| format!("Failed to reindex document {document_id}"))?;
            println!(
                "Reindexed {document_id}: removed {} vectors, added {} chunks",
                report.removed, report.added
            );
        }
        Commands::Documents => {
            let pipeline = open_pipeline(load()?, embedder)?;
            let documents = pipeline.documents();
            if documents.is_empty() {
                println!("No documents indexed");
            }
            for doc in documents {
                println!("{}\t{} chunks", doc.document_id, doc.chunk_count);
            }
        }
        Commands::Stats { format } => {
            let pipeline = open_pipeline(load()?, embedder)?;
            run_stats(&pipeline, format)?;
        }
        Commands::Clear => {
            let pipeline = open_pipeline(load()?, embedder)?;
            pipeline.clear().context("Failed to clear index")?;
            println!("Index cleared");
        }
        Commands::Info => run_info(),
    }

    Ok(())
}

fn load_config(file: Option<&Path>, store: Option<&Path>) -> Result<RagConfig> {
    let mut config = RagConfig::load(file).context("Failed to load configuration")?;
    if let Some(store) = store {
        config.vector_db_path = store.to_path_buf();
    }
    Ok(config)
}

fn open_pipeline(
    mut config: RagConfig,
    embedder: EmbedderType,
) -> Result<RagPipeline<Box<dyn EmbeddingProvider>>> {
    let provider = create_provider(&mut config, embedder)?;
    config.validate().context("Invalid configuration")?;
    RagPipeline::open(provider, config).context("Failed to open vector store")
}

fn create_provider(
    config: &mut RagConfig,
    embedder: EmbedderType,
) -> Result<Box<dyn EmbeddingProvider>> {
    match embedder {
        EmbedderType::Hashing => Ok(Box::new(
            HashingEmbedder::new(config.embedding_dimension)
                .with_model_name(format!("feature-hashing-{}", config.embedding_dimension)),
        )),
        #[cfg(feature = "embeddings")]
        EmbedderType::Semantic => {
            let model = EmbeddingModelType::from_name(&config.embedding_model)
                .with_context(|| format!("Unknown embedding model: {}", config.embedding_model))?;
            config.embedding_dimension = model.dimension();
            let embedder =
                FastEmbedder::new(model).context("Failed to initialize semantic embedder")?;
            Ok(Box::new(embedder))
        }
        #[cfg(not(feature = "embeddings"))]
        EmbedderType::Semantic => {
            bail!("Semantic embeddings require the `embeddings` feature")
        }
    }
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

fn run_ingest(
    pipeline: &RagPipeline<Box<dyn EmbeddingProvider>>,
    path: &Path,
    document_id: Option<String>,
) -> Result<()> {
    let text = read_text(path)?;
    let document_id =
        document_id.unwrap_or_else(|| new_document_id(&path.to_string_lossy()));

    let chunks = pipeline
        .ingest(&text, &document_id)
        .with_context(|| format!("Failed to index {}", path.display()))?;

    if chunks == 0 {
        println!("No text found in {}", path.display());
    } else {
        println!("Indexed {chunks} chunks for document {document_id}");
    }
    Ok(())
}

fn run_query(
    pipeline: &RagPipeline<Box<dyn EmbeddingProvider>>,
    query: &str,
    top_k: Option<usize>,
    document_id: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let result = pipeline.retrieve(query, top_k, document_id);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(query, &result);
    }

    if let Some(error) = &result.stats.error {
        bail!("Retrieval failed: {error}");
    }
    Ok(())
}

fn print_result(query: &str, result: &RetrievalResult) {
    println!("Query: \"{query}\"\n");
    if result.is_empty() {
        println!("No relevant passages found.");
        return;
    }

    println!(
        "Results ({}, {} filtered, avg score {:.3}):",
        result.stats.results_found, result.stats.filtered_out, result.stats.avg_score
    );
    println!("{}", "-".repeat(50));
    for (rank, source) in result.sources.iter().enumerate() {
        println!(
            "{}. [Score: {:.3}] {} (page {})",
            rank + 1,
            source.score,
            source.chunk_id,
            source.page
        );
        println!("   {}\n", source.snippet.replace('\n', " "));
    }
    println!("{}", "=".repeat(50));
    println!("Context:\n");
    println!("{}", result.context);
}

fn run_stats(
    pipeline: &RagPipeline<Box<dyn EmbeddingProvider>>,
    format: OutputFormat,
) -> Result<()> {
    let stats = pipeline.stats();
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Vector store: {}", pipeline.config().vector_db_path.display());
    println!("Total vectors: {}", stats.index.total_vectors);
    println!("Documents: {}", stats.index.unique_documents);
    println!("Embedding model: {}", stats.index.model_name);
    println!("Embedding dimension: {}", stats.index.embedding_dimension);
    println!("Similarity threshold: {}", stats.similarity_threshold);
    println!("Top-k results: {}", stats.top_k_results);
    println!("Max context length: {}", stats.max_context_length);
    Ok(())
}

fn run_info() {
    println!("passage-rag");
    println!("===========");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Components:");
    println!("  - Chunker: page-aware sentence packing, fixed character windows");
    println!("  - Vector index: flat inner product, rebuild-on-delete, lz4/zstd storage");
    println!("  - Quality filter: TOC, header and word-density heuristics");
    #[cfg(feature = "embeddings")]
    println!("  - Embedders: feature hashing, FastEmbed (semantic) ✓");
    #[cfg(not(feature = "embeddings"))]
    println!("  - Embedders: feature hashing");
    #[cfg(not(feature = "embeddings"))]
    {
        println!();
        println!("Note: Build with --features embeddings for semantic search");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_hashing_provider_uses_config_dimension() {
        let mut config = RagConfig {
            embedding_dimension: 96,
            ..Default::default()
        };
        let provider = create_provider(&mut config, EmbedderType::Hashing).unwrap();
        assert_eq!(provider.dimension(), 96);
        assert_eq!(provider.model_name(), "feature-hashing-96");
    }

    #[cfg(not(feature = "embeddings"))]
    #[test]
    fn test_semantic_requires_feature() {
        let mut config = RagConfig::default();
        assert!(create_provider(&mut config, EmbedderType::Semantic).is_err());
    }
}
