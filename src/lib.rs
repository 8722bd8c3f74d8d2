//! passage-rag: document retrieval for answer generation
//!
//! This crate turns extracted document text into an assembled, bounded
//! context for a query. Documents are cut into overlapping chunks, embedded
//! and stored in a persistent vector index; queries are answered by nearest
//! neighbor search, a quality filter that drops tables of contents and
//! header noise, and context assembly with source attribution.
//!
//! # Quick Start
//!
//! ```rust
//! use passage_rag::{HashingEmbedder, RagConfig, RagPipeline};
//!
//! let config = RagConfig {
//!     embedding_dimension: 256,
//!     similarity_threshold: 0.1,
//!     ..Default::default()
//! };
//! let pipeline = RagPipeline::in_memory(HashingEmbedder::new(256), config).unwrap();
//!
//! pipeline
//!     .ingest(
//!         "[PAGE 1]\nThe invoice total is $450 and is due on May 1. \
//!          Late payments accrue a two percent monthly fee.",
//!         "invoice",
//!     )
//!     .unwrap();
//!
//! let result = pipeline.retrieve("invoice total", None, Some("invoice"));
//! assert!(result.context.contains("$450"));
//! assert_eq!(result.sources[0].page, 1);
//! ```
//!
//! # Components
//!
//! - [`Chunker`] - page-aware, sentence-aware chunking with overlap
//! - [`VectorIndex`] - persistent inner-product index with rebuild-on-delete
//! - [`QualityFilter`] - heuristic detection of TOC and header chunks
//! - [`RetrieverEngine`] - search, filtering and context assembly
//! - [`RagPipeline`] - ingestion and retrieval facade
//!
//! # Embedding Providers
//!
//! - [`HashingEmbedder`] - deterministic feature hashing, no model download
//! - `FastEmbedder` - sentence-transformer models via fastembed (`embeddings` feature)

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]

pub mod chunk;
pub mod config;
pub mod embed;
pub mod error;
pub mod index;
pub mod persist;
pub mod pipeline;
pub mod quality;
pub mod retrieve;

pub use chunk::{Chunk, ChunkMetadata, Chunker, ChunkingStrategy};
pub use config::RagConfig;
pub use embed::{EmbeddingProvider, HashingEmbedder};
#[cfg(feature = "embeddings")]
pub use embed::{EmbeddingModelType, FastEmbedder};
pub use error::{Error, Result};
pub use index::{DocumentSummary, IndexStats, SearchResult, VectorIndex};
pub use persist::{Compression, IndexStore};
pub use pipeline::{new_document_id, RagPipeline, RagPipelineBuilder, ReindexReport};
pub use quality::{QualityFilter, QualityFilterConfig};
pub use retrieve::{EngineStats, RetrievalResult, RetrievalStats, RetrieverEngine, Source};
