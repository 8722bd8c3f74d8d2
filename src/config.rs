//! Configuration for the retrieval engine
//!
//! [`RagConfig`] is layered with figment: built-in defaults, then an optional
//! TOML file, then `RAG_*` environment variables (`RAG_CHUNK_SIZE`,
//! `RAG_SIMILARITY_THRESHOLD`, ...). Every loaded configuration is checked by
//! [`RagConfig::validate`] before any component touches storage.

use crate::{persist::Compression, quality::QualityFilterConfig, Error, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix recognized by [`RagConfig::load`]
pub const ENV_PREFIX: &str = "RAG_";

/// Retrieval engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
    /// Sentence-aware chunking (false selects character windows)
    pub preserve_sentences: bool,
    /// Embedding model name reported in stats
    pub embedding_model: String,
    /// Embedding dimension
    pub embedding_dimension: usize,
    /// Minimum cosine similarity for search results
    pub similarity_threshold: f32,
    /// Default number of nearest neighbors per query
    pub top_k_results: usize,
    /// Maximum assembled context length in characters
    pub max_context_length: usize,
    /// Texts per embedding provider call
    pub batch_size: usize,
    /// Directory holding the persisted index
    pub vector_db_path: PathBuf,
    /// Compression for the vector artifact
    pub compression: Compression,
    /// Quality filter thresholds
    pub quality: QualityFilterConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 150,
            preserve_sentences: true,
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_dimension: 384,
            similarity_threshold: 0.7,
            top_k_results: 5,
            max_context_length: 4000,
            batch_size: 32,
            vector_db_path: PathBuf::from("./vector_store"),
            compression: Compression::default(),
            quality: QualityFilterConfig::default(),
        }
    }
}

impl RagConfig {
    /// Load defaults, then `file` (if given), then `RAG_*` environment variables
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if a source cannot be parsed or the
    /// merged configuration fails validation.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment.merge(Env::prefixed(ENV_PREFIX)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `RAG_*` environment variables only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Check value ranges and cross-field constraints
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(
                "chunk_overlap must be less than chunk_size".into(),
            ));
        }
        if self.embedding_dimension == 0 {
            return Err(Error::InvalidConfig(
                "embedding_dimension must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::InvalidConfig(
                "similarity_threshold must be between 0 and 1".into(),
            ));
        }
        if self.top_k_results == 0 {
            return Err(Error::InvalidConfig("top_k_results must be positive".into()));
        }
        if self.max_context_length == 0 {
            return Err(Error::InvalidConfig(
                "max_context_length must be positive".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".into()));
        }
        self.quality.validate()
    }
}
