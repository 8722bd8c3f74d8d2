//! Embedding providers
//!
//! The index only depends on [`EmbeddingProvider`]: a batch of strings in,
//! one L2-normalized vector of fixed dimension per string out. Two
//! implementations ship with the crate: [`HashingEmbedder`], a deterministic
//! feature-hashing model that needs no downloads, and `FastEmbedder` (behind
//! the `embeddings` feature) which runs sentence-transformer models through
//! fastembed.

use crate::{Error, Result};
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

/// Maps batches of text to fixed-dimension, L2-normalized vectors
///
/// Implementations must be deterministic for a fixed model and must return
/// exactly one vector per input text.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimension
    fn dimension(&self) -> usize;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Embed a single text
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("no embedding returned".to_string()))
    }
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<P> {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed(texts)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Arc<P> {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed(texts)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Embed `texts` with one provider call per `batch_size` texts
///
/// Checks that the provider returned one vector per text and that every
/// vector has the provider's dimension.
pub fn embed_in_batches<P: EmbeddingProvider + ?Sized>(
    provider: &P,
    texts: &[&str],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let expected = provider.dimension();
    let mut vectors = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size.max(1)) {
        let embedded = provider.embed(batch)?;
        if embedded.len() != batch.len() {
            return Err(Error::Embedding(format!(
                "provider returned {} vectors for {} texts",
                embedded.len(),
                batch.len()
            )));
        }
        if let Some(bad) = embedded.iter().find(|v| v.len() != expected) {
            return Err(Error::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
        vectors.extend(embedded);
    }

    Ok(vectors)
}

/// Deterministic bag-of-words embedder using signed feature hashing
///
/// Each lower-cased alphanumeric token is hashed with xxh3 into one of
/// `dimension` buckets with a hash-derived sign; the counts are then
/// L2-normalized. Texts sharing vocabulary score a positive cosine
/// similarity, identical texts score 1.0.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashingEmbedder {
    /// Create a new hashing embedder
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_name: "feature-hashing".to_string(),
        }
    }

    /// Set the model name reported in stats
    #[must_use]
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let mut any_token = false;
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            any_token = true;
            self.accumulate(&mut vector, &token.to_lowercase());
        }
        // Punctuation-only text still gets a non-zero vector.
        if !any_token {
            self.accumulate(&mut vector, text.trim());
        }

        normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], token: &str) {
        let hash = xxh3_64(token.as_bytes());
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
        vector[bucket] += sign;
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|text| {
                if text.trim().is_empty() {
                    Err(Error::Embedding("empty text for embedding".to_string()))
                } else {
                    Ok(self.hash_to_vector(text))
                }
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Scale a vector to unit length in place (zero vectors are left unchanged)
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Compute dot product between two vectors
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute cosine similarity between two vectors
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot = dot_product(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

// ============================================================================
// FastEmbed-based provider
// ============================================================================

/// Available embedding models when `embeddings` feature is enabled
#[cfg(feature = "embeddings")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmbeddingModelType {
    /// all-MiniLM-L6-v2: Fast, good quality (384 dims)
    #[default]
    AllMiniLmL6V2,
    /// all-MiniLM-L12-v2: Better quality, slightly slower (384 dims)
    AllMiniLmL12V2,
    /// BGE-small-en-v1.5: Balanced performance (384 dims)
    BgeSmallEnV15,
    /// BGE-base-en-v1.5: Higher quality (768 dims)
    BgeBaseEnV15,
}

#[cfg(feature = "embeddings")]
impl EmbeddingModelType {
    fn to_fastembed_model(self) -> fastembed::EmbeddingModel {
        match self {
            Self::AllMiniLmL6V2 => fastembed::EmbeddingModel::AllMiniLML6V2,
            Self::AllMiniLmL12V2 => fastembed::EmbeddingModel::AllMiniLML12V2,
            Self::BgeSmallEnV15 => fastembed::EmbeddingModel::BGESmallENV15,
            Self::BgeBaseEnV15 => fastembed::EmbeddingModel::BGEBaseENV15,
        }
    }

    /// Get the embedding dimension for this model
    #[must_use]
    pub const fn dimension(self) -> usize {
        match self {
            Self::AllMiniLmL6V2 | Self::AllMiniLmL12V2 | Self::BgeSmallEnV15 => 384,
            Self::BgeBaseEnV15 => 768,
        }
    }

    /// Get human-readable model name
    #[must_use]
    pub const fn model_name(self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "sentence-transformers/all-MiniLM-L6-v2",
            Self::AllMiniLmL12V2 => "sentence-transformers/all-MiniLM-L12-v2",
            Self::BgeSmallEnV15 => "BAAI/bge-small-en-v1.5",
            Self::BgeBaseEnV15 => "BAAI/bge-base-en-v1.5",
        }
    }

    /// Resolve a configured model name such as `all-MiniLM-L6-v2`
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        [
            Self::AllMiniLmL6V2,
            Self::AllMiniLmL12V2,
            Self::BgeSmallEnV15,
            Self::BgeBaseEnV15,
        ]
        .into_iter()
        .find(|model| model.model_name().to_ascii_lowercase().ends_with(&name))
    }
}

/// Semantic embedder using fastembed (ONNX Runtime)
///
/// The model sits behind a mutex: inference calls are never concurrent, so
/// callers wanting throughput should send larger batches.
#[cfg(feature = "embeddings")]
pub struct FastEmbedder {
    model: parking_lot::Mutex<fastembed::TextEmbedding>,
    model_type: EmbeddingModelType,
}

#[cfg(feature = "embeddings")]
impl std::fmt::Debug for FastEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedder")
            .field("model_type", &self.model_type)
            .field("dimension", &self.model_type.dimension())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "embeddings")]
impl FastEmbedder {
    /// Load the model, downloading it on first use
    ///
    /// # Errors
    /// Returns an error if model initialization fails.
    pub fn new(model_type: EmbeddingModelType) -> Result<Self> {
        let options = fastembed::InitOptions::new(model_type.to_fastembed_model())
            .with_show_download_progress(true);

        let model = fastembed::TextEmbedding::try_new(options).map_err(|e| {
            Error::Embedding(format!("failed to initialize embedding model: {e}"))
        })?;

        Ok(Self {
            model: parking_lot::Mutex::new(model),
            model_type,
        })
    }

    /// Get the model type
    #[must_use]
    pub fn model_type(&self) -> EmbeddingModelType {
        self.model_type
    }
}

#[cfg(feature = "embeddings")]
impl EmbeddingProvider for FastEmbedder {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::Embedding("empty text for embedding".to_string()));
        }

        let mut vectors = self
            .model
            .lock()
            .embed(texts.to_vec(), None)
            .map_err(|e| Error::Embedding(format!("batch embedding failed: {e}")))?;
        for vector in &mut vectors {
            normalize(vector);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.model_type.dimension()
    }

    fn model_name(&self) -> &str {
        self.model_type.model_name()
    }
}
