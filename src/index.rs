//! Vector index with durable storage
//!
//! [`FlatIpIndex`] is the nearest-neighbor primitive: a dense, append-only
//! matrix of vectors scanned by inner product. It cannot delete, so
//! [`VectorIndex`] removes a document by rebuilding a fresh primitive from
//! the vectors it keeps and swapping it in once the rebuild is persisted.

use crate::{
    chunk::{Chunk, ChunkMetadata},
    config::RagConfig,
    embed::{dot_product, embed_in_batches, EmbeddingProvider},
    persist::IndexStore,
    Error, Result,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// A scored slot returned by [`FlatIpIndex::search`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Slot of the stored vector
    pub slot: usize,
    /// Inner product with the query
    pub score: f32,
}

/// Flat inner-product index over dense slots `0..len`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIpIndex {
    dimension: usize,
    vectors: Vec<f32>,
}

impl FlatIpIndex {
    /// Create an empty index for vectors of `dimension` components
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    /// Get the vector dimension
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors
    #[must_use]
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.vectors.len() / self.dimension
        }
    }

    /// Check if the index is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the storage holds a whole number of vectors
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.dimension > 0 && self.vectors.len() % self.dimension == 0
    }

    /// Append a vector at slot `len()`
    ///
    /// The caller checks `vector.len() == dimension()`.
    pub fn add(&mut self, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.dimension);
        self.vectors.extend_from_slice(vector);
    }

    /// Drop every vector at or after `len` slots
    pub fn truncate(&mut self, len: usize) {
        self.vectors.truncate(len * self.dimension);
    }

    /// Get the stored vector at `slot`
    #[must_use]
    pub fn reconstruct(&self, slot: usize) -> Option<&[f32]> {
        let start = slot.checked_mul(self.dimension)?;
        self.vectors.get(start..start + self.dimension)
    }

    /// Return the `k` slots with the highest inner product with `query`,
    /// best first; equal scores keep the lower slot first
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        if k == 0 || self.dimension == 0 {
            return Vec::new();
        }

        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(slot, vector)| Neighbor {
                slot,
                score: dot_product(query, vector),
            })
            .collect();

        neighbors.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.slot.cmp(&b.slot))
        });
        neighbors.truncate(k);
        neighbors
    }
}

/// A chunk matched by [`VectorIndex::search`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Cosine similarity with the query
    pub score: f32,
    /// Owning document
    pub document_id: String,
    /// Chunk identifier
    pub chunk_id: String,
    /// Chunk text
    pub text: String,
    /// Chunk metadata
    pub metadata: ChunkMetadata,
}

impl SearchResult {
    pub(crate) fn from_chunk(chunk: &Chunk, score: f32) -> Self {
        Self {
            score,
            document_id: chunk.document_id.clone(),
            chunk_id: chunk.chunk_id.clone(),
            text: chunk.text.clone(),
            metadata: chunk.metadata,
        }
    }
}

/// Index statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of stored vectors
    pub total_vectors: usize,
    /// Embedding dimension
    pub embedding_dimension: usize,
    /// Provider model name
    pub model_name: String,
    /// Minimum score for search results
    pub similarity_threshold: f32,
    /// Number of distinct documents
    pub unique_documents: usize,
}

/// Chunk count of one indexed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Document identifier
    pub document_id: String,
    /// Number of chunks stored for the document
    pub chunk_count: usize,
}

#[derive(Debug, Clone)]
struct IndexState {
    flat: FlatIpIndex,
    chunks: Vec<Chunk>,
}

impl IndexState {
    fn empty(dimension: usize) -> Self {
        Self {
            flat: FlatIpIndex::new(dimension),
            chunks: Vec::new(),
        }
    }
}

/// Persistent vector index binding dense slots to chunks
///
/// Writers are serialized by an internal mutex. Readers take a shared lock
/// on the current state and never observe a partially applied mutation.
pub struct VectorIndex<P> {
    provider: P,
    store: Option<IndexStore>,
    dimension: usize,
    similarity_threshold: f32,
    top_k: usize,
    batch_size: usize,
    writer: Mutex<()>,
    state: RwLock<IndexState>,
}

impl<P> std::fmt::Debug for VectorIndex<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dimension", &self.dimension)
            .field("len", &self.state.read().flat.len())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl<P: EmbeddingProvider> VectorIndex<P> {
    /// Open the index persisted under `config.vector_db_path`
    ///
    /// A missing, corrupt or incompatible store is logged and replaced by an
    /// empty index.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the configuration is invalid or
    /// the provider dimension differs from `config.embedding_dimension`.
    pub fn open(provider: P, config: &RagConfig) -> Result<Self> {
        let store = IndexStore::new(&config.vector_db_path, config.compression);
        Self::with_store(provider, config, Some(store))
    }

    /// Create an index that is never persisted
    ///
    /// # Errors
    /// Same as [`VectorIndex::open`].
    pub fn in_memory(provider: P, config: &RagConfig) -> Result<Self> {
        Self::with_store(provider, config, None)
    }

    /// Create an index backed by `store`, if any
    ///
    /// # Errors
    /// Same as [`VectorIndex::open`].
    pub fn with_store(provider: P, config: &RagConfig, store: Option<IndexStore>) -> Result<Self> {
        config.validate()?;
        let dimension = config.embedding_dimension;
        if provider.dimension() != dimension {
            return Err(Error::InvalidConfig(format!(
                "provider {} produces {}-dimensional vectors, configured dimension is {dimension}",
                provider.model_name(),
                provider.dimension()
            )));
        }

        let state = match store.as_ref().map(|s| (s, s.load(dimension))) {
            Some((_, Ok(Some((flat, chunks))))) => {
                info!(vectors = flat.len(), "loaded existing vector index");
                IndexState { flat, chunks }
            }
            Some((_, Ok(None))) | None => IndexState::empty(dimension),
            Some((store, Err(e))) => {
                warn!(
                    error = %e,
                    dir = %store.dir().display(),
                    "could not load vector index, starting empty"
                );
                IndexState::empty(dimension)
            }
        };

        Ok(Self {
            provider,
            store,
            dimension,
            similarity_threshold: config.similarity_threshold,
            top_k: config.top_k_results,
            batch_size: config.batch_size,
            writer: Mutex::new(()),
            state: RwLock::new(state),
        })
    }

    /// Minimum score for search results
    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
    }

    /// Default number of neighbors per search
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        self.state.read().flat.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embed and append `chunks`, then persist
    ///
    /// # Errors
    /// Returns the provider error, [`Error::DimensionMismatch`] for a vector
    /// of the wrong size, or the storage error if persisting fails. On any
    /// error the index is left unchanged and the stored artifacts are
    /// rewritten from it.
    pub fn add(&self, chunks: Vec<Chunk>) -> Result<()> {
        if chunks.is_empty() {
            warn!("no chunks to add");
            return Ok(());
        }

        let _writer = self.writer.lock();

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = embed_in_batches(&self.provider, &texts, self.batch_size)?;

        let mut state = self.state.write();
        let previous_len = state.flat.len();
        for vector in &vectors {
            state.flat.add(vector);
        }
        let added = chunks.len();
        state.chunks.extend(chunks);

        if let Err(e) = self.persist(&state) {
            state.flat.truncate(previous_len);
            state.chunks.truncate(previous_len);
            self.restore(&state);
            return Err(e);
        }

        info!(added, total = state.flat.len(), "added chunks to vector index");
        Ok(())
    }

    /// Find chunks similar to `query`
    ///
    /// Returns at most `k` (default: configured top-k) results scoring at
    /// least the similarity threshold, best first, optionally restricted to
    /// one document.
    ///
    /// # Errors
    /// Returns [`Error::Query`] for a blank query against a non-empty index,
    /// or the provider error if the query cannot be embedded.
    pub fn search(
        &self,
        query: &str,
        k: Option<usize>,
        document_id: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        if self.is_empty() {
            warn!("search on empty vector index");
            return Ok(Vec::new());
        }
        if query.trim().is_empty() {
            return Err(Error::Query("query text is empty".to_string()));
        }

        let query_vector = self.provider.embed_one(query)?;
        if query_vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            });
        }

        let state = self.state.read();
        let k = k.unwrap_or(self.top_k).min(state.flat.len());

        let results = state
            .flat
            .search(&query_vector, k)
            .into_iter()
            .filter_map(|neighbor| {
                let chunk = state.chunks.get(neighbor.slot)?;
                if neighbor.score < self.similarity_threshold {
                    return None;
                }
                if document_id.is_some_and(|doc| doc != chunk.document_id) {
                    return None;
                }
                Some(SearchResult::from_chunk(chunk, neighbor.score))
            })
            .collect();

        Ok(results)
    }

    /// Remove every chunk of `document_id` by rebuilding the index
    ///
    /// Returns the number of vectors removed.
    ///
    /// # Errors
    /// Returns the storage error if the rebuilt index cannot be persisted;
    /// the previous state stays in place.
    pub fn remove_document(&self, document_id: &str) -> Result<usize> {
        let _writer = self.writer.lock();

        let rebuilt = {
            let state = self.state.read();
            let removed = state
                .chunks
                .iter()
                .filter(|c| c.document_id == document_id)
                .count();
            if removed == 0 {
                info!(document_id, "no vectors to remove");
                return Ok(0);
            }

            let mut rebuilt = IndexState::empty(self.dimension);
            if removed < state.chunks.len() {
                for (slot, chunk) in state.chunks.iter().enumerate() {
                    if chunk.document_id == document_id {
                        continue;
                    }
                    if let Some(vector) = state.flat.reconstruct(slot) {
                        rebuilt.flat.add(vector);
                        rebuilt.chunks.push(chunk.clone());
                    }
                }
            }
            rebuilt
        };

        if let Err(e) = self.persist(&rebuilt) {
            self.restore(&self.state.read());
            return Err(e);
        }

        let mut state = self.state.write();
        let removed = state.flat.len() - rebuilt.flat.len();
        *state = rebuilt;
        info!(
            document_id,
            removed,
            remaining = state.flat.len(),
            "rebuilt vector index without document"
        );
        Ok(removed)
    }

    /// Drop every vector
    ///
    /// # Errors
    /// Returns the storage error if the empty index cannot be persisted.
    pub fn clear(&self) -> Result<()> {
        let _writer = self.writer.lock();
        let empty = IndexState::empty(self.dimension);
        if let Err(e) = self.persist(&empty) {
            self.restore(&self.state.read());
            return Err(e);
        }
        *self.state.write() = empty;
        info!("cleared vector index");
        Ok(())
    }

    /// Get index statistics
    pub fn get_stats(&self) -> IndexStats {
        let state = self.state.read();
        let mut documents: Vec<&str> = state
            .chunks
            .iter()
            .map(|c| c.document_id.as_str())
            .collect();
        documents.sort_unstable();
        documents.dedup();

        IndexStats {
            total_vectors: state.flat.len(),
            embedding_dimension: self.dimension,
            model_name: self.provider.model_name().to_string(),
            similarity_threshold: self.similarity_threshold,
            unique_documents: documents.len(),
        }
    }

    /// List indexed documents in order of first appearance
    pub fn documents(&self) -> Vec<DocumentSummary> {
        let state = self.state.read();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut summaries: Vec<DocumentSummary> = Vec::new();

        for chunk in &state.chunks {
            match positions.get(chunk.document_id.as_str()) {
                Some(&i) => summaries[i].chunk_count += 1,
                None => {
                    positions.insert(&chunk.document_id, summaries.len());
                    summaries.push(DocumentSummary {
                        document_id: chunk.document_id.clone(),
                        chunk_count: 1,
                    });
                }
            }
        }
        summaries
    }

    fn persist(&self, state: &IndexState) -> Result<()> {
        match &self.store {
            Some(store) => store.save(&state.flat, &state.chunks),
            None => Ok(()),
        }
    }

    /// Rewrite the artifacts of `state` after a failed save, best effort
    fn restore(&self, state: &IndexState) {
        if let Err(e) = self.persist(state) {
            warn!(error = %e, "could not restore vector index artifacts");
        }
    }
}
