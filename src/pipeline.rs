//! Ingestion and retrieval facade
//!
//! [`RagPipeline`] ties a [`Chunker`], a shared [`VectorIndex`] and a
//! [`RetrieverEngine`] together so callers can go from raw document text to
//! an assembled context without wiring the pieces themselves.

use crate::{
    chunk::Chunker,
    config::RagConfig,
    embed::EmbeddingProvider,
    index::{DocumentSummary, VectorIndex},
    retrieve::{EngineStats, RetrievalResult, RetrieverEngine},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Outcome of [`RagPipeline::reindex`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexReport {
    /// Vectors removed for the document
    pub removed: usize,
    /// Chunks added for the document
    pub added: usize,
}

/// Complete retrieval pipeline
pub struct RagPipeline<P> {
    config: RagConfig,
    chunker: Chunker,
    index: Arc<VectorIndex<P>>,
    engine: RetrieverEngine<P>,
}

impl<P: EmbeddingProvider> RagPipeline<P> {
    /// Open a pipeline persisted under `config.vector_db_path`
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for an invalid configuration or a
    /// provider whose dimension does not match it.
    pub fn open(provider: P, config: RagConfig) -> Result<Self> {
        RagPipelineBuilder::new()
            .provider(provider)
            .config(config)
            .build()
    }

    /// Create a pipeline that is never persisted
    ///
    /// # Errors
    /// Same as [`RagPipeline::open`].
    pub fn in_memory(provider: P, config: RagConfig) -> Result<Self> {
        RagPipelineBuilder::new()
            .provider(provider)
            .config(config)
            .in_memory()
            .build()
    }

    /// Get the configuration
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Get the shared index
    pub fn index(&self) -> &Arc<VectorIndex<P>> {
        &self.index
    }

    /// Chunk `text` and add it to the index under `document_id`
    ///
    /// Returns the number of chunks added.
    pub fn ingest(&self, text: &str, document_id: &str) -> Result<usize> {
        let chunks = self.chunker.chunk_text(text, document_id);
        let added = chunks.len();
        if added == 0 {
            return Ok(0);
        }
        self.index.add(chunks)?;
        info!(document_id, chunks = added, "ingested document");
        Ok(added)
    }

    /// Replace the chunks of `document_id` with chunks of `text`
    pub fn reindex(&self, text: &str, document_id: &str) -> Result<ReindexReport> {
        let removed = self.index.remove_document(document_id)?;
        let added = self.ingest(text, document_id)?;
        info!(document_id, removed, added, "reindexed document");
        Ok(ReindexReport { removed, added })
    }

    /// Remove every chunk of `document_id`
    pub fn remove(&self, document_id: &str) -> Result<usize> {
        self.index.remove_document(document_id)
    }

    /// Retrieve context for `query`, see [`RetrieverEngine::retrieve`]
    pub fn retrieve(
        &self,
        query: &str,
        k: Option<usize>,
        document_id: Option<&str>,
    ) -> RetrievalResult {
        self.engine.retrieve(query, k, document_id)
    }

    /// Get engine statistics
    pub fn stats(&self) -> EngineStats {
        self.engine.get_stats()
    }

    /// List indexed documents
    pub fn documents(&self) -> Vec<DocumentSummary> {
        self.index.documents()
    }

    /// Drop every indexed chunk
    pub fn clear(&self) -> Result<()> {
        self.index.clear()
    }
}

/// Builder for [`RagPipeline`]
pub struct RagPipelineBuilder<P> {
    provider: Option<P>,
    config: RagConfig,
    persistent: bool,
}

impl<P: EmbeddingProvider> RagPipelineBuilder<P> {
    /// Create a new pipeline builder with the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            provider: None,
            config: RagConfig::default(),
            persistent: true,
        }
    }

    /// Set the embedding provider
    #[must_use]
    pub fn provider(mut self, provider: P) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the configuration
    #[must_use]
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = config;
        self
    }

    /// Keep the index in memory only
    #[must_use]
    pub fn in_memory(mut self) -> Self {
        self.persistent = false;
        self
    }

    /// Build the pipeline
    pub fn build(self) -> Result<RagPipeline<P>> {
        let provider = self
            .provider
            .ok_or_else(|| Error::InvalidConfig("embedding provider required".to_string()))?;

        let index = if self.persistent {
            VectorIndex::open(provider, &self.config)?
        } else {
            VectorIndex::in_memory(provider, &self.config)?
        };
        let index = Arc::new(index);

        Ok(RagPipeline {
            chunker: Chunker::from_config(&self.config),
            engine: RetrieverEngine::new(Arc::clone(&index), &self.config),
            index,
            config: self.config,
        })
    }
}

impl<P: EmbeddingProvider> Default for RagPipelineBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a document id from a file or display name
///
/// The id is the sanitized file stem followed by eight random hex digits,
/// e.g. `annual_report_1a2b3c4d`.
#[must_use]
pub fn new_document_id(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);

    let mut sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.trim_matches('_').is_empty() {
        sanitized = "document".to_string();
    }

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{sanitized}_{}", &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashingEmbedder;
    use tempfile::TempDir;

    const DIM: usize = 512;

    const REPORT: &str = "[PAGE 1]\nThe reactor cooling loop was inspected in March. \
Engineers found corrosion on two valves.\n[PAGE 2]\nBoth valves were replaced. \
The loop returned to service after a pressure test.";

    fn config() -> RagConfig {
        RagConfig {
            chunk_size: 120,
            chunk_overlap: 30,
            embedding_dimension: DIM,
            similarity_threshold: 0.0,
            ..Default::default()
        }
    }

    fn pipeline() -> RagPipeline<HashingEmbedder> {
        RagPipeline::in_memory(HashingEmbedder::new(DIM), config()).unwrap()
    }

    // ============ Builder Tests ============

    #[test]
    fn test_builder_requires_provider() {
        let result = RagPipelineBuilder::<HashingEmbedder>::new()
            .config(config())
            .in_memory()
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let bad = RagConfig {
            chunk_overlap: 500,
            ..config()
        };
        let result = RagPipeline::in_memory(HashingEmbedder::new(DIM), bad);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    // ============ Pipeline Tests ============

    #[test]
    fn test_ingest_and_retrieve() {
        let pipeline = pipeline();
        let added = pipeline.ingest(REPORT, "report").unwrap();
        assert!(added >= 2);

        let result = pipeline.retrieve("valves replaced", None, Some("report"));
        assert!(result.stats.error.is_none());
        assert!(!result.sources.is_empty());
        assert!(result.sources.iter().all(|s| s.document_id == "report"));
        assert!(result.context.contains("valves"));
    }

    #[test]
    fn test_ingest_keeps_pages() {
        let pipeline = pipeline();
        pipeline.ingest(REPORT, "report").unwrap();

        let result = pipeline.retrieve("pressure test service", Some(10), None);
        let pages: Vec<usize> = result.sources.iter().map(|s| s.page).collect();
        assert!(pages.contains(&2));
    }

    #[test]
    fn test_ingest_blank_text() {
        let pipeline = pipeline();
        assert_eq!(pipeline.ingest("   \n ", "empty").unwrap(), 0);
        assert!(pipeline.documents().is_empty());
    }

    #[test]
    fn test_reindex_replaces_chunks() {
        let pipeline = pipeline();
        let first = pipeline.ingest(REPORT, "report").unwrap();

        let report = pipeline
            .reindex("A single short replacement sentence about turbines.", "report")
            .unwrap();
        assert_eq!(report.removed, first);
        assert_eq!(report.added, 1);
        assert_eq!(pipeline.index().len(), 1);
    }

    #[test]
    fn test_remove_and_documents() {
        let pipeline = pipeline();
        pipeline.ingest(REPORT, "report").unwrap();
        pipeline
            .ingest("Turbine blades are balanced before installation.", "turbines")
            .unwrap();

        assert_eq!(pipeline.documents().len(), 2);
        assert!(pipeline.remove("report").unwrap() >= 2);
        let docs = pipeline.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].document_id, "turbines");

        let result = pipeline.retrieve("valves", None, Some("report"));
        assert!(result.is_empty());
    }

    #[test]
    fn test_clear_and_stats() {
        let pipeline = pipeline();
        pipeline.ingest(REPORT, "report").unwrap();
        assert!(pipeline.stats().index.total_vectors >= 2);

        pipeline.clear().unwrap();
        let stats = pipeline.stats();
        assert_eq!(stats.index.total_vectors, 0);
        assert_eq!(stats.index.unique_documents, 0);
    }

    #[test]
    fn test_open_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let config = RagConfig {
            vector_db_path: dir.path().to_path_buf(),
            ..config()
        };

        {
            let pipeline = RagPipeline::open(HashingEmbedder::new(DIM), config.clone()).unwrap();
            pipeline.ingest(REPORT, "report").unwrap();
        }

        let reopened = RagPipeline::open(HashingEmbedder::new(DIM), config).unwrap();
        assert_eq!(reopened.documents()[0].document_id, "report");
        assert!(!reopened.retrieve("corrosion valves", None, None).is_empty());
    }

    // ============ Document Id Tests ============

    #[test]
    fn test_new_document_id_format() {
        let id = new_document_id("reports/Annual Report 2024.pdf");
        let (stem, suffix) = id.rsplit_once('_').unwrap();
        assert_eq!(stem, "Annual_Report_2024");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_new_document_id_unique() {
        assert_ne!(new_document_id("a.txt"), new_document_id("a.txt"));
    }

    #[test]
    fn test_new_document_id_fallback_stem() {
        let id = new_document_id("???");
        assert!(id.starts_with("document_"));
    }
}
