//! Query-time retrieval: search, quality filtering and context assembly

use crate::{
    config::RagConfig,
    embed::EmbeddingProvider,
    index::{IndexStats, SearchResult, VectorIndex},
    quality::QualityFilter,
    Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Separator placed between chunk texts in the assembled context
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Maximum snippet length in characters
pub const SNIPPET_CHARS: usize = 200;

/// A chunk that contributed to the context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Owning document
    pub document_id: String,
    /// Chunk identifier
    pub chunk_id: String,
    /// Similarity score
    pub score: f32,
    /// Page the chunk came from
    pub page: usize,
    /// Leading characters of the chunk text
    pub snippet: String,
}

impl Source {
    fn from_result(result: &SearchResult) -> Self {
        Self {
            document_id: result.document_id.clone(),
            chunk_id: result.chunk_id.clone(),
            score: result.score,
            page: result.metadata.page,
            snippet: truncate_chars(&result.text, SNIPPET_CHARS),
        }
    }
}

/// Counters describing one retrieval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStats {
    /// The query text
    pub query: String,
    /// Chunks used for the context
    pub results_found: usize,
    /// Chunks returned by the index before filtering
    pub total_retrieved: usize,
    /// Chunks dropped by the quality filter
    pub filtered_out: usize,
    /// Mean score of the chunks used
    pub avg_score: f32,
    /// Failure message when retrieval did not complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Assembled context with its sources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Chunk texts joined by [`CONTEXT_SEPARATOR`]
    pub context: String,
    /// One entry per chunk in the context, in context order
    pub sources: Vec<Source>,
    /// Retrieval counters
    pub stats: RetrievalStats,
}

impl RetrievalResult {
    fn empty(query: &str) -> Self {
        Self {
            stats: RetrievalStats {
                query: query.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// True when no chunk was retrieved
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Engine configuration and index statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Index statistics
    pub index: IndexStats,
    /// Default number of results per query
    pub top_k_results: usize,
    /// Minimum similarity score
    pub similarity_threshold: f32,
    /// Maximum context length in characters
    pub max_context_length: usize,
}

/// Turns a query into a bounded, quality-filtered context
pub struct RetrieverEngine<P> {
    index: Arc<VectorIndex<P>>,
    filter: QualityFilter,
    max_context_length: usize,
}

impl<P: EmbeddingProvider> RetrieverEngine<P> {
    /// Create an engine over a shared index
    #[must_use]
    pub fn new(index: Arc<VectorIndex<P>>, config: &RagConfig) -> Self {
        Self {
            index,
            filter: QualityFilter::new(config.quality.clone()),
            max_context_length: config.max_context_length,
        }
    }

    /// Replace the quality filter
    #[must_use]
    pub fn with_filter(mut self, filter: QualityFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Get the shared index
    pub fn index(&self) -> &Arc<VectorIndex<P>> {
        &self.index
    }

    /// Retrieve context for `query`
    ///
    /// Never fails: errors are logged and reported in `stats.error` with an
    /// empty context.
    pub fn retrieve(
        &self,
        query: &str,
        k: Option<usize>,
        document_id: Option<&str>,
    ) -> RetrievalResult {
        match self.try_retrieve(query, k, document_id) {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, query, "retrieval failed");
                let mut result = RetrievalResult::empty(query);
                result.stats.error = Some(e.to_string());
                result
            }
        }
    }

    fn try_retrieve(
        &self,
        query: &str,
        k: Option<usize>,
        document_id: Option<&str>,
    ) -> Result<RetrievalResult> {
        let candidates = self.index.search(query, k, document_id)?;
        if candidates.is_empty() {
            debug!(query, "no candidates above threshold");
            return Ok(RetrievalResult::empty(query));
        }

        let total_retrieved = candidates.len();
        let kept: Vec<&SearchResult> = candidates
            .iter()
            .filter(|c| !self.filter.is_low_quality(&c.text))
            .collect();

        let used: Vec<&SearchResult> = if kept.is_empty() {
            warn!(
                total_retrieved,
                "all candidates filtered as low quality, using unfiltered results"
            );
            candidates.iter().collect()
        } else {
            kept
        };
        let filtered_out = total_retrieved - used.len();

        let joined = used
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        let context = truncate_chars(&joined, self.max_context_length);

        let sources: Vec<Source> = used.iter().map(|c| Source::from_result(c)).collect();
        let avg_score = used.iter().map(|c| c.score).sum::<f32>() / used.len() as f32;

        debug!(
            query,
            results = used.len(),
            filtered_out,
            avg_score,
            "assembled context"
        );

        Ok(RetrievalResult {
            context,
            sources,
            stats: RetrievalStats {
                query: query.to_string(),
                results_found: used.len(),
                total_retrieved,
                filtered_out,
                avg_score,
                error: None,
            },
        })
    }

    /// Get engine statistics
    pub fn get_stats(&self) -> EngineStats {
        EngineStats {
            index: self.index.get_stats(),
            top_k_results: self.index.top_k(),
            similarity_threshold: self.index.similarity_threshold(),
            max_context_length: self.max_context_length,
        }
    }
}

/// First `max_chars` characters of `text`, with `"..."` appended when cut
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
