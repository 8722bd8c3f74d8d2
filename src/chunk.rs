//! Document chunking for retrieval
//!
//! Text is split on `[PAGE n]` markers first, then each page is cut into
//! overlapping chunks either on sentence boundaries or with a fixed
//! character window. Chunk ids are `<document_id>_chunk_<nnnn>` with a
//! counter carried across pages, so they sort in document order.

use crate::config::RagConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Metadata associated with a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Page number the chunk was cut from (1 when the text has no markers)
    pub page: usize,
    /// Length of the chunk text in characters
    pub length: usize,
    /// Position of the chunk within its document
    pub chunk_index: usize,
}

/// A chunk of text from a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text content
    pub text: String,
    /// Source document reference
    pub document_id: String,
    /// Unique chunk identifier
    pub chunk_id: String,
    /// Positional metadata
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Create a new chunk; the id is derived from `document_id` and `chunk_index`
    #[must_use]
    pub fn new(
        document_id: impl Into<String>,
        text: impl Into<String>,
        page: usize,
        chunk_index: usize,
    ) -> Self {
        let document_id = document_id.into();
        let text = text.into();
        Self {
            chunk_id: format_chunk_id(&document_id, chunk_index),
            metadata: ChunkMetadata {
                page,
                length: text.chars().count(),
                chunk_index,
            },
            text,
            document_id,
        }
    }

    /// Get the length of the chunk in characters
    #[must_use]
    pub fn len(&self) -> usize {
        self.metadata.length
    }

    /// Check if the chunk is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Build the chunk id for the `index`-th chunk of a document
#[must_use]
pub fn format_chunk_id(document_id: &str, index: usize) -> String {
    format!("{document_id}_chunk_{index:04}")
}

/// How a page is cut into chunks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkingStrategy {
    /// Greedy sentence packing with sentence-level overlap
    #[default]
    Sentence,
    /// Sliding character window with stride `chunk_size - chunk_overlap`
    FixedSize,
}

/// Splits document text into overlapping chunks
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    strategy: ChunkingStrategy,
    page_marker: Regex,
    sentence_boundary: Regex,
}

impl Chunker {
    /// Create a sentence-aware chunker
    ///
    /// `chunk_overlap < chunk_size` is expected to have been checked by
    /// [`RagConfig::validate`].
    #[must_use]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            strategy: ChunkingStrategy::Sentence,
            page_marker: Regex::new(r"\[PAGE (\d+)\]").expect("valid page marker pattern"),
            sentence_boundary: Regex::new(r"[.!?]+\s+").expect("valid sentence pattern"),
        }
    }

    /// Create a chunker from the chunking section of a configuration
    #[must_use]
    pub fn from_config(config: &RagConfig) -> Self {
        let strategy = if config.preserve_sentences {
            ChunkingStrategy::Sentence
        } else {
            ChunkingStrategy::FixedSize
        };
        Self::new(config.chunk_size, config.chunk_overlap).with_strategy(strategy)
    }

    /// Set the chunking strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: ChunkingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Get the chunking strategy
    #[must_use]
    pub fn strategy(&self) -> ChunkingStrategy {
        self.strategy
    }

    /// Split `text` into chunks belonging to `document_id`
    pub fn chunk_text(&self, text: &str, document_id: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        for (page, page_text) in self.split_pages(text) {
            let pieces = match self.strategy {
                ChunkingStrategy::Sentence => {
                    self.pack_sentences(&self.split_sentences(page_text))
                }
                ChunkingStrategy::FixedSize => self.split_windows(page_text),
            };
            for piece in pieces {
                if piece.trim().is_empty() {
                    continue;
                }
                chunks.push(Chunk::new(document_id, piece, page, chunks.len()));
            }
        }

        info!(
            document_id,
            chunks = chunks.len(),
            "created chunks for document"
        );
        chunks
    }

    /// Split text on `[PAGE n]` markers
    ///
    /// Text preceding the first marker is not attributed to any page. A
    /// marker whose number overflows keeps the previous page number.
    fn split_pages<'a>(&self, text: &'a str) -> Vec<(usize, &'a str)> {
        let markers: Vec<_> = self.page_marker.captures_iter(text).collect();
        if markers.is_empty() {
            return vec![(1, text)];
        }

        let mut pages = Vec::with_capacity(markers.len());
        let mut last_page = 1;
        for (i, caps) in markers.iter().enumerate() {
            let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let end = markers
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(text.len(), |m| m.start());
            let page = number.as_str().parse::<usize>().unwrap_or_else(|_| {
                debug!(
                    marker = whole.as_str(),
                    page = last_page,
                    "unparsable page marker, keeping previous page"
                );
                last_page
            });
            last_page = page;
            let body = text[whole.end()..end].trim();
            if !body.is_empty() {
                pages.push((page, body));
            }
        }

        if pages.is_empty() {
            vec![(1, text)]
        } else {
            pages
        }
    }

    /// Split text into trimmed sentences; terminal punctuation stays attached
    fn split_sentences<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for boundary in self.sentence_boundary.find_iter(text) {
            let punctuation = boundary.as_str().trim_end().len();
            let sentence = text[start..boundary.start() + punctuation].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = boundary.end();
        }

        let remaining = text[start..].trim();
        if !remaining.is_empty() {
            sentences.push(remaining);
        }
        sentences
    }

    fn pack_sentences(&self, sentences: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        // Counts one joining space per sentence already in `current`.
        let mut current_len = 0;

        for &sentence in sentences {
            let sentence_len = char_len(sentence);
            if current_len + sentence_len > self.chunk_size && !current.is_empty() {
                chunks.push(current.join(" "));

                let mut next = self.overlap_tail(&current);
                next.push(sentence);
                current_len = char_len(&next.join(" "));
                current = next;
            } else {
                current.push(sentence);
                current_len += sentence_len + 1;
            }
        }

        if !current.is_empty() {
            chunks.push(current.join(" "));
        }
        chunks
    }

    /// Trailing sentences of a closed chunk whose combined length fits the overlap
    fn overlap_tail<'a>(&self, sentences: &[&'a str]) -> Vec<&'a str> {
        let mut taken = 0;
        let mut overlap_len = 0;
        for sentence in sentences.iter().rev() {
            let len = char_len(sentence);
            if overlap_len + len > self.chunk_overlap {
                break;
            }
            overlap_len += len;
            taken += 1;
        }
        sentences[sentences.len() - taken..].to_vec()
    }

    fn split_windows(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let stride = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);

        (0..chars.len())
            .step_by(stride)
            .map(|start| {
                let end = (start + self.chunk_size).min(chars.len());
                chars[start..end].iter().collect::<String>().trim().to_string()
            })
            .filter(|window| !window.is_empty())
            .collect()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
