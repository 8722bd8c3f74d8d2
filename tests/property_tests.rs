//! Property-based tests for passage-rag

use proptest::prelude::*;
use passage_rag::{
    embed::{cosine_similarity, EmbeddingProvider},
    Chunk, Chunker, ChunkingStrategy, HashingEmbedder, QualityFilter, RagConfig, VectorIndex,
};

fn sentence() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{2,8}( [a-z]{2,8}){2,8}[.!?]"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_chunk_ids_unique_and_ordered(
        sentences in prop::collection::vec(sentence(), 1..30),
        chunk_size in 40usize..300,
        overlap in 0usize..40
    ) {
        let overlap = overlap.min(chunk_size / 2);
        let text = sentences.join(" ");
        let chunks = Chunker::new(chunk_size, overlap).chunk_text(&text, "doc");

        prop_assert!(!chunks.is_empty());
        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(&chunk.chunk_id, &format!("doc_chunk_{i:04}"));
            prop_assert_eq!(chunk.metadata.chunk_index, i);
            prop_assert_eq!(chunk.metadata.page, 1);
            prop_assert_eq!(chunk.metadata.length, chunk.text.chars().count());
            prop_assert!(!chunk.text.trim().is_empty());
        }
    }

    #[test]
    fn prop_sentences_survive_chunking_in_order(
        sentences in prop::collection::vec(sentence(), 1..20),
        chunk_size in 60usize..300
    ) {
        let text = sentences.join(" ");
        let chunks = Chunker::new(chunk_size, 0).chunk_text(&text, "doc");
        let rebuilt: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        prop_assert_eq!(rebuilt.join(" "), text);
    }

    #[test]
    fn prop_character_windows_bounded(
        text in "[a-zA-Z0-9]{1,600}",
        chunk_size in 10usize..120,
        overlap in 0usize..10
    ) {
        let chunker = Chunker::new(chunk_size, overlap).with_strategy(ChunkingStrategy::FixedSize);
        let chunks = chunker.chunk_text(&text, "doc");
        let stride = chunk_size - overlap;

        prop_assert_eq!(chunks.len(), text.len().div_ceil(stride));
        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert!(chunk.len() <= chunk_size);
            prop_assert!(text[i * stride..].starts_with(&chunk.text));
        }
    }

    #[test]
    fn prop_quality_filter_is_total(text in "\\PC{0,400}") {
        // Must not panic on arbitrary input
        let _ = QualityFilter::default().is_low_quality(&text);
    }

    #[test]
    fn prop_hashing_embeddings_are_unit_length(text in "[a-z]{1,12}( [a-z]{1,12}){0,30}") {
        let embedder = HashingEmbedder::new(128);
        let v = embedder.embed_one(&text).unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        prop_assert!((norm - 1.0).abs() < 1e-4);
        prop_assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-4);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(25))]

    #[test]
    fn prop_remove_document_keeps_others(
        a_count in 1usize..8,
        b_count in 0usize..8
    ) {
        let config = RagConfig {
            embedding_dimension: 64,
            similarity_threshold: 0.0,
            ..Default::default()
        };
        let index = VectorIndex::in_memory(HashingEmbedder::new(64), &config).unwrap();
        let a: Vec<Chunk> = (0..a_count)
            .map(|i| Chunk::new("a", format!("alpha passage {i}"), 1, i))
            .collect();
        let b: Vec<Chunk> = (0..b_count)
            .map(|i| Chunk::new("b", format!("beta passage {i}"), 1, i))
            .collect();
        index.add(a).unwrap();
        index.add(b).unwrap();

        prop_assert_eq!(index.remove_document("a").unwrap(), a_count);
        prop_assert_eq!(index.len(), b_count);
        let docs = index.documents();
        prop_assert!(docs.iter().all(|d| d.document_id == "b"));
        prop_assert!(index.search("alpha passage", Some(20), Some("a")).unwrap().is_empty());
    }
}
