//! Durable storage for the vector index
//!
//! An index directory holds two artifacts:
//!
//! - `vectors.bin`: the bincode-encoded [`FlatIpIndex`], compressed with the
//!   configured [`Compression`]
//! - `mapping.json`: `{"dimension": D, "entries": [{"slot": i, "chunk": {..}}]}`
//!
//! Both are rewritten after every mutation. Each artifact is staged in a
//! temp file in the same directory and both are renamed into place only
//! once both temp files are written.

use crate::{chunk::Chunk, index::FlatIpIndex, Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// File name of the vector artifact
pub const VECTORS_FILE: &str = "vectors.bin";
/// File name of the slot-to-chunk mapping
pub const MAPPING_FILE: &str = "mapping.json";

/// Compression algorithm for the vector artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// LZ4, fast (default)
    #[default]
    Lz4,
    /// ZSTD, better ratio
    Zstd,
}

impl Compression {
    /// Get algorithm name as string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }

    /// Compress data using this algorithm
    ///
    /// # Errors
    /// Returns error if compression fails
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            Self::Zstd => zstd::encode_all(data, 3).map_err(|e| {
                Error::SerializationError(format!("ZSTD compression failed: {e}"))
            }),
        }
    }

    /// Decompress data using this algorithm
    ///
    /// # Errors
    /// Returns error if the data is corrupted or was written with another algorithm
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Lz4 => lz4_flex::decompress_size_prepended(data).map_err(|e| {
                Error::SerializationError(format!("LZ4 decompression failed: {e}"))
            }),
            Self::Zstd => zstd::decode_all(data).map_err(|e| {
                Error::SerializationError(format!("ZSTD decompression failed: {e}"))
            }),
        }
    }
}

/// Serialize a value to compressed bincode bytes
///
/// # Errors
/// Returns error if serialization or compression fails
pub fn serialize_compressed<T: Serialize>(value: &T, compression: Compression) -> Result<Vec<u8>> {
    let bytes = bincode::serialize(value)
        .map_err(|e| Error::SerializationError(format!("bincode serialization failed: {e}")))?;
    compression.compress(&bytes)
}

/// Deserialize a value from compressed bincode bytes
///
/// # Errors
/// Returns error if decompression or deserialization fails
pub fn deserialize_compressed<T: DeserializeOwned>(
    data: &[u8],
    compression: Compression,
) -> Result<T> {
    let decompressed = compression.decompress(data)?;
    bincode::deserialize(&decompressed)
        .map_err(|e| Error::SerializationError(format!("bincode deserialization failed: {e}")))
}

#[derive(Serialize)]
struct MappingRef<'a> {
    dimension: usize,
    entries: Vec<EntryRef<'a>>,
}

#[derive(Serialize)]
struct EntryRef<'a> {
    slot: usize,
    chunk: &'a Chunk,
}

#[derive(Deserialize)]
struct Mapping {
    dimension: usize,
    entries: Vec<Entry>,
}

#[derive(Deserialize)]
struct Entry {
    slot: usize,
    chunk: Chunk,
}

/// Reads and writes an index directory
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
    compression: Compression,
}

impl IndexStore {
    /// Create a store rooted at `dir` (created on first save)
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, compression: Compression) -> Self {
        Self {
            dir: dir.into(),
            compression,
        }
    }

    /// Get the store directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the vector artifact compression
    #[must_use]
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Path of the vector artifact
    #[must_use]
    pub fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE)
    }

    /// Path of the mapping artifact
    #[must_use]
    pub fn mapping_path(&self) -> PathBuf {
        self.dir.join(MAPPING_FILE)
    }

    /// Write both artifacts
    ///
    /// `chunks[i]` is the chunk bound to slot `i` of `index`.
    ///
    /// # Errors
    /// Returns [`Error::Storage`] if the slot and chunk counts disagree, or an
    /// I/O or serialization error if either artifact cannot be written.
    pub fn save(&self, index: &FlatIpIndex, chunks: &[Chunk]) -> Result<()> {
        if index.len() != chunks.len() {
            return Err(Error::Storage(format!(
                "{} vectors but {} chunks",
                index.len(),
                chunks.len()
            )));
        }

        fs::create_dir_all(&self.dir)?;

        let vectors = serialize_compressed(index, self.compression)?;
        let mapping = serde_json::to_vec(&MappingRef {
            dimension: index.dimension(),
            entries: chunks
                .iter()
                .enumerate()
                .map(|(slot, chunk)| EntryRef { slot, chunk })
                .collect(),
        })?;

        let staged_vectors = self.stage(&vectors)?;
        let staged_mapping = self.stage(&mapping)?;
        staged_vectors
            .persist(self.vectors_path())
            .map_err(|e| Error::Io(e.error))?;
        staged_mapping
            .persist(self.mapping_path())
            .map_err(|e| Error::Io(e.error))?;

        info!(
            vectors = index.len(),
            dir = %self.dir.display(),
            compression = self.compression.as_str(),
            "saved vector index"
        );
        Ok(())
    }

    /// Read both artifacts
    ///
    /// Returns `Ok(None)` when the directory holds neither artifact.
    ///
    /// # Errors
    /// Returns an error if only one artifact exists, either fails to decode,
    /// the dimension differs from `expected_dimension`, the slots are not
    /// dense, or the vector and chunk counts differ.
    pub fn load(&self, expected_dimension: usize) -> Result<Option<(FlatIpIndex, Vec<Chunk>)>> {
        let vectors_path = self.vectors_path();
        let mapping_path = self.mapping_path();

        match (vectors_path.exists(), mapping_path.exists()) {
            (false, false) => return Ok(None),
            (true, false) => {
                return Err(Error::Storage(format!("{MAPPING_FILE} is missing")));
            }
            (false, true) => {
                return Err(Error::Storage(format!("{VECTORS_FILE} is missing")));
            }
            (true, true) => {}
        }

        let index: FlatIpIndex =
            deserialize_compressed(&fs::read(&vectors_path)?, self.compression)?;
        let mapping: Mapping = serde_json::from_slice(&fs::read(&mapping_path)?)?;

        if index.dimension() != expected_dimension {
            return Err(Error::DimensionMismatch {
                expected: expected_dimension,
                actual: index.dimension(),
            });
        }
        if !index.is_consistent() {
            return Err(Error::Storage(format!(
                "{VECTORS_FILE} length is not a multiple of the dimension"
            )));
        }
        if mapping.dimension != index.dimension() {
            return Err(Error::Storage(format!(
                "mapping dimension {} does not match vector dimension {}",
                mapping.dimension,
                index.dimension()
            )));
        }
        if mapping.entries.len() != index.len() {
            return Err(Error::Storage(format!(
                "{} vectors but {} mapping entries",
                index.len(),
                mapping.entries.len()
            )));
        }

        let mut chunks = Vec::with_capacity(mapping.entries.len());
        for (expected_slot, entry) in mapping.entries.into_iter().enumerate() {
            if entry.slot != expected_slot {
                return Err(Error::Storage(format!(
                    "mapping slot {} found at position {expected_slot}",
                    entry.slot
                )));
            }
            chunks.push(entry.chunk);
        }

        debug!(vectors = index.len(), dir = %self.dir.display(), "loaded vector index");
        Ok(Some((index, chunks)))
    }

    fn stage(&self, bytes: &[u8]) -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(bytes)?;
        file.as_file().sync_all()?;
        Ok(file)
    }
}
