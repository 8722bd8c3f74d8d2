//! Error types for passage-rag

use thiserror::Error;

/// Result type for passage-rag operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for chunking, indexing and retrieval
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration (fatal, raised before any I/O)
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Embedding dimension mismatch
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// Embedding provider failure
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Durable storage failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error (serde_json)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Serialization error (bincode/compression)
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Query processing error
    #[error("query error: {0}")]
    Query(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
