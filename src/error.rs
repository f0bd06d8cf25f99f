//! Error types for the memory engine

use thiserror::Error;

/// Main error type for the memory engine
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Malformed input, rejected before any mutation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown memory id or entity name
    #[error("Not found: {0}")]
    NotFound(String),

    /// Vector dimensionality does not match the configured index
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Bad ranking parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Cooperative cancellation: the caller-supplied deadline elapsed
    #[error("Deadline exceeded while ranking")]
    Timeout,

    /// The embedding collaborator failed; propagated as-is
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Snapshot encode/decode error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, MemoryError>;
