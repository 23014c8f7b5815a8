//! Error types for memory-recall

use thiserror::Error;

/// Errors that can occur in the memory system.
///
/// Degraded-but-recoverable conditions (an empty or non-converging knowledge
/// graph, a single malformed scoring signal) do not surface here; those paths
/// continue with degraded output and log instead. The variants below are the
/// fatal outcomes a caller must distinguish — in particular a retrieval
/// failure is never conflated with the valid "nothing relevant" empty result.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Embedding provider call failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector store call failed
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Pruning pass aborted; the store was left unchanged
    #[error("Prune aborted: {0}")]
    Prune(String),

    /// Not enough records to cluster
    #[error("Cluster error: {0}")]
    Cluster(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// UUID parsing error
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    /// Record not found
    #[error("Memory not found: {0}")]
    NotFound(String),
}

impl MemoryError {
    /// Create an embedding error
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create a vector store error
    pub fn vector_store(msg: impl Into<String>) -> Self {
        Self::VectorStore(msg.into())
    }

    /// Create a prune error
    pub fn prune(msg: impl Into<String>) -> Self {
        Self::Prune(msg.into())
    }

    /// Create a cluster error
    pub fn cluster(msg: impl Into<String>) -> Self {
        Self::Cluster(msg.into())
    }

    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }
}

/// Result type for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;
