//! Memory Recall
//!
//! Session-memory retrieval: ranks stored fragments of past work and
//! re-injects the most task-relevant ones into a new session.
//!
//! Three independent relevance signals feed one ranked result:
//!
//! - **Vector similarity** - cosine similarity against an external
//!   embedding store, consumed through the traits in [`store`]
//! - **Base importance** - a heuristic signal score with 30-day half-life
//!   recency decay ([`importance`])
//! - **Task-context boost** - knowledge-graph proximity between the
//!   entities a task mentions and the entities a memory mentions
//!   ([`graph`], [`task_context`])
//!
//! The result set is adaptive: its size varies with observed candidate
//! quality rather than always returning a fixed K. Corpus maintenance is
//! handled by the [`pruner`] (age, redundancy, and capacity eviction) and
//! the secondary [`cluster`] module for session summaries.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use memory_recall::{
//!     AdaptiveRetrievalEngine, EmbeddingProvider, InMemoryVectorStore,
//!     MemoryRecord, Result, VectorStore,
//! };
//!
//! struct StubEmbedder;
//!
//! impl EmbeddingProvider for StubEmbedder {
//!     fn embed(&self, _text: &str) -> Result<Vec<f32>> {
//!         Ok(vec![1.0, 0.0])
//!     }
//!     fn dimension(&self) -> usize {
//!         2
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let store = Arc::new(InMemoryVectorStore::new());
//! store.upsert(
//!     MemoryRecord::new("session-1", "Implemented retry logic in client.rs")
//!         .with_importance(8.0)
//!         .with_embedding(vec![0.9, 0.435]),
//! )?;
//!
//! let engine = AdaptiveRetrievalEngine::new(Arc::new(StubEmbedder), store);
//! let memories = engine.retrieve("session-1", "extend retry logic")?;
//! assert_eq!(memories.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod entity;
pub mod error;
pub mod graph;
pub mod importance;
pub mod pruner;
pub mod record;
pub mod retrieval;
pub mod store;
pub mod task_context;

// Re-exports for convenience
pub use cluster::{ClusterConfig, MemoryCluster, MemoryClusterer};
pub use entity::{Entity, EntityExtractor, EntityType, RelationKind, Relationship};
pub use error::{MemoryError, Result};
pub use graph::{GraphCache, GraphStats, KnowledgeGraph};
pub use importance::{ImportanceScorer, ScorableChunk};
pub use pruner::{MemoryPruner, PruneConfig, PrunePlan, PruneReport};
pub use record::{ArtifactFlags, ImportanceCategory, MemoryId, MemoryRecord};
pub use retrieval::{AdaptiveRetrievalEngine, RetrievalConfig, RetrievedMemory};
pub use store::{cosine_similarity, EmbeddingProvider, InMemoryVectorStore, ScoredHit, VectorStore};
pub use task_context::{TaskContext, TaskContextScorer, TaskScore};
