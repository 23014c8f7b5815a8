//! Storage seams: embedding provider and vector store
//!
//! The retrieval engine talks to embeddings and vector search through these
//! traits so the backing services stay swappable. `InMemoryVectorStore` is
//! the bundled implementation: a linear cosine scan over a concurrent map,
//! suitable for tests and small corpora.

use dashmap::DashMap;

use crate::error::Result;
use crate::record::{MemoryId, MemoryRecord};

/// Produces embedding vectors for text
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. Errors surface as `MemoryError::Embedding`.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimensionality of the vectors this provider produces
    fn dimension(&self) -> usize;
}

/// A record returned from a similarity query
#[derive(Debug, Clone)]
pub struct ScoredHit {
    pub record: MemoryRecord,
    /// Cosine similarity to the query embedding, in [-1, 1]
    pub similarity: f32,
}

/// Stores records and answers nearest-neighbor queries over their embeddings
pub trait VectorStore: Send + Sync {
    /// Insert or replace a record by id
    fn upsert(&self, record: MemoryRecord) -> Result<()>;

    /// Most similar records, best first, optionally scoped to one session
    fn query(
        &self,
        embedding: &[f32],
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredHit>>;

    /// Delete records by id; unknown ids are not an error
    fn delete(&self, ids: &[MemoryId]) -> Result<()>;

    /// All records for one session
    fn session_records(&self, session_id: &str) -> Result<Vec<MemoryRecord>>;

    /// Every stored record
    fn all_records(&self) -> Result<Vec<MemoryRecord>>;

    /// Distinct session ids present in the store
    fn session_ids(&self) -> Result<Vec<String>>;
}

/// Cosine similarity between two vectors. Mismatched lengths or a zero
/// vector yield 0.0 rather than an error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Linear-scan vector store over a concurrent map
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: DashMap<MemoryId, MemoryRecord>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl VectorStore for InMemoryVectorStore {
    fn upsert(&self, record: MemoryRecord) -> Result<()> {
        self.records.insert(record.id, record);
        Ok(())
    }

    fn query(
        &self,
        embedding: &[f32],
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredHit>> {
        let mut hits: Vec<ScoredHit> = self
            .records
            .iter()
            .filter(|entry| session_id.map_or(true, |s| entry.session_id == s))
            .filter_map(|entry| {
                let similarity = cosine_similarity(embedding, entry.embedding.as_deref()?);
                Some(ScoredHit {
                    record: entry.value().clone(),
                    similarity,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    fn delete(&self, ids: &[MemoryId]) -> Result<()> {
        for id in ids {
            self.records.remove(id);
        }
        Ok(())
    }

    fn session_records(&self, session_id: &str) -> Result<Vec<MemoryRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn all_records(&self) -> Result<Vec<MemoryRecord>> {
        Ok(self.records.iter().map(|entry| entry.value().clone()).collect())
    }

    fn session_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .records
            .iter()
            .map(|entry| entry.session_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
