//! Adaptive-K retrieval
//!
//! Combines three independent relevance signals into one ranked result set:
//! vector similarity from the store, the importance score assigned at
//! ingestion, and the task-context boost from the knowledge graph. The
//! result size is adaptive: it varies from zero to `max_results` based on
//! how good the candidates actually are, instead of always returning a
//! fixed K.
//!
//! An empty result is a valid outcome meaning nothing relevant was stored;
//! embedding or store failures surface as errors and are never conflated
//! with it.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::{GraphCache, KnowledgeGraph, DEFAULT_GRAPH_TTL};
use crate::record::MemoryRecord;
use crate::store::{EmbeddingProvider, ScoredHit, VectorStore};
use crate::task_context::{TaskContextScorer, DEFAULT_MAX_HOPS};

/// Tuning knobs for the retrieval pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Ceiling on returned results
    pub max_results: usize,
    /// Candidates requested from the vector store before filtering
    pub candidate_pool: usize,
    /// Candidates below this base importance are dropped
    pub min_importance: f32,
    /// Candidates below this similarity are dropped
    pub min_similarity: f32,
    /// Similarity at or above this lands in the high bucket
    pub high_similarity: f32,
    /// Graph traversal depth for task-context expansion
    pub max_hops: usize,
    /// Freshness TTL for the cached knowledge graph, seconds
    pub graph_ttl_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: 20,
            candidate_pool: 50,
            min_importance: 5.0,
            min_similarity: 0.4,
            high_similarity: 0.6,
            max_hops: DEFAULT_MAX_HOPS,
            graph_ttl_secs: DEFAULT_GRAPH_TTL.as_secs(),
        }
    }
}

/// One retrieved memory with the scores that ranked it
#[derive(Debug, Clone)]
pub struct RetrievedMemory {
    pub record: MemoryRecord,
    /// Cosine similarity to the task embedding
    pub similarity: f32,
    /// Importance after the task-context boost
    pub task_importance: f32,
    /// `similarity * task_importance`; the ranking key
    pub combined_score: f32,
    /// Task-context entities this memory shares, best first
    pub matched_entities: Vec<(String, f32)>,
}

/// Orchestrates similarity search, importance thresholds, and task-context
/// boosts into a ranked, variable-size result
pub struct AdaptiveRetrievalEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    graph_cache: GraphCache,
    scorer: TaskContextScorer,
    config: RetrievalConfig,
}

impl AdaptiveRetrievalEngine {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self::with_config(embedder, store, RetrievalConfig::default())
    }

    pub fn with_config(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            graph_cache: GraphCache::new(Duration::from_secs(config.graph_ttl_secs)),
            scorer: TaskContextScorer::new(config.max_hops),
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Drop the cached knowledge graph; the next retrieval rebuilds it
    pub fn invalidate_graph(&self) {
        self.graph_cache.invalidate();
    }

    /// Retrieve the memories most relevant to `task` within one session.
    ///
    /// Returns an empty vec when nothing clears the quality bars; that is a
    /// deliberate "nothing relevant" signal, not an error. Embedding and
    /// vector-store failures propagate.
    pub fn retrieve(&self, session_id: &str, task: &str) -> Result<Vec<RetrievedMemory>> {
        let embedding = self.embedder.embed(task)?;
        let hits = self
            .store
            .query(&embedding, Some(session_id), self.config.candidate_pool)?;

        if hits.is_empty() {
            log::debug!("retrieval: no candidates stored for session {session_id}");
            return Ok(Vec::new());
        }

        let candidates = self.filter_candidates(hits);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let graph = self.graph();
        let context = self.scorer.context_for(&graph, task);

        let mut high = Vec::new();
        let mut medium = Vec::new();
        for hit in candidates {
            let task_score = context.score_memory(&hit.record);
            let scored = RetrievedMemory {
                similarity: hit.similarity,
                task_importance: task_score.task_importance,
                combined_score: hit.similarity * task_score.task_importance,
                matched_entities: task_score.matched,
                record: hit.record,
            };
            if scored.similarity >= self.config.high_similarity {
                high.push(scored);
            } else {
                medium.push(scored);
            }
        }

        let results = self.select_adaptive(high, medium);
        log::debug!(
            "retrieval: {} results for session {session_id} ({} context entities)",
            results.len(),
            context.len()
        );
        Ok(results)
    }

    /// Apply the importance and similarity floors, then deduplicate by
    /// normalized text keeping the most similar copy
    fn filter_candidates(&self, hits: Vec<ScoredHit>) -> Vec<ScoredHit> {
        let mut seen = std::collections::HashSet::new();
        hits.into_iter()
            .filter(|hit| {
                hit.record.base_importance >= self.config.min_importance
                    && hit.similarity >= self.config.min_similarity
            })
            .filter(|hit| seen.insert(normalize_text(&hit.record.text)))
            .collect()
    }

    /// Tiered fallback over the similarity buckets:
    /// - five or more high-similarity hits: top `max_results` of high alone
    /// - some high: high plus up to 5 medium, capped at `max_results`
    /// - medium only: at most 3
    /// - otherwise empty
    fn select_adaptive(
        &self,
        mut high: Vec<RetrievedMemory>,
        mut medium: Vec<RetrievedMemory>,
    ) -> Vec<RetrievedMemory> {
        sort_by_combined(&mut high);
        sort_by_combined(&mut medium);

        let mut results = if high.len() >= 5 {
            high
        } else if !high.is_empty() {
            medium.truncate(5);
            high.extend(medium);
            sort_by_combined(&mut high);
            high
        } else if !medium.is_empty() {
            medium.truncate(3);
            medium
        } else {
            Vec::new()
        };

        results.truncate(self.config.max_results);
        results
    }

    /// Current knowledge graph, rebuilt from the whole store when stale.
    /// An unreadable corpus degrades to an empty graph instead of failing
    /// the retrieval.
    fn graph(&self) -> Arc<KnowledgeGraph> {
        self.graph_cache.get_or_rebuild(|| {
            match self.store.all_records() {
                Ok(corpus) => KnowledgeGraph::build(&corpus, None),
                Err(err) => {
                    log::warn!("graph rebuild failed, serving empty graph: {err}");
                    KnowledgeGraph::empty()
                }
            }
        })
    }
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn sort_by_combined(memories: &mut [RetrievedMemory]) {
    memories.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
