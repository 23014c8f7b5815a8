//! End-to-end retrieval pipeline tests over the public API

use std::sync::Arc;

use memory_recall::{
    AdaptiveRetrievalEngine, EmbeddingProvider, InMemoryVectorStore, MemoryError, MemoryPruner,
    MemoryRecord, Result, ScoredHit, VectorStore,
};

/// Maps every query to the x axis; stored embeddings control similarity
struct AxisEmbedder;

impl EmbeddingProvider for AxisEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }

    fn dimension(&self) -> usize {
        2
    }
}

/// Unit vector whose cosine against [1, 0] equals `similarity`
fn at_similarity(similarity: f32) -> Vec<f32> {
    vec![similarity, (1.0 - similarity * similarity).sqrt()]
}

fn memory(session: &str, text: &str, importance: f32, similarity: f32) -> MemoryRecord {
    MemoryRecord::new(session, text)
        .with_importance(importance)
        .with_embedding(at_similarity(similarity))
}

#[test]
fn retrieval_ranks_task_relevant_memories_first() {
    let store = Arc::new(InMemoryVectorStore::new());
    store
        .upsert(memory("s1", "Reworked auth.rs token checks", 8.0, 0.7))
        .unwrap();
    store
        .upsert(memory("s1", "Polished changelog wording", 8.0, 0.85))
        .unwrap();
    store
        .upsert(memory("s1", "Sketched release timeline", 6.0, 0.65))
        .unwrap();

    let engine = AdaptiveRetrievalEngine::new(Arc::new(AxisEmbedder), store);
    let results = engine.retrieve("s1", "harden auth.rs validation").unwrap();

    assert_eq!(results.len(), 3);
    // The auth.rs mention doubles importance and overtakes higher similarity
    assert_eq!(results[0].record.text, "Reworked auth.rs token checks");
    assert!(results[0].combined_score > results[1].combined_score);
    assert!(!results[0].matched_entities.is_empty());
}

#[test]
fn empty_result_is_success_while_store_failure_is_an_error() {
    struct BrokenStore;

    impl VectorStore for BrokenStore {
        fn upsert(&self, _record: MemoryRecord) -> Result<()> {
            Ok(())
        }
        fn query(
            &self,
            _embedding: &[f32],
            _session_id: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<ScoredHit>> {
            Err(MemoryError::vector_store("connection refused"))
        }
        fn delete(&self, _ids: &[memory_recall::MemoryId]) -> Result<()> {
            Ok(())
        }
        fn session_records(&self, _session_id: &str) -> Result<Vec<MemoryRecord>> {
            Ok(Vec::new())
        }
        fn all_records(&self) -> Result<Vec<MemoryRecord>> {
            Ok(Vec::new())
        }
        fn session_ids(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    // Nothing stored: a valid empty result
    let empty = AdaptiveRetrievalEngine::new(
        Arc::new(AxisEmbedder),
        Arc::new(InMemoryVectorStore::new()),
    );
    assert!(empty.retrieve("s1", "anything").unwrap().is_empty());

    // Store failure: an error, never an empty success
    let broken = AdaptiveRetrievalEngine::new(Arc::new(AxisEmbedder), Arc::new(BrokenStore));
    assert!(matches!(
        broken.retrieve("s1", "anything").unwrap_err(),
        MemoryError::VectorStore(_)
    ));
}

#[test]
fn pruning_then_retrieval_only_sees_survivors() {
    let store = Arc::new(InMemoryVectorStore::new());
    let stale = MemoryRecord::new("s1", "forgotten experiment")
        .with_timestamp(chrono::Utc::now() - chrono::Duration::days(200))
        .with_importance(1.0)
        .with_embedding(at_similarity(0.9));
    store.upsert(stale.clone()).unwrap();
    store
        .upsert(memory("s1", "current work item", 8.0, 0.8))
        .unwrap();

    let pruner = MemoryPruner::new(store.clone());
    let plan = pruner.plan("s1").unwrap();
    let report = pruner.execute("s1").unwrap();
    assert_eq!(plan.victim_ids(), vec![stale.id]);
    assert_eq!(report.pruned, 1);

    let engine = AdaptiveRetrievalEngine::new(Arc::new(AxisEmbedder), store);
    let results = engine.retrieve("s1", "pick up where I left off").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.text, "current work item");
}
