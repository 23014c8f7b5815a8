//! Task-context relevance scoring
//!
//! Turns a free-text task description into a relevance map over knowledge
//! graph entities, then boosts memory importance by how strongly a memory's
//! own entities overlap that map. Entities named directly by the task score
//! 1.0, their graph neighbors 0.5, and two-hop neighbors 0.25; an entity
//! reachable several ways keeps its best score.

use std::collections::HashMap;

use crate::entity::{Entity, EntityExtractor};
use crate::graph::KnowledgeGraph;
use crate::record::MemoryRecord;

/// Relevance assigned to entities the task names directly
pub const EXACT_RELEVANCE: f32 = 1.0;
/// Relevance assigned to direct graph neighbors of a task entity
pub const ONE_HOP_RELEVANCE: f32 = 0.5;
/// Relevance assigned to two-hop neighbors
pub const TWO_HOP_RELEVANCE: f32 = 0.25;

/// Default traversal depth when expanding task entities
pub const DEFAULT_MAX_HOPS: usize = 2;

/// A memory's score against one task context
#[derive(Debug, Clone)]
pub struct TaskScore {
    /// `base_importance * (1 + sum of matched relevances)`
    pub task_importance: f32,
    /// Entities shared with the task context, best relevance first
    pub matched: Vec<(String, f32)>,
}

/// Relevance map built from one task description against one graph snapshot
#[derive(Debug, Default)]
pub struct TaskContext {
    /// lowercase entity name -> relevance
    relevance: HashMap<String, f32>,
    /// lowercase entity name -> display name
    display: HashMap<String, String>,
}

impl TaskContext {
    /// Relevance for an entity name, case-insensitive
    pub fn relevance(&self, name: &str) -> Option<f32> {
        self.relevance.get(&name.to_lowercase()).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.relevance.is_empty()
    }

    pub fn len(&self) -> usize {
        self.relevance.len()
    }

    /// Boost a memory's importance by its overlap with the task context.
    ///
    /// With no overlap (or an empty context) the boost factor is 1 and the
    /// base importance passes through unchanged.
    pub fn score_memory(&self, record: &MemoryRecord) -> TaskScore {
        let mut matched: HashMap<String, f32> = HashMap::new();

        for entity in EntityExtractor::extract(&record.searchable_text()) {
            let key = entity.name.to_lowercase();
            if let Some(&relevance) = self.relevance.get(&key) {
                let name = self.display.get(&key).unwrap_or(&entity.name).clone();
                let best = matched.entry(name).or_insert(0.0);
                if relevance > *best {
                    *best = relevance;
                }
            }
        }

        let boost: f32 = matched.values().sum();
        let mut matched: Vec<(String, f32)> = matched.into_iter().collect();
        matched.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        TaskScore {
            task_importance: record.base_importance * (1.0 + boost),
            matched,
        }
    }

    /// Human-readable summary of the strongest context entities
    pub fn summary(&self, limit: usize) -> String {
        let mut entries: Vec<(&String, f32)> = self
            .relevance
            .iter()
            .map(|(key, &score)| (self.display.get(key).unwrap_or(key), score))
            .collect();
        entries.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        entries
            .iter()
            .take(limit)
            .map(|(name, score)| format!("{name} ({score:.2})"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn insert_max(&mut self, name: &str, relevance: f32) {
        let key = name.to_lowercase();
        let entry = self.relevance.entry(key.clone()).or_insert(0.0);
        if relevance > *entry {
            *entry = relevance;
        }
        self.display.entry(key).or_insert_with(|| name.to_string());
    }
}

/// Builds task contexts by expanding task entities through the graph
pub struct TaskContextScorer {
    max_hops: usize,
}

impl Default for TaskContextScorer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HOPS)
    }
}

impl TaskContextScorer {
    pub fn new(max_hops: usize) -> Self {
        Self { max_hops }
    }

    /// Entities mentioned by the task description itself
    pub fn extract_task_entities(task: &str) -> Vec<Entity> {
        EntityExtractor::extract(task)
    }

    /// Build the relevance map for a task against a graph snapshot.
    ///
    /// Task entities score 1.0 whether or not the graph knows them; a memory
    /// naming the same thing is relevant even if graph construction missed
    /// it. Neighbor tiers only extend as deep as `max_hops` allows.
    pub fn context_for(&self, graph: &KnowledgeGraph, task: &str) -> TaskContext {
        let mut context = TaskContext::default();
        let task_entities = Self::extract_task_entities(task);

        for entity in &task_entities {
            context.insert_max(&entity.name, EXACT_RELEVANCE);
        }

        if self.max_hops == 0 {
            return context;
        }

        for entity in &task_entities {
            if !graph.contains(&entity.name) {
                continue;
            }

            let one_hop = graph.related_entities(&entity.name, 1);
            for name in &one_hop {
                context.insert_max(name, ONE_HOP_RELEVANCE);
            }

            if self.max_hops >= 2 {
                let near: std::collections::HashSet<String> =
                    one_hop.iter().map(|n| n.to_lowercase()).collect();
                for name in graph.related_entities(&entity.name, 2) {
                    if !near.contains(&name.to_lowercase()) {
                        context.insert_max(&name, TWO_HOP_RELEVANCE);
                    }
                }
            }
        }

        log::debug!(
            "task context: {} entities from {} task mentions (max_hops={})",
            context.len(),
            task_entities.len(),
            self.max_hops
        );

        context
    }

    /// Explainability view of a task: each context entity with its relevance
    /// and, when the graph knows it, its PageRank
    pub fn describe(&self, graph: &KnowledgeGraph, task: &str) -> String {
        let context = self.context_for(graph, task);
        let mut entries: Vec<(String, f32)> = context
            .relevance
            .iter()
            .map(|(key, &score)| {
                (
                    context.display.get(key).cloned().unwrap_or_else(|| key.clone()),
                    score,
                )
            })
            .collect();
        entries.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        entries
            .into_iter()
            .map(|(name, relevance)| match graph.pagerank(&name) {
                Some(rank) => format!("{name} (relevance {relevance:.2}, pagerank {rank:.3})"),
                None => format!("{name} (relevance {relevance:.2})"),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemoryRecord;

    /// ChromaDB <- auth.rs -> tokens.rs: a two-hop chain from the tool
    fn chain_graph() -> KnowledgeGraph {
        let corpus = vec![
            MemoryRecord::new("s1", "Stored sessions in auth.rs backed by ChromaDB"),
            MemoryRecord::new("s1", "auth.rs depends on tokens.rs for claims"),
        ];
        KnowledgeGraph::build(&corpus, None)
    }

    #[test]
    fn test_exact_match_scores_one() {
        let graph = chain_graph();
        let context = TaskContextScorer::default().context_for(&graph, "tune ChromaDB compaction");
        assert_eq!(context.relevance("ChromaDB"), Some(1.0));
        assert_eq!(context.relevance("chromadb"), Some(1.0));
    }

    #[test]
    fn test_one_hop_neighbor_scores_half() {
        let graph = chain_graph();
        let context = TaskContextScorer::default().context_for(&graph, "tune ChromaDB compaction");
        assert_eq!(context.relevance("auth.rs"), Some(0.5));
    }

    #[test]
    fn test_two_hop_neighbor_scores_quarter_when_allowed() {
        let graph = chain_graph();
        let context = TaskContextScorer::new(2).context_for(&graph, "tune ChromaDB compaction");
        assert_eq!(context.relevance("tokens.rs"), Some(0.25));
    }

    #[test]
    fn test_hop_limit_of_one_excludes_two_hop_tier() {
        let graph = chain_graph();
        let context = TaskContextScorer::new(1).context_for(&graph, "tune ChromaDB compaction");
        assert_eq!(context.relevance("auth.rs"), Some(0.5));
        assert_eq!(context.relevance("tokens.rs"), None);
    }

    #[test]
    fn test_merge_keeps_best_relevance() {
        let graph = chain_graph();
        // auth.rs is both named by the task (1.0) and a neighbor of
        // ChromaDB (0.5); it must keep 1.0
        let context =
            TaskContextScorer::default().context_for(&graph, "rework auth.rs and ChromaDB");
        assert_eq!(context.relevance("auth.rs"), Some(1.0));
    }

    #[test]
    fn test_task_entity_absent_from_graph_still_counts() {
        let graph = chain_graph();
        let context = TaskContextScorer::default().context_for(&graph, "rewrite deploy.py steps");
        // deploy.py never appeared in the corpus
        assert!(!graph.contains("deploy.py"));
        assert_eq!(context.relevance("deploy.py"), Some(1.0));
    }

    #[test]
    fn test_score_memory_boosts_by_matched_relevance() {
        let graph = chain_graph();
        let context = TaskContextScorer::default().context_for(&graph, "tune ChromaDB compaction");

        // One-hop match: base 8 * (1 + 0.5) = 12
        let neighbor = MemoryRecord::new("s1", "refactored auth.rs claims").with_importance(8.0);
        let score = context.score_memory(&neighbor);
        assert!((score.task_importance - 12.0).abs() < 1e-5);
        assert_eq!(score.matched.len(), 1);
        assert_eq!(score.matched[0], ("auth.rs".to_string(), 0.5));

        // Exact match: base 8 * (1 + 1.0) = 16
        let exact = MemoryRecord::new("s1", "ChromaDB compaction finished").with_importance(8.0);
        let score = context.score_memory(&exact);
        assert!((score.task_importance - 16.0).abs() < 1e-5);
    }

    #[test]
    fn test_two_hop_boost_respects_hop_limit() {
        let graph = chain_graph();
        let memory = MemoryRecord::new("s1", "trimmed tokens.rs parsing").with_importance(8.0);

        let deep = TaskContextScorer::new(2).context_for(&graph, "tune ChromaDB compaction");
        let score = deep.score_memory(&memory);
        assert!((score.task_importance - 10.0).abs() < 1e-5);

        let shallow = TaskContextScorer::new(1).context_for(&graph, "tune ChromaDB compaction");
        let score = shallow.score_memory(&memory);
        assert!((score.task_importance - 8.0).abs() < 1e-5);
        assert!(score.matched.is_empty());
    }

    #[test]
    fn test_no_overlap_passes_base_importance_through() {
        let graph = chain_graph();
        let context = TaskContextScorer::default().context_for(&graph, "tune ChromaDB compaction");
        let unrelated = MemoryRecord::new("s1", "wrote release notes").with_importance(6.0);
        let score = context.score_memory(&unrelated);
        assert_eq!(score.task_importance, 6.0);
        assert!(score.matched.is_empty());
    }

    #[test]
    fn test_empty_task_yields_empty_context() {
        let graph = chain_graph();
        let context = TaskContextScorer::default().context_for(&graph, "do something nice");
        assert!(context.is_empty());
    }

    #[test]
    fn test_describe_includes_pagerank_for_graph_entities() {
        let graph = chain_graph();
        let description =
            TaskContextScorer::default().describe(&graph, "tune ChromaDB compaction");
        let first = description.lines().next().unwrap();
        assert!(first.starts_with("ChromaDB (relevance 1.00, pagerank"));
    }

    #[test]
    fn test_summary_lists_strongest_first() {
        let graph = chain_graph();
        let context = TaskContextScorer::default().context_for(&graph, "tune ChromaDB compaction");
        let summary = context.summary(2);
        assert!(summary.starts_with("ChromaDB (1.00)"));
        assert!(summary.contains("auth.rs (0.50)"));
    }
}
