//! Memory pruning
//!
//! Keeps the stored corpus bounded with a per-session cascade: stale
//! low-importance records go first, then near-duplicate embeddings, then
//! whatever still exceeds the per-session capacity. Each stage only sees
//! the survivors of the previous one. Planning is separate from execution,
//! so a dry run returns exactly the deletion set an execute would apply.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};
use crate::record::{ImportanceCategory, MemoryId, MemoryRecord};
use crate::store::{cosine_similarity, VectorStore};

/// Eviction policy knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneConfig {
    /// Hard per-session record cap
    pub max_per_session: usize,
    /// Records older than this become age-prunable
    pub max_age_days: i64,
    /// Age-prunable records below this importance are pruned
    pub min_importance: f32,
    /// Embedding cosine similarity above this marks a near-duplicate pair
    pub redundancy_threshold: f32,
    /// Critical records are exempt from age pruning until this age
    pub critical_retention_days: i64,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            max_per_session: 500,
            max_age_days: 90,
            min_importance: 3.0,
            redundancy_threshold: 0.95,
            critical_retention_days: 365,
        }
    }
}

/// One planned deletion with its human-readable justification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneVictim {
    pub id: MemoryId,
    pub reason: String,
}

/// The deletion set a pruning pass would apply to one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrunePlan {
    pub session_id: String,
    pub examined: usize,
    pub victims: Vec<PruneVictim>,
}

impl PrunePlan {
    pub fn victim_ids(&self) -> Vec<MemoryId> {
        self.victims.iter().map(|v| v.id).collect()
    }
}

/// Outcome of an executed pruning pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneReport {
    pub session_id: String,
    pub pruned: usize,
    pub remaining: usize,
}

/// Cascading per-session eviction over a vector store
pub struct MemoryPruner {
    store: Arc<dyn VectorStore>,
    config: PruneConfig,
}

impl MemoryPruner {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self::with_config(store, PruneConfig::default())
    }

    pub fn with_config(store: Arc<dyn VectorStore>, config: PruneConfig) -> Self {
        Self { store, config }
    }

    /// Dry run: the deletion set for one session, with a reason per record,
    /// without touching storage
    pub fn plan(&self, session_id: &str) -> Result<PrunePlan> {
        self.plan_at(session_id, Utc::now())
    }

    /// Execute the cascade for one session. A storage error aborts the pass
    /// with nothing deleted.
    pub fn execute(&self, session_id: &str) -> Result<PruneReport> {
        let plan = self.plan(session_id)?;
        let pruned = plan.victims.len();

        if pruned > 0 {
            self.store
                .delete(&plan.victim_ids())
                .map_err(|err| MemoryError::prune(format!("aborted, nothing pruned: {err}")))?;
            log::info!("pruned {pruned} of {} memories in session {session_id}", plan.examined);
        }

        Ok(PruneReport {
            session_id: session_id.to_string(),
            pruned,
            remaining: plan.examined - pruned,
        })
    }

    /// Run the cascade over every session in the store
    pub fn prune_all_sessions(&self) -> Result<Vec<PruneReport>> {
        let mut reports = Vec::new();
        for session_id in self.store.session_ids()? {
            reports.push(self.execute(&session_id)?);
        }
        Ok(reports)
    }

    /// Build the plan against an explicit "now" so age math is deterministic
    fn plan_at(&self, session_id: &str, now: DateTime<Utc>) -> Result<PrunePlan> {
        let mut records = self.store.session_records(session_id)?;
        // Stable order so "keep the first encountered" is well defined:
        // oldest first, id as tiebreak
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.0.cmp(&b.id.0)));

        let examined = records.len();
        let mut victims = Vec::new();

        let survivors = self.prune_by_age(&records, now, &mut victims);
        let survivors = self.prune_redundant(survivors, &mut victims);
        self.prune_over_capacity(survivors, &mut victims);

        Ok(PrunePlan {
            session_id: session_id.to_string(),
            examined,
            victims,
        })
    }

    /// Stage 1: old and unimportant, with a retention window for criticals
    fn prune_by_age<'a>(
        &self,
        records: &'a [MemoryRecord],
        now: DateTime<Utc>,
        victims: &mut Vec<PruneVictim>,
    ) -> Vec<&'a MemoryRecord> {
        let mut survivors = Vec::with_capacity(records.len());
        for record in records {
            let age = record.age_days(now);
            let stale = age > self.config.max_age_days
                && record.base_importance < self.config.min_importance;
            let protected = record.category == ImportanceCategory::Critical
                && age < self.config.critical_retention_days;

            if stale && !protected {
                victims.push(PruneVictim {
                    id: record.id,
                    reason: format!(
                        "aged out: {age} days old with importance {:.1}",
                        record.base_importance
                    ),
                });
            } else {
                survivors.push(record);
            }
        }
        survivors
    }

    /// Stage 2: near-duplicate embeddings; the lower-importance member of a
    /// pair is pruned, ties keep the first encountered
    fn prune_redundant<'a>(
        &self,
        records: Vec<&'a MemoryRecord>,
        victims: &mut Vec<PruneVictim>,
    ) -> Vec<&'a MemoryRecord> {
        let mut alive = vec![true; records.len()];

        for i in 0..records.len() {
            if !alive[i] {
                continue;
            }
            let Some(a) = records[i].embedding.as_deref() else {
                continue;
            };
            for j in (i + 1)..records.len() {
                if !alive[j] {
                    continue;
                }
                let Some(b) = records[j].embedding.as_deref() else {
                    continue;
                };
                let similarity = cosine_similarity(a, b);
                if similarity <= self.config.redundancy_threshold {
                    continue;
                }

                // Prune the lower-importance member; on a tie the earlier
                // record wins
                let (victim, kept) = if records[j].base_importance > records[i].base_importance {
                    (i, j)
                } else {
                    (j, i)
                };
                alive[victim] = false;
                victims.push(PruneVictim {
                    id: records[victim].id,
                    reason: format!(
                        "near-duplicate of {} (similarity {similarity:.3})",
                        records[kept].id
                    ),
                });
                if victim == i {
                    break;
                }
            }
        }

        records
            .into_iter()
            .zip(alive)
            .filter_map(|(record, keep)| keep.then_some(record))
            .collect()
    }

    /// Stage 3: enforce the per-session cap by dropping the least important
    /// survivors
    fn prune_over_capacity(&self, records: Vec<&MemoryRecord>, victims: &mut Vec<PruneVictim>) {
        if records.len() <= self.config.max_per_session {
            return;
        }

        let mut by_importance = records;
        let over = by_importance.len() - self.config.max_per_session;
        by_importance.sort_by(|a, b| {
            a.base_importance
                .partial_cmp(&b.base_importance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });

        for record in by_importance.iter().take(over) {
            victims.push(PruneVictim {
                id: record.id,
                reason: format!(
                    "session over capacity: importance {:.1} below the cut",
                    record.base_importance
                ),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryVectorStore;
    use chrono::Duration;

    fn aged(session: &str, text: &str, days_old: i64, importance: f32) -> MemoryRecord {
        MemoryRecord::new(session, text)
            .with_timestamp(Utc::now() - Duration::days(days_old))
            .with_importance(importance)
            .with_embedding(vec![1.0, 0.0])
    }

    fn store_with(records: Vec<MemoryRecord>) -> Arc<InMemoryVectorStore> {
        let store = Arc::new(InMemoryVectorStore::new());
        for record in records {
            store.upsert(record).unwrap();
        }
        store
    }

    #[test]
    fn test_old_unimportant_record_is_pruned() {
        let mut stale = aged("s1", "old detail", 100, 2.0);
        stale.category = ImportanceCategory::Medium;
        let fresh = aged("s1", "recent work", 5, 2.0).with_embedding(vec![0.0, 1.0]);
        let important = aged("s1", "old but valuable", 100, 8.0);

        let store = store_with(vec![stale.clone(), fresh, important]);
        let plan = MemoryPruner::new(store).plan("s1").unwrap();

        assert_eq!(plan.victim_ids(), vec![stale.id]);
        assert!(plan.victims[0].reason.contains("aged out"));
    }

    #[test]
    fn test_critical_records_survive_age_pruning_within_retention() {
        let mut protected = aged("s1", "key decision", 100, 2.0);
        protected.category = ImportanceCategory::Critical;
        let mut expired = aged("s1", "ancient decision", 400, 2.0);
        expired.category = ImportanceCategory::Critical;

        let store = store_with(vec![protected, expired.clone()]);
        let plan = MemoryPruner::new(store).plan("s1").unwrap();

        assert_eq!(plan.victim_ids(), vec![expired.id]);
    }

    #[test]
    fn test_redundancy_prunes_lower_importance_member_only() {
        let keeper = aged("s1", "canonical version", 10, 7.0);
        let duplicate = aged("s1", "worse duplicate", 5, 5.0);
        let unrelated = aged("s1", "different topic", 5, 5.0).with_embedding(vec![0.0, 1.0]);

        let store = store_with(vec![keeper.clone(), duplicate.clone(), unrelated]);
        let plan = MemoryPruner::new(store).plan("s1").unwrap();

        assert_eq!(plan.victim_ids(), vec![duplicate.id]);
        assert!(plan.victims[0].reason.contains("near-duplicate"));
        // Never both members of a pair
        assert!(!plan.victim_ids().contains(&keeper.id));
    }

    #[test]
    fn test_redundancy_tie_keeps_first_encountered() {
        let older = aged("s1", "first write-up", 10, 5.0);
        let newer = aged("s1", "second write-up", 5, 5.0);

        let store = store_with(vec![older.clone(), newer.clone()]);
        let plan = MemoryPruner::new(store).plan("s1").unwrap();

        // Oldest-first ordering makes `older` the first encountered
        assert_eq!(plan.victim_ids(), vec![newer.id]);
    }

    #[test]
    fn test_capacity_prunes_lowest_importance() {
        let records = vec![
            aged("s1", "a", 1, 9.0).with_embedding(vec![1.0, 0.0]),
            aged("s1", "b", 2, 3.5).with_embedding(vec![0.0, 1.0]),
            aged("s1", "c", 3, 7.0).with_embedding(vec![0.7, 0.7]),
            aged("s1", "d", 4, 4.0).with_embedding(vec![-0.7, 0.7]),
        ];
        let low_ids = vec![records[1].id, records[3].id];

        let store = store_with(records);
        let pruner = MemoryPruner::with_config(
            store,
            PruneConfig {
                max_per_session: 2,
                ..PruneConfig::default()
            },
        );
        let plan = pruner.plan("s1").unwrap();

        assert_eq!(plan.victims.len(), 2);
        for id in plan.victim_ids() {
            assert!(low_ids.contains(&id));
        }
    }

    #[test]
    fn test_dry_run_matches_execute() {
        let mut stale = aged("s1", "old detail", 120, 1.0);
        stale.category = ImportanceCategory::Low;
        let dup_a = aged("s1", "same embedding", 5, 6.0);
        let dup_b = aged("s1", "same embedding again", 5, 4.0);
        let keeper = aged("s1", "unique", 5, 6.0).with_embedding(vec![0.0, 1.0]);

        let store = store_with(vec![stale, dup_a, dup_b, keeper]);
        let pruner = MemoryPruner::new(store.clone());

        let planned: std::collections::HashSet<MemoryId> =
            pruner.plan("s1").unwrap().victim_ids().into_iter().collect();
        let report = pruner.execute("s1").unwrap();

        assert_eq!(report.pruned, planned.len());
        assert_eq!(report.remaining, 4 - planned.len());
        for record in store.session_records("s1").unwrap() {
            assert!(!planned.contains(&record.id));
        }
    }

    #[test]
    fn test_prune_all_sessions_covers_each_session() {
        let store = store_with(vec![
            aged("s1", "old s1", 120, 1.0),
            aged("s1", "fresh s1", 1, 6.0).with_embedding(vec![0.0, 1.0]),
            aged("s2", "old s2", 120, 1.0),
        ]);
        let reports = MemoryPruner::new(store).prune_all_sessions().unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports.iter().map(|r| r.pruned).sum::<usize>(), 2);
    }

    #[test]
    fn test_storage_failure_aborts_with_nothing_pruned() {
        struct FailingDelete(InMemoryVectorStore);

        impl VectorStore for FailingDelete {
            fn upsert(&self, record: MemoryRecord) -> crate::error::Result<()> {
                self.0.upsert(record)
            }
            fn query(
                &self,
                embedding: &[f32],
                session_id: Option<&str>,
                limit: usize,
            ) -> crate::error::Result<Vec<crate::store::ScoredHit>> {
                self.0.query(embedding, session_id, limit)
            }
            fn delete(&self, _ids: &[MemoryId]) -> crate::error::Result<()> {
                Err(MemoryError::vector_store("disk detached"))
            }
            fn session_records(&self, session_id: &str) -> crate::error::Result<Vec<MemoryRecord>> {
                self.0.session_records(session_id)
            }
            fn all_records(&self) -> crate::error::Result<Vec<MemoryRecord>> {
                self.0.all_records()
            }
            fn session_ids(&self) -> crate::error::Result<Vec<String>> {
                self.0.session_ids()
            }
        }

        let inner = InMemoryVectorStore::new();
        inner.upsert(aged("s1", "old detail", 120, 1.0)).unwrap();
        let store = Arc::new(FailingDelete(inner));

        let err = MemoryPruner::new(store.clone()).execute("s1").unwrap_err();
        assert!(matches!(err, MemoryError::Prune(_)));
        assert_eq!(store.session_records("s1").unwrap().len(), 1);
    }

    #[test]
    fn test_empty_session_plans_nothing() {
        let store = store_with(Vec::new());
        let plan = MemoryPruner::new(store).plan("s1").unwrap();
        assert!(plan.victims.is_empty());
        assert_eq!(plan.examined, 0);
    }
}
