//! Session memory clustering
//!
//! Secondary, navigation-oriented grouping of a session's memories:
//! average-linkage agglomerative clustering over embedding cosine distance,
//! with per-cluster keyword and file summaries and a one-level parent/child
//! hierarchy between clusters whose centroids land close together.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityExtractor, EntityType};
use crate::error::{MemoryError, Result};
use crate::record::{MemoryId, MemoryRecord};
use crate::store::cosine_similarity;

/// Clustering knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Merge down to exactly this many clusters (clamped to the record
    /// count); `None` stops automatically at `distance_threshold`
    pub target_clusters: Option<usize>,
    /// Automatic stop: merging halts once the closest pair is farther
    /// apart than this cosine distance
    pub distance_threshold: f32,
    /// Centroids closer than this make one cluster a child of another
    pub hierarchy_threshold: f32,
    /// Keywords reported per cluster
    pub max_keywords: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            target_clusters: None,
            distance_threshold: 0.5,
            hierarchy_threshold: 0.3,
            max_keywords: 5,
        }
    }
}

/// One cluster of session memories with its navigation summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCluster {
    pub id: usize,
    pub member_ids: Vec<MemoryId>,
    /// Most frequent content words across member texts
    pub keywords: Vec<String>,
    /// Files mentioned by the members
    pub files: Vec<String>,
    pub centroid: Vec<f32>,
    /// Id of the parent cluster, if this one nests under another
    pub parent: Option<usize>,
}

/// Average-linkage agglomerative clusterer
pub struct MemoryClusterer {
    config: ClusterConfig,
}

impl Default for MemoryClusterer {
    fn default() -> Self {
        Self::new(ClusterConfig::default())
    }
}

impl MemoryClusterer {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    /// Cluster a session's records by embedding proximity.
    ///
    /// Records without embeddings are skipped; fewer than two embeddable
    /// records is an error, since a single point has no cluster structure.
    pub fn cluster(&self, records: &[MemoryRecord]) -> Result<Vec<MemoryCluster>> {
        let embedded: Vec<&MemoryRecord> = records
            .iter()
            .filter(|r| r.embedding.is_some())
            .collect();
        if embedded.len() < records.len() {
            log::debug!(
                "clustering: skipping {} records without embeddings",
                records.len() - embedded.len()
            );
        }
        if embedded.len() < 2 {
            return Err(MemoryError::cluster(format!(
                "need at least 2 embedded records, got {}",
                embedded.len()
            )));
        }

        let groups = self.agglomerate(&embedded);
        let mut clusters: Vec<MemoryCluster> = groups
            .into_iter()
            .enumerate()
            .map(|(id, members)| self.summarize(id, &members, &embedded))
            .collect();

        self.link_hierarchy(&mut clusters);
        Ok(clusters)
    }

    /// Merge singleton clusters bottom-up under average linkage until the
    /// stop rule fires
    fn agglomerate(&self, records: &[&MemoryRecord]) -> Vec<Vec<usize>> {
        let n = records.len();
        let mut dist = vec![vec![0.0_f32; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = match (records[i].embedding.as_deref(), records[j].embedding.as_deref()) {
                    (Some(a), Some(b)) => 1.0 - cosine_similarity(a, b),
                    _ => 2.0,
                };
                dist[i][j] = d;
                dist[j][i] = d;
            }
        }

        let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
        let target = self
            .config
            .target_clusters
            .map(|k| k.clamp(1, n));

        while clusters.len() > 1 {
            if let Some(k) = target {
                if clusters.len() <= k {
                    break;
                }
            }

            // Closest pair under average linkage
            let mut best = (0usize, 1usize, f32::INFINITY);
            for a in 0..clusters.len() {
                for b in (a + 1)..clusters.len() {
                    let mut total = 0.0_f32;
                    for &i in &clusters[a] {
                        for &j in &clusters[b] {
                            total += dist[i][j];
                        }
                    }
                    let avg = total / (clusters[a].len() * clusters[b].len()) as f32;
                    if avg < best.2 {
                        best = (a, b, avg);
                    }
                }
            }

            if target.is_none() && best.2 > self.config.distance_threshold {
                break;
            }

            let merged = clusters.remove(best.1);
            clusters[best.0].extend(merged);
        }

        clusters
    }

    fn summarize(
        &self,
        id: usize,
        members: &[usize],
        records: &[&MemoryRecord],
    ) -> MemoryCluster {
        let member_records: Vec<&MemoryRecord> = members.iter().map(|&i| records[i]).collect();
        let combined: String = member_records
            .iter()
            .map(|r| r.searchable_text())
            .collect::<Vec<_>>()
            .join(" ");

        MemoryCluster {
            id,
            member_ids: member_records.iter().map(|r| r.id).collect(),
            keywords: self.keywords(&combined),
            files: Self::files(&combined),
            centroid: Self::centroid(&member_records),
            parent: None,
        }
    }

    /// Most frequent words longer than four characters, ties alphabetical
    fn keywords(&self, text: &str) -> Vec<String> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if word.len() > 4 {
                *counts.entry(word.to_string()).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(self.config.max_keywords)
            .map(|(word, _)| word)
            .collect()
    }

    fn files(text: &str) -> Vec<String> {
        let mut files: Vec<String> = EntityExtractor::extract(text)
            .into_iter()
            .filter(|e| e.kind == EntityType::File)
            .map(|e| e.name)
            .collect();
        files.sort();
        files.dedup();
        files
    }

    fn centroid(members: &[&MemoryRecord]) -> Vec<f32> {
        let Some(dim) = members
            .iter()
            .find_map(|r| r.embedding.as_ref().map(Vec::len))
        else {
            return Vec::new();
        };

        let mut sum = vec![0.0_f32; dim];
        let mut count = 0usize;
        for record in members {
            if let Some(embedding) = record.embedding.as_deref() {
                if embedding.len() == dim {
                    for (acc, value) in sum.iter_mut().zip(embedding) {
                        *acc += value;
                    }
                    count += 1;
                }
            }
        }
        if count > 0 {
            let scale = 1.0 / count as f32;
            sum.iter_mut().for_each(|v| *v *= scale);
        }
        sum
    }

    /// One-level nesting: a smaller cluster whose centroid sits within the
    /// hierarchy threshold of a larger root cluster becomes its child
    fn link_hierarchy(&self, clusters: &mut [MemoryCluster]) {
        let mut order: Vec<usize> = (0..clusters.len()).collect();
        order.sort_by(|&a, &b| {
            clusters[b]
                .member_ids
                .len()
                .cmp(&clusters[a].member_ids.len())
                .then_with(|| clusters[a].id.cmp(&clusters[b].id))
        });

        for pos in 1..order.len() {
            let child = order[pos];
            for &candidate in &order[..pos] {
                if clusters[candidate].parent.is_some() {
                    continue;
                }
                let distance =
                    1.0 - cosine_similarity(&clusters[child].centroid, &clusters[candidate].centroid);
                if distance < self.config.hierarchy_threshold {
                    clusters[child].parent = Some(clusters[candidate].id);
                    break;
                }
            }
        }
    }
}
