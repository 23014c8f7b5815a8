//! Memory record types
//!
//! Core types for representing stored memories. Records are fully typed at
//! the ingestion boundary: every field a downstream scorer reads is a
//! concrete value here, not an optional blob key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for memory records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new random MemoryId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MemoryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Importance tier for a scored memory.
///
/// `from_score` partitions `[0, ∞)` with no gaps or overlaps:
/// critical ≥ 20, high ≥ 10, medium ≥ 5, low otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportanceCategory {
    Critical,
    High,
    Medium,
    #[default]
    Low,
}

impl ImportanceCategory {
    /// Categorize a raw importance score into a tier
    pub fn from_score(score: f32) -> Self {
        if score >= 20.0 {
            Self::Critical
        } else if score >= 10.0 {
            Self::High
        } else if score >= 5.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Lowercase label, matching the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Display-oriented flags describing what a record's transcript contained.
/// Populated upstream by the artifact tagger; this crate only carries them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ArtifactFlags {
    #[serde(default)]
    pub has_code: bool,
    #[serde(default)]
    pub has_files: bool,
    #[serde(default)]
    pub has_architecture: bool,
}

/// A stored memory record: one condensed (intent, action, outcome) fragment
/// of past work, scored at ingestion time.
///
/// Records are immutable once stored; the only mutation the system performs
/// is deletion by the pruner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier
    pub id: MemoryId,
    /// Session the record belongs to
    pub session_id: String,
    /// When the work happened
    pub timestamp: DateTime<Utc>,
    /// Condensed description (the embedded document)
    pub text: String,
    /// What the user was trying to do
    #[serde(default)]
    pub intent: String,
    /// What was done
    #[serde(default)]
    pub action: String,
    /// How it ended
    #[serde(default)]
    pub outcome: String,
    /// Tool invocations observed in the fragment
    #[serde(default)]
    pub tool_count: u32,
    /// Heuristic importance assigned at ingestion
    pub base_importance: f32,
    /// Tier derived from `base_importance`
    pub category: ImportanceCategory,
    /// Artifact flags for display
    #[serde(default)]
    pub artifacts: ArtifactFlags,
    /// Embedding vector; opaque to this crate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl MemoryRecord {
    /// Create a record with the current timestamp and zero importance
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: MemoryId::new(),
            session_id: session_id.into(),
            timestamp: Utc::now(),
            text: text.into(),
            intent: String::new(),
            action: String::new(),
            outcome: String::new(),
            tool_count: 0,
            base_importance: 0.0,
            category: ImportanceCategory::Low,
            artifacts: ArtifactFlags::default(),
            embedding: None,
        }
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = intent.into();
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = outcome.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_tool_count(mut self, tool_count: u32) -> Self {
        self.tool_count = tool_count;
        self
    }

    /// Set the importance score and derive the tier from it
    pub fn with_importance(mut self, score: f32) -> Self {
        self.base_importance = score;
        self.category = ImportanceCategory::from_score(score);
        self
    }

    pub fn with_artifacts(mut self, artifacts: ArtifactFlags) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Full text used for entity extraction: document plus the structured
    /// intent/action/outcome fields
    pub fn searchable_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.text, self.intent, self.action, self.outcome
        )
    }

    /// Whole days elapsed since the record's timestamp. Future timestamps
    /// clamp to zero.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_days().max(0)
    }
}
