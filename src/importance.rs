//! Heuristic importance scoring
//!
//! Scores a memory chunk from ten independent keyword/pattern signals over
//! its intent, action, and outcome text, then applies a 30-day half-life
//! recency decay to the aggregate. Scoring never fails; a signal that cannot
//! be evaluated simply contributes nothing.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::record::ImportanceCategory;

/// Fixed weights for the scoring signals
mod weights {
    pub const DECISION_MARKER: f32 = 10.0;
    pub const ERROR_RESOLUTION: f32 = 8.0;
    pub const FILE_CREATION: f32 = 6.0;
    pub const FILE_MODIFICATION: f32 = 4.0;
    pub const TEST_SUCCESS: f32 = 5.0;
    pub const LEARNING: f32 = 7.0;
    pub const TOOL_USE: f32 = 3.0;
    pub const TOOL_USE_CAP: f32 = 15.0;
    pub const USER_DIRECTIVE: f32 = 9.0;
    pub const CODE_SNIPPET: f32 = 4.0;
    pub const ARCHITECTURE: f32 = 5.0;
}

/// Half-life for recency decay, in days
const RECENCY_HALF_LIFE_DAYS: f64 = 30.0;

static DECISION_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\b(?:decided|chose|selected|picked|opted)\s+to\b").expect("decision re"),
        Regex::new(r"\bgoing\s+to\s+use\b").expect("decision re"),
        Regex::new(r"\bwill\s+use\b").expect("decision re"),
        Regex::new(r"\bdecision:").expect("decision re"),
    ]
});

static ERROR_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\b(?:fixed|resolved|solved|debugged)\b").expect("error re"),
        Regex::new(r"\berror.*resolved\b").expect("error re"),
        Regex::new(r"\bbug.*fixed\b").expect("error re"),
        Regex::new(r"\bissue.*solved\b").expect("error re"),
    ]
});

static FILE_CREATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bcreated?\s+[\w/\-]+\.(?:rs|ts|js|py|go|java|cpp|c|h)\b").expect("create re")
});

static FILE_MODIFY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bmodified?\s+[\w/\-]+\.(?:rs|ts|js|py|go|java|cpp|c|h)\b").expect("modify re")
});

static TEST_SUCCESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\btests?\s+(?:pass(?:ed|ing)?|succeed(?:ed)?)\b").expect("test re")
});

static LEARNING_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\b(?:learned|discovered|realized|found\s+that)\b").expect("learning re"),
        Regex::new(r"\bkey\s+insight\b").expect("learning re"),
        Regex::new(r"\bimportant:").expect("learning re"),
    ]
});

static USER_DIRECTIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:please|can\s+you|i\s+want|i\s+need|help\s+me)").expect("directive re")
});

static CODE_SNIPPET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```|`\w+`|\bcode\b").expect("code re"));

static ARCHITECTURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:architecture|diagram|design|flow|structure)\b").expect("architecture re")
});

/// A not-yet-stored memory chunk to score
#[derive(Debug, Clone, Default)]
pub struct ScorableChunk<'a> {
    pub intent: &'a str,
    pub action: &'a str,
    pub outcome: &'a str,
    pub tool_count: u32,
    /// Timestamp if known; decay is skipped when absent or in the future
    pub timestamp: Option<DateTime<Utc>>,
}

/// Heuristic importance scorer
pub struct ImportanceScorer;

impl ImportanceScorer {
    /// Score a chunk against all signals and apply recency decay.
    pub fn score(chunk: &ScorableChunk<'_>) -> f32 {
        Self::score_at(chunk, Utc::now())
    }

    /// Score with an explicit "now" for deterministic decay.
    pub fn score_at(chunk: &ScorableChunk<'_>, now: DateTime<Utc>) -> f32 {
        let intent = chunk.intent.to_lowercase();
        let action = chunk.action.to_lowercase();
        let outcome = chunk.outcome.to_lowercase();
        let combined = format!("{intent} {action} {outcome}");

        let mut score = 0.0;

        if DECISION_RES.iter().any(|re| re.is_match(&combined)) {
            score += weights::DECISION_MARKER;
        }

        if ERROR_RES.iter().any(|re| re.is_match(&combined)) {
            score += weights::ERROR_RESOLUTION;
        }

        if FILE_CREATE_RE.is_match(&action) {
            score += weights::FILE_CREATION;
        }

        if FILE_MODIFY_RE.is_match(&action) {
            score += weights::FILE_MODIFICATION;
        }

        if TEST_SUCCESS_RE.is_match(&outcome) {
            score += weights::TEST_SUCCESS;
        }

        if LEARNING_RES.iter().any(|re| re.is_match(&combined)) {
            score += weights::LEARNING;
        }

        if chunk.tool_count > 0 {
            score += (chunk.tool_count as f32 * weights::TOOL_USE).min(weights::TOOL_USE_CAP);
        }

        if USER_DIRECTIVE_RE.is_match(&intent) {
            score += weights::USER_DIRECTIVE;
        }

        if CODE_SNIPPET_RE.is_match(&combined) {
            score += weights::CODE_SNIPPET;
        }

        if ARCHITECTURE_RE.is_match(&combined) {
            score += weights::ARCHITECTURE;
        }

        score * Self::decay_factor(chunk.timestamp, now)
    }

    /// Score and categorize in one call
    pub fn score_and_categorize(chunk: &ScorableChunk<'_>) -> (f32, ImportanceCategory) {
        let score = Self::score(chunk);
        (score, ImportanceCategory::from_score(score))
    }

    /// Score a batch of chunks
    pub fn score_chunks(chunks: &[ScorableChunk<'_>]) -> Vec<(f32, ImportanceCategory)> {
        chunks.iter().map(Self::score_and_categorize).collect()
    }

    /// Categorize a raw score into a tier
    pub fn categorize(score: f32) -> ImportanceCategory {
        ImportanceCategory::from_score(score)
    }

    /// Half-life recency factor: 0.5^(age_days / 30). Missing or future
    /// timestamps skip decay and leave the score unchanged.
    fn decay_factor(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f32 {
        let Some(ts) = timestamp else {
            return 1.0;
        };
        let age_days = (now - ts).num_seconds() as f64 / 86_400.0;
        if age_days < 0.0 {
            log::debug!("skipping recency decay for future timestamp {ts}");
            return 1.0;
        }
        0.5_f64.powf(age_days / RECENCY_HALF_LIFE_DAYS) as f32
    }
}
