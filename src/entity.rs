//! Pattern-based entity and relationship extraction
//!
//! Recognizes typed entities (files, functions, classes, bugs, features,
//! decisions, tools) in free text and infers relationships between them from
//! co-occurrence inside a bounded context window around each match.
//!
//! Extraction is total: it never fails, and text with no matches yields an
//! empty list. It is also approximate by design; this is a regex lexicon,
//! not an NER model.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kinds of entities the extractor recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    File,
    Function,
    Class,
    Bug,
    Feature,
    Decision,
    Tool,
}

impl EntityType {
    /// Fixed extraction confidence per category
    pub fn confidence(&self) -> f32 {
        match self {
            Self::File => 0.9,
            Self::Function => 0.8,
            Self::Class => 0.85,
            Self::Bug => 0.75,
            Self::Feature => 0.7,
            Self::Decision => 0.8,
            Self::Tool => 0.9,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Function => "function",
            Self::Class => "class",
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Decision => "decision",
            Self::Tool => "tool",
        }
    }
}

/// A typed entity recognized in text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityType,
    pub name: String,
    /// Surrounding text captured for disambiguation and relationship
    /// inference
    pub context: String,
    pub confidence: f32,
    /// How many times this entity matched within one extraction pass;
    /// duplicates are merged into this count rather than discarded
    pub mentions: u32,
}

impl Entity {
    fn new(kind: EntityType, name: impl Into<String>, context: String) -> Self {
        Self {
            kind,
            name: name.into(),
            context,
            confidence: kind.confidence(),
            mentions: 1,
        }
    }

    /// Identity key: type plus case-insensitive name
    pub fn key(&self) -> (EntityType, String) {
        (self.kind, self.name.to_lowercase())
    }
}

/// Relationship kinds between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Modifies,
    Fixes,
    Uses,
    Implements,
    DependsOn,
    RelatesTo,
}

/// A directed relationship between two named entities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub kind: RelationKind,
    pub target: String,
    pub confidence: f32,
}

const SOURCE_EXTENSIONS: &str = "py|rs|go|js|ts|jsx|tsx|java|cpp|c|h|json|yaml|yml|toml|md|txt";

static FILE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(&format!(
            r"`([A-Za-z0-9_/\-.]+\.(?:{SOURCE_EXTENSIONS}))`"
        ))
        .expect("file pattern"),
        Regex::new(&format!(
            r"\b([A-Za-z0-9_][A-Za-z0-9_/\-]*\.(?:{SOURCE_EXTENSIONS}))\b"
        ))
        .expect("file pattern"),
    ]
});

static FUNCTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"`([A-Za-z_][A-Za-z0-9_]*)\(\)`").expect("function pattern"),
        Regex::new(r"\b(?:fn|def|function)\s+([A-Za-z_][A-Za-z0-9_]*)").expect("function pattern"),
    ]
});

static CLASS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\b(?:class|struct|enum|trait)\s+([A-Z][A-Za-z0-9_]*)")
            .expect("class pattern"),
        Regex::new(r"`([A-Z][A-Za-z0-9_]*)`\s+(?:class|struct|type)").expect("class pattern"),
    ]
});

static BUG_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\b([A-Z][A-Za-z]*(?:Error|Exception|Panic)):?\s*[^.]{0,100}")
            .expect("bug pattern"),
        Regex::new(r"(?i)\b(?:error|bug|issue|problem|failure|crash):\s*[^.]{10,100}")
            .expect("bug pattern"),
        Regex::new(r"(?i)\b(?:fixed|resolved|solved):\s*[^.]{10,100}").expect("bug pattern"),
    ]
});

static FEATURE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(
            r"(?i)\b(adaptive k|knowledge graph|temporal decay|embedding|retrieval|migration|extraction|pruning|clustering)\b",
        )
        .expect("feature pattern"),
        Regex::new(r"(?i)\b(?:implemented|added|built)\s+([^.]{10,80})").expect("feature pattern"),
    ]
});

static DECISION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\b(?:decided to|chose|selected|will use|strategy:|approach:)\s*[^.]{5,100}")
            .expect("decision pattern"),
        Regex::new(r"(?i)\bswitched to\s+[^.]{5,80}").expect("decision pattern"),
    ]
});

static TOOL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(
            r"\b(ChromaDB|RocksDB|SQLite|Qdrant|petgraph|tokio|serde|NetworkX|numpy|pandas|transformers|langchain|SentenceTransformer)\b",
        )
        .expect("tool pattern"),
        // Hyphenated package names like nomic-embed-text
        Regex::new(r"`([a-z][a-z0-9]*(?:-[a-z0-9]+)+)`").expect("tool pattern"),
    ]
});

static DEPENDS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([A-Za-z0-9_/\-.]+)\s+(?:depends on|requires|imports)\s+([A-Za-z0-9_/\-.]+)")
        .expect("depends pattern")
});

/// Clip a byte range to char boundaries and widen it by `pad` bytes on each
/// side. Keeps windowing safe on multi-byte text.
fn context_window(text: &str, start: usize, end: usize, pad: usize) -> String {
    let mut from = start.saturating_sub(pad);
    while from > 0 && !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + pad).min(text.len());
    while to < text.len() && !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].to_string()
}

/// Truncate a name to `max` chars without splitting a char
fn clip_name(name: &str, max: usize) -> String {
    name.chars().take(max).collect::<String>().trim().to_string()
}

/// Pattern-based extractor for entities and relationships
pub struct EntityExtractor;

impl EntityExtractor {
    /// Extract all entities from text, deduplicated by (type, lowercase
    /// name). Repeated matches merge into the survivor's mention count.
    pub fn extract(text: &str) -> Vec<Entity> {
        let mut raw = Vec::new();

        for re in FILE_PATTERNS.iter() {
            for cap in re.captures_iter(text) {
                let m = cap.get(1).unwrap_or_else(|| cap.get(0).unwrap());
                raw.push(Entity::new(
                    EntityType::File,
                    m.as_str().trim_matches('`'),
                    context_window(text, m.start(), m.end(), 50),
                ));
            }
        }

        for re in FUNCTION_PATTERNS.iter() {
            for cap in re.captures_iter(text) {
                let m = cap.get(1).unwrap_or_else(|| cap.get(0).unwrap());
                raw.push(Entity::new(
                    EntityType::Function,
                    m.as_str(),
                    context_window(text, m.start(), m.end(), 30),
                ));
            }
        }

        for re in CLASS_PATTERNS.iter() {
            for cap in re.captures_iter(text) {
                let m = cap.get(1).unwrap_or_else(|| cap.get(0).unwrap());
                raw.push(Entity::new(
                    EntityType::Class,
                    m.as_str(),
                    context_window(text, m.start(), m.end(), 30),
                ));
            }
        }

        for re in BUG_PATTERNS.iter() {
            for m in re.find_iter(text) {
                // Bug names keep the whole matched description, clipped
                raw.push(Entity::new(
                    EntityType::Bug,
                    clip_name(m.as_str(), 100),
                    context_window(text, m.start(), m.end(), 40),
                ));
            }
        }

        for re in FEATURE_PATTERNS.iter() {
            for cap in re.captures_iter(text) {
                let m = cap.get(1).unwrap_or_else(|| cap.get(0).unwrap());
                raw.push(Entity::new(
                    EntityType::Feature,
                    clip_name(m.as_str(), 80),
                    context_window(text, m.start(), m.end(), 40),
                ));
            }
        }

        for re in DECISION_PATTERNS.iter() {
            for m in re.find_iter(text) {
                raw.push(Entity::new(
                    EntityType::Decision,
                    clip_name(m.as_str(), 100),
                    context_window(text, m.start(), m.end(), 30),
                ));
            }
        }

        for re in TOOL_PATTERNS.iter() {
            for cap in re.captures_iter(text) {
                let m = cap.get(1).unwrap_or_else(|| cap.get(0).unwrap());
                raw.push(Entity::new(
                    EntityType::Tool,
                    m.as_str().trim_matches('`'),
                    context_window(text, m.start(), m.end(), 20),
                ));
            }
        }

        Self::deduplicate(raw)
    }

    /// Merge duplicate entities (same type + case-insensitive name),
    /// incrementing the survivor's mention count
    fn deduplicate(entities: Vec<Entity>) -> Vec<Entity> {
        let mut seen: HashMap<(EntityType, String), usize> = HashMap::new();
        let mut unique: Vec<Entity> = Vec::new();

        for entity in entities {
            match seen.get(&entity.key()) {
                Some(&idx) => unique[idx].mentions += 1,
                None => {
                    seen.insert(entity.key(), unique.len());
                    unique.push(entity);
                }
            }
        }

        unique
    }

    /// Infer relationships between already-extracted entities from textual
    /// co-occurrence within their context windows
    pub fn relationships(text: &str, entities: &[Entity]) -> Vec<Relationship> {
        let mut seen = std::collections::HashSet::new();
        let mut rels = Vec::new();
        let mut push = |rels: &mut Vec<Relationship>,
                        source: &str,
                        kind: RelationKind,
                        target: &str,
                        confidence: f32| {
            if source.eq_ignore_ascii_case(target) {
                return;
            }
            if seen.insert((source.to_lowercase(), kind, target.to_lowercase())) {
                rels.push(Relationship {
                    source: source.to_string(),
                    kind,
                    target: target.to_string(),
                    confidence,
                });
            }
        };

        for entity in entities {
            match entity.kind {
                // A feature or function whose context mentions a file
                // modifies it
                EntityType::File => {
                    for other in entities {
                        if matches!(other.kind, EntityType::Feature | EntityType::Function)
                            && other.context.contains(&entity.name)
                        {
                            push(&mut rels, &other.name, RelationKind::Modifies, &entity.name, 0.7);
                        }
                    }
                }
                // A feature co-occurring with a bug description fixes it
                EntityType::Bug => {
                    let head: String = entity.name.chars().take(30).collect();
                    for other in entities {
                        if other.kind == EntityType::Feature
                            && (other.context.contains(&head)
                                || entity.context.contains(&other.name))
                        {
                            push(&mut rels, &other.name, RelationKind::Fixes, &entity.name, 0.6);
                        }
                    }
                }
                // Files, features, and functions use the tools named in
                // their context
                EntityType::Tool => {
                    for other in entities {
                        if matches!(
                            other.kind,
                            EntityType::File | EntityType::Feature | EntityType::Function
                        ) && other.context.contains(&entity.name)
                        {
                            push(&mut rels, &other.name, RelationKind::Uses, &entity.name, 0.8);
                        }
                    }
                }
                // A function mentioned alongside a feature implements it
                EntityType::Function => {
                    for other in entities {
                        if other.kind == EntityType::Feature
                            && (other.context.contains(&entity.name)
                                || entity
                                    .context
                                    .to_lowercase()
                                    .contains(&other.name.to_lowercase()))
                        {
                            push(
                                &mut rels,
                                &entity.name,
                                RelationKind::Implements,
                                &other.name,
                                0.65,
                            );
                        }
                    }
                }
                // Decisions relate to whatever concrete entity they mention
                EntityType::Decision => {
                    for other in entities {
                        if matches!(
                            other.kind,
                            EntityType::File | EntityType::Tool | EntityType::Feature
                        ) && entity.context.contains(&other.name)
                        {
                            push(
                                &mut rels,
                                &entity.name,
                                RelationKind::RelatesTo,
                                &other.name,
                                0.5,
                            );
                        }
                    }
                }
                _ => {}
            }
        }

        // Explicit dependency markers between named entities
        let known: std::collections::HashSet<String> =
            entities.iter().map(|e| e.name.to_lowercase()).collect();
        for cap in DEPENDS_PATTERN.captures_iter(text) {
            let (source, target) = (&cap[1], &cap[2]);
            if known.contains(&source.to_lowercase()) && known.contains(&target.to_lowercase()) {
                push(&mut rels, source, RelationKind::DependsOn, target, 0.7);
            }
        }

        rels
    }

    /// Extract entities and their relationships in one pass
    pub fn extract_with_relationships(text: &str) -> (Vec<Entity>, Vec<Relationship>) {
        let entities = Self::extract(text);
        let relationships = Self::relationships(text, &entities);
        (entities, relationships)
    }
}
