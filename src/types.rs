//! Memory, entity, and retrieval result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Unique identifier for memories
pub type MemoryId = String;

/// A single stored memory: a fact, utterance, or observation
///
/// `id` and `content` are immutable once created; callers who want to change
/// content insert a new memory instead. `last_accessed_at` and `access_count`
/// are bumped by the store on every retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    /// Unique identifier
    pub id: MemoryId,
    /// The memory content (immutable)
    pub content: String,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
    /// When the memory was last returned from a rank call
    pub last_accessed_at: DateTime<Utc>,
    /// Number of times this memory was retrieved
    pub access_count: u64,
    /// Entities mentioned in the content, as extracted at insert time
    pub entities: BTreeSet<EntityMention>,
    /// Explicit importance set by the caller; pins the memory against decay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance_override: Option<f32>,
    /// Source of the memory (e.g., "conversation", "import")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Additional metadata (flexible key-value storage)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Memory {
    /// Create a new memory at the given time
    pub fn new(
        content: impl Into<String>,
        entities: BTreeSet<EntityMention>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            created_at: at,
            last_accessed_at: at,
            access_count: 0,
            entities,
            importance_override: None,
            source: None,
            metadata: None,
        }
    }

    /// Pin this memory: decay weight becomes 1.0 regardless of age
    pub fn with_importance_override(mut self, importance: f32) -> Self {
        self.importance_override = Some(importance.clamp(0.0, 1.0));
        self
    }

    /// Set the source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether this memory is pinned against decay
    pub fn is_pinned(&self) -> bool {
        self.importance_override.is_some()
    }

    /// Age in fractional days at `now`
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds().max(0) as f64 / 86_400.0
    }
}

/// A typed entity mention, as produced by the extractor collaborator
///
/// Identity is the normalized name plus the type tag: "alice"/Person from two
/// different utterances is the same entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityMention {
    /// Normalized (lowercased, trimmed) entity name
    pub name: String,
    /// Type tag
    pub entity_type: EntityType,
}

impl EntityMention {
    /// Create a mention, normalizing the name
    pub fn new(name: impl AsRef<str>, entity_type: EntityType) -> Self {
        Self {
            name: normalize_entity_name(name.as_ref()),
            entity_type,
        }
    }
}

/// Normalize an entity name for identity comparison
pub fn normalize_entity_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Entity type tags
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Place,
    Topic,
    Other,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::Person => write!(f, "person"),
            EntityType::Place => write!(f, "place"),
            EntityType::Topic => write!(f, "topic"),
            EntityType::Other => write!(f, "other"),
        }
    }
}

/// A known entity and the memories that mention it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Normalized name (identity key together with `entity_type`)
    pub name: String,
    /// Type tag
    pub entity_type: EntityType,
    /// When this entity was first extracted
    pub first_seen_at: DateTime<Utc>,
    /// Memories that mention this entity
    pub linked_memory_ids: BTreeSet<MemoryId>,
}

/// Input for creating a memory
#[derive(Debug, Clone, Default)]
pub struct CreateMemoryInput {
    pub content: String,
    /// Creation time; defaults to `Utc::now()` when `None`
    pub at: Option<DateTime<Utc>>,
    /// Pin the memory with an explicit importance
    pub importance_override: Option<f32>,
    pub source: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl CreateMemoryInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }

    pub fn with_importance_override(mut self, importance: f32) -> Self {
        self.importance_override = Some(importance);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Per-component score contributions, kept for explainability
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ScoreBreakdown {
    /// Cosine similarity mapped to [0,1]; 0.0 if the memory was not a vector hit
    pub similarity: f64,
    /// Query-token overlap ratio in [0,1]
    pub keyword: f64,
    /// Time-decay retention weight in (0,1]
    pub decay: f64,
    /// Max learned profile weight across linked entities
    pub profile: f64,
}

/// One ranked retrieval hit; transient, discarded after the response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Id of the ranked memory
    pub memory_id: MemoryId,
    /// Fused score
    pub score: f64,
    /// Rank in results (1-based); expansion results continue the numbering
    pub rank: usize,
    /// Component contributions before weighting
    pub breakdown: ScoreBreakdown,
    /// True when this hit was appended via entity-graph expansion rather than
    /// ranked into the top-k
    pub via_expansion: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_identity_is_normalized_name_plus_type() {
        let a = EntityMention::new("  Alice ", EntityType::Person);
        let b = EntityMention::new("alice", EntityType::Person);
        let c = EntityMention::new("alice", EntityType::Topic);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn new_memory_satisfies_timestamp_invariants() {
        let now = Utc::now();
        let m = Memory::new("hello", BTreeSet::new(), now);
        assert_eq!(m.created_at, m.last_accessed_at);
        assert_eq!(m.access_count, 0);
        assert!(!m.is_pinned());
    }

    #[test]
    fn importance_override_is_clamped() {
        let m = Memory::new("x", BTreeSet::new(), Utc::now()).with_importance_override(3.0);
        assert_eq!(m.importance_override, Some(1.0));
    }
}
