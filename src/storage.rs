//! Serialization contract and snapshot persistence
//!
//! Backend selection belongs to the surrounding application; the engine only
//! defines what a persisted memory and profile weight look like, and ships a
//! single-file bincode backend as the zero-config default.

use crate::error::{MemoryError, Result};
use crate::profile::ProfileWeight;
use crate::types::{EntityMention, Memory, MemoryId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Persisted form of one memory, embedding included
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    pub embedding: Vec<f32>,
    pub entities: BTreeSet<EntityMention>,
    pub importance_override: Option<f32>,
    pub source: Option<String>,
    /// Metadata as a JSON string; bincode cannot decode `serde_json::Value`
    pub metadata: Option<String>,
}

impl MemoryRecord {
    /// Pair a live memory with its indexed embedding
    pub fn from_memory(memory: &Memory, embedding: Vec<f32>) -> Self {
        let metadata = memory.metadata.as_ref().map(|m| m.to_string());
        Self {
            id: memory.id.clone(),
            content: memory.content.clone(),
            created_at: memory.created_at,
            last_accessed_at: memory.last_accessed_at,
            access_count: memory.access_count,
            embedding,
            entities: memory.entities.clone(),
            importance_override: memory.importance_override,
            source: memory.source.clone(),
            metadata,
        }
    }

    /// Rebuild the in-memory record; the embedding goes back to the index.
    /// Metadata that fails to parse is dropped rather than failing the load.
    pub fn into_parts(self) -> (Memory, Vec<f32>) {
        let metadata = self
            .metadata
            .as_deref()
            .and_then(|m| serde_json::from_str(m).ok());
        (
            Memory {
                id: self.id,
                content: self.content,
                created_at: self.created_at,
                last_accessed_at: self.last_accessed_at,
                access_count: self.access_count,
                entities: self.entities,
                importance_override: self.importance_override,
                source: self.source,
                metadata,
            },
            self.embedding,
        )
    }
}

/// Full engine state as handed to a storage collaborator
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Snapshot {
    pub memories: Vec<MemoryRecord>,
    pub profiles: Vec<ProfileWeight>,
}

/// Persists and restores engine snapshots
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Load the last saved snapshot; an empty snapshot if none exists
    async fn load(&self) -> Result<Snapshot>;
}

/// Single-file bincode snapshot backend
pub struct BincodeSnapshotBackend {
    path: PathBuf,
}

impl BincodeSnapshotBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotBackend for BincodeSnapshotBackend {
    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let data = bincode::serialize(snapshot)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, data).await?;
        tracing::debug!(path = %self.path.display(), memories = snapshot.memories.len(), "snapshot saved");
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot> {
        if !self.path.exists() {
            return Ok(Snapshot::default());
        }
        let data = tokio::fs::read(&self.path).await?;
        bincode::deserialize(&data).map_err(|e| MemoryError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;

    fn sample_record() -> MemoryRecord {
        let now = Utc::now();
        let mut entities = BTreeSet::new();
        entities.insert(EntityMention::new("Alice", EntityType::Person));
        let memory = Memory::new("Alice likes coffee", entities, now);
        MemoryRecord::from_memory(&memory, vec![0.1, 0.2, 0.3])
    }

    #[test]
    fn record_round_trips_through_parts() {
        let record = sample_record();
        let (memory, embedding) = record.clone().into_parts();
        assert_eq!(MemoryRecord::from_memory(&memory, embedding), record);
    }

    #[tokio::test]
    async fn bincode_backend_round_trips_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let backend = BincodeSnapshotBackend::new(dir.path().join("state.bin"));

        let snapshot = Snapshot {
            memories: vec![sample_record()],
            profiles: vec![ProfileWeight {
                entity_name: "alice".into(),
                weight: 0.8,
                feedback_count: 3,
                last_updated_at: Utc::now(),
            }],
        };

        backend.save(&snapshot).await.unwrap();
        let loaded = backend.load().await.unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let backend = BincodeSnapshotBackend::new(dir.path().join("absent.bin"));
        let loaded = backend.load().await.unwrap();
        assert!(loaded.memories.is_empty());
        assert!(loaded.profiles.is_empty());
    }
}
