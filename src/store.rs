//! Canonical memory storage and its indices
//!
//! The store is the single writer and exclusive owner of Memory records. The
//! vector index and entity graph hold only memory ids, never references into
//! the store, so a deletion here can at worst leave a stale id elsewhere,
//! which readers resolve gracefully as not-found.

use crate::error::{MemoryError, Result};
use crate::types::{EntityMention, Memory, MemoryId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
struct StoreInner {
    by_id: HashMap<MemoryId, Memory>,
    /// Entity name -> (created_at, id), iterated in reverse for newest-first
    by_entity: HashMap<String, BTreeSet<(DateTime<Utc>, MemoryId)>>,
    /// Global time index
    by_time: BTreeSet<(DateTime<Utc>, MemoryId)>,
}

/// Owns the canonical set of Memory records
pub struct MemoryStore {
    dimension: usize,
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    /// Create a store validating embeddings of the given dimensionality
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: RwLock::new(StoreInner::default()),
        }
    }

    /// Configured embedding dimensionality
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Create and store a new memory.
    ///
    /// Validation happens before any mutation: empty content or a wrongly
    /// sized embedding rejects the insert with nothing applied. The embedding
    /// itself is owned by the vector index; it is passed here only so the
    /// store can enforce the dimensionality contract atomically with the
    /// content check.
    pub async fn insert(
        &self,
        content: impl Into<String>,
        entities: BTreeSet<EntityMention>,
        embedding: &[f32],
        at: DateTime<Utc>,
    ) -> Result<Memory> {
        self.insert_prepared(Memory::new(content, entities, at), embedding)
            .await
    }

    /// Validate and store a caller-built memory (e.g. one carrying a pin or
    /// source). Same contract as [`insert`](Self::insert).
    pub async fn insert_prepared(&self, memory: Memory, embedding: &[f32]) -> Result<Memory> {
        if memory.content.trim().is_empty() {
            return Err(MemoryError::Validation("content must not be empty".into()));
        }
        if embedding.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        self.insert_record(memory.clone()).await?;
        tracing::debug!(id = %memory.id, "memory inserted");
        Ok(memory)
    }

    /// Insert a fully formed record, e.g. from a snapshot import.
    /// Fails if the id already exists; ids and content are immutable.
    pub async fn insert_record(&self, memory: Memory) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.by_id.contains_key(&memory.id) {
            return Err(MemoryError::Validation(format!(
                "memory {} already exists; updates create a new memory",
                memory.id
            )));
        }

        for mention in &memory.entities {
            inner
                .by_entity
                .entry(mention.name.clone())
                .or_default()
                .insert((memory.created_at, memory.id.clone()));
        }
        inner.by_time.insert((memory.created_at, memory.id.clone()));
        inner.by_id.insert(memory.id.clone(), memory);
        Ok(())
    }

    /// Fetch a memory by id
    pub async fn get(&self, id: &str) -> Result<Memory> {
        self.inner
            .read()
            .await
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))
    }

    /// Fetch a memory by id, tolerating stale ids from other components
    pub async fn try_get(&self, id: &str) -> Option<Memory> {
        self.inner.read().await.by_id.get(id).cloned()
    }

    /// Record a retrieval: bump `last_accessed_at` and `access_count`.
    /// Clamped so `created_at <= last_accessed_at` always holds.
    pub async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let memory = inner
            .by_id
            .get_mut(id)
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;
        memory.last_accessed_at = at.max(memory.created_at).max(memory.last_accessed_at);
        memory.access_count += 1;
        Ok(())
    }

    /// Remove a memory and its index entries, returning the removed record
    /// so the caller can cascade removal into the vector index and graph
    pub async fn delete(&self, id: &str) -> Result<Memory> {
        let mut inner = self.inner.write().await;
        let memory = inner
            .by_id
            .remove(id)
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;

        for mention in &memory.entities {
            if let Some(set) = inner.by_entity.get_mut(&mention.name) {
                set.remove(&(memory.created_at, memory.id.clone()));
                if set.is_empty() {
                    inner.by_entity.remove(&mention.name);
                }
            }
        }
        inner.by_time.remove(&(memory.created_at, memory.id.clone()));
        tracing::debug!(id = %memory.id, "memory deleted");
        Ok(memory)
    }

    /// Memories mentioning an entity, newest first
    pub async fn list_by_entity(&self, entity_name: &str) -> Vec<Memory> {
        let inner = self.inner.read().await;
        let Some(ids) = inner.by_entity.get(entity_name) else {
            return Vec::new();
        };
        ids.iter()
            .rev()
            .filter_map(|(_, id)| inner.by_id.get(id).cloned())
            .collect()
    }

    /// Memories whose content shares tokens with the query, scored by the
    /// fraction of query tokens present. Bounded full scan; content is small
    /// conversational text.
    pub async fn keyword_candidates(&self, query_tokens: &HashSet<String>) -> Vec<(MemoryId, f64)> {
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let inner = self.inner.read().await;
        let mut out = Vec::new();
        for (id, memory) in &inner.by_id {
            let content_tokens = crate::ranker::tokenize(&memory.content);
            let overlap = query_tokens
                .iter()
                .filter(|t| content_tokens.contains(*t))
                .count();
            if overlap > 0 {
                out.push((id.clone(), overlap as f64 / query_tokens.len() as f64));
            }
        }
        out
    }

    /// Number of stored memories
    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.by_id.is_empty()
    }

    /// The most recently created memories, newest first
    pub async fn recent(&self, limit: usize) -> Vec<Memory> {
        let inner = self.inner.read().await;
        inner
            .by_time
            .iter()
            .rev()
            .take(limit)
            .filter_map(|(_, id)| inner.by_id.get(id).cloned())
            .collect()
    }

    /// Export every record, ordered by id, for the storage collaborator
    pub async fn export(&self) -> Vec<Memory> {
        let inner = self.inner.read().await;
        let mut all: Vec<Memory> = inner.by_id.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;
    use chrono::Duration;

    fn mentions(names: &[&str]) -> BTreeSet<EntityMention> {
        names
            .iter()
            .map(|n| EntityMention::new(*n, EntityType::Person))
            .collect()
    }

    #[tokio::test]
    async fn insert_rejects_empty_content_before_mutation() {
        let store = MemoryStore::new(4);
        let err = store
            .insert("   ", BTreeSet::new(), &[0.0; 4], Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn insert_rejects_wrong_dimension() {
        let store = MemoryStore::new(4);
        let err = store
            .insert("hello", BTreeSet::new(), &[0.0; 3], Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::DimensionMismatch { .. }));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let store = MemoryStore::new(4);
        assert!(matches!(
            store.get("missing").await.unwrap_err(),
            MemoryError::NotFound(_)
        ));
        assert!(store.try_get("missing").await.is_none());
    }

    #[tokio::test]
    async fn touch_bumps_access_and_keeps_invariant() {
        let store = MemoryStore::new(2);
        let now = Utc::now();
        let m = store
            .insert("hello", BTreeSet::new(), &[0.0; 2], now)
            .await
            .unwrap();

        store.touch(&m.id, now + Duration::hours(1)).await.unwrap();
        store.touch(&m.id, now - Duration::hours(1)).await.unwrap();

        let loaded = store.get(&m.id).await.unwrap();
        assert_eq!(loaded.access_count, 2);
        assert!(loaded.created_at <= loaded.last_accessed_at);
        assert_eq!(loaded.last_accessed_at, now + Duration::hours(1));
    }

    #[tokio::test]
    async fn list_by_entity_is_newest_first() {
        let store = MemoryStore::new(2);
        let t0 = Utc::now();
        let old = store
            .insert("old", mentions(&["alice"]), &[0.0; 2], t0)
            .await
            .unwrap();
        let new = store
            .insert("new", mentions(&["alice"]), &[0.0; 2], t0 + Duration::days(1))
            .await
            .unwrap();

        let listed = store.list_by_entity("alice").await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, new.id);
        assert_eq!(listed[1].id, old.id);
    }

    #[tokio::test]
    async fn delete_removes_all_index_entries() {
        let store = MemoryStore::new(2);
        let m = store
            .insert("bye", mentions(&["bob"]), &[0.0; 2], Utc::now())
            .await
            .unwrap();

        store.delete(&m.id).await.unwrap();
        assert!(store.try_get(&m.id).await.is_none());
        assert!(store.list_by_entity("bob").await.is_empty());
        assert!(store.recent(10).await.is_empty());
        assert!(matches!(
            store.delete(&m.id).await.unwrap_err(),
            MemoryError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn duplicate_id_insert_is_rejected() {
        let store = MemoryStore::new(2);
        let m = store
            .insert("hello", BTreeSet::new(), &[0.0; 2], Utc::now())
            .await
            .unwrap();
        let err = store.insert_record(m).await.unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[tokio::test]
    async fn keyword_candidates_score_by_query_token_coverage() {
        let store = MemoryStore::new(2);
        let now = Utc::now();
        let a = store
            .insert("Alice likes strong coffee", BTreeSet::new(), &[0.0; 2], now)
            .await
            .unwrap();
        store
            .insert("Bob likes tea", BTreeSet::new(), &[0.0; 2], now)
            .await
            .unwrap();

        let tokens: HashSet<String> = crate::ranker::tokenize("strong coffee");
        let hits = store.keyword_candidates(&tokens).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, a.id);
        assert!((hits[0].1 - 1.0).abs() < 1e-9);
    }
}
