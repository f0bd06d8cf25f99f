//! In-memory vector index for semantic similarity
//!
//! Exact brute-force cosine scan. At the scale this engine targets (tens of
//! thousands of memories) a full scan is fast enough that the contract can
//! hold exactly; an approximate structure could be substituted later as long
//! as it documents its recall.

use crate::error::{MemoryError, Result};
use crate::types::MemoryId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// One nearest-neighbor hit
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: MemoryId,
    /// Cosine similarity in [-1, 1]
    pub similarity: f64,
}

struct IndexedVector {
    vector: Vec<f32>,
    /// Creation time of the owning memory, used for tie-breaking
    created_at: DateTime<Utc>,
}

/// Maps memory id to embedding vector; supports incremental insertion
pub struct VectorIndex {
    dimension: usize,
    entries: RwLock<HashMap<MemoryId, IndexedVector>>,
}

impl VectorIndex {
    /// Create an index for vectors of the given dimensionality
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Configured vector dimensionality
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Add or replace a vector. `created_at` is the owning memory's creation
    /// time, used to break similarity ties toward more recent memories.
    pub async fn add(
        &self,
        id: impl Into<MemoryId>,
        vector: Vec<f32>,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        self.check_dimension(&vector)?;
        self.entries.write().await.insert(
            id.into(),
            IndexedVector { vector, created_at },
        );
        Ok(())
    }

    /// Remove a vector; returns whether it existed
    pub async fn remove(&self, id: &str) -> bool {
        self.entries.write().await.remove(id).is_some()
    }

    /// Fetch the stored vector for a memory, e.g. for snapshot export
    pub async fn vector(&self, id: &str) -> Option<Vec<f32>> {
        self.entries.read().await.get(id).map(|e| e.vector.clone())
    }

    /// Number of indexed vectors
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Top-k nearest neighbors by cosine similarity.
    ///
    /// Ties are broken by more-recent `created_at`, then by lower id, so the
    /// ordering is fully deterministic.
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        self.check_dimension(vector)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().await;
        let mut hits: Vec<(f64, DateTime<Utc>, &MemoryId)> = entries
            .iter()
            .map(|(id, e)| (cosine_similarity(vector, &e.vector), e.created_at, id))
            .collect();

        hits.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.cmp(&a.1))
                .then_with(|| a.2.cmp(b.2))
        });
        hits.truncate(k);

        Ok(hits
            .into_iter()
            .map(|(similarity, _, id)| VectorHit {
                id: id.clone(),
                similarity,
            })
            .collect())
    }
}

/// Cosine similarity between two equal-length vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}
