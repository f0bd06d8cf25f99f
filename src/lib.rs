//! # Mori - durable, queryable memory for conversational AI
//!
//! Stores discrete memory items and, on each query, returns the most
//! relevant subset by fusing semantic similarity, keyword overlap,
//! time decay, and learned per-entity importance. Embedding and entity
//! extraction are collaborator boundaries: plug in real models via the
//! [`EmbeddingProvider`] and [`EntityExtractor`] traits, or use the bundled
//! zero-config implementations.

pub mod decay;
pub mod embedding;
pub mod entity_graph;
pub mod error;
pub mod extract;
pub mod maintenance;
pub mod profile;
pub mod ranker;
pub mod storage;
pub mod store;
pub mod types;
pub mod vector_index;

pub use decay::{DecayConfig, DecayEngine};
pub use embedding::{EmbeddingProvider, HashEmbeddingProvider};
pub use entity_graph::EntityGraph;
pub use error::{MemoryError, Result};
pub use extract::{CapitalizedTokenExtractor, EntityExtractor, NoopExtractor};
pub use maintenance::{run_maintenance, MaintenanceConfig, MaintenanceReport};
pub use profile::{ProfileConfig, ProfileLearner, ProfileWeight};
pub use ranker::{RankConfig, RankRequest};
pub use storage::{BincodeSnapshotBackend, MemoryRecord, Snapshot, SnapshotBackend};
pub use store::MemoryStore;
pub use types::{
    CreateMemoryInput, Entity, EntityMention, EntityType, Memory, MemoryId, RetrievalResult,
    ScoreBreakdown,
};
pub use vector_index::{VectorHit, VectorIndex};

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Top-level engine configuration
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Embedding dimensionality enforced across store and vector index
    pub dimension: usize,
    pub decay: DecayConfig,
    pub profile: ProfileConfig,
    pub rank: RankConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            decay: DecayConfig::default(),
            profile: ProfileConfig::default(),
            rank: RankConfig::default(),
        }
    }
}

impl MemoryConfig {
    /// Check configuration invariants once, up front
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(MemoryError::Validation("dimension must be positive".into()));
        }
        self.rank.validate()
    }

    pub fn dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn decay(mut self, decay: DecayConfig) -> Self {
        self.decay = decay;
        self
    }

    pub fn profile(mut self, profile: ProfileConfig) -> Self {
        self.profile = profile;
        self
    }

    pub fn rank(mut self, rank: RankConfig) -> Self {
        self.rank = rank;
        self
    }
}

/// Engine-wide counters
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SystemStats {
    pub memories: usize,
    pub entities: usize,
    pub graph_edges: usize,
    pub profile_weights: usize,
}

/// Main memory engine
#[derive(Clone)]
pub struct MemorySystem {
    config: MemoryConfig,
    store: Arc<MemoryStore>,
    vectors: Arc<VectorIndex>,
    graph: Arc<EntityGraph>,
    profiles: Arc<ProfileLearner>,
    decay: DecayEngine,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn EntityExtractor>,
}

impl std::fmt::Debug for MemorySystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySystem")
            .field("dimension", &self.config.dimension)
            .field("embedder", &self.embedder.name())
            .field("extractor", &self.extractor.name())
            .finish()
    }
}

impl MemorySystem {
    /// Create an engine with the bundled zero-config collaborators
    pub fn new(config: MemoryConfig) -> Result<Self> {
        config.validate()?;
        let dimension = config.dimension;
        Ok(Self {
            store: Arc::new(MemoryStore::new(dimension)),
            vectors: Arc::new(VectorIndex::new(dimension)),
            graph: Arc::new(EntityGraph::new()),
            profiles: Arc::new(ProfileLearner::new(config.profile.clone())),
            decay: DecayEngine::new(config.decay.clone()),
            embedder: Arc::new(HashEmbeddingProvider::new(dimension)),
            extractor: Arc::new(CapitalizedTokenExtractor),
            config,
        })
    }

    /// Swap in a real embedding model. Its dimension must match the
    /// configured index dimension.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if embedder.dimension() != self.config.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.config.dimension,
                actual: embedder.dimension(),
            });
        }
        self.embedder = embedder;
        Ok(self)
    }

    /// Swap in a real entity extractor
    pub fn with_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Store a new memory: extract entities, embed, then apply the store,
    /// vector index, and graph updates as one unit.
    ///
    /// Both collaborator calls happen before any engine lock is taken. A
    /// failed embedding aborts the insert with nothing persisted, and the
    /// dimension check runs before the first mutation so the multi-structure
    /// write path cannot fail halfway through.
    pub async fn insert_memory(&self, input: CreateMemoryInput) -> Result<Memory> {
        let entities = self.extractor.extract(&input.content).await?;
        self.insert_extracted(input, entities).await
    }

    /// Store a new memory with entities already extracted by the caller
    pub async fn insert_extracted(
        &self,
        input: CreateMemoryInput,
        entities: BTreeSet<EntityMention>,
    ) -> Result<Memory> {
        if input.content.trim().is_empty() {
            return Err(MemoryError::Validation("content must not be empty".into()));
        }
        let embedding = self.embedder.embed(&input.content).await?;
        let at = input.at.unwrap_or_else(Utc::now);

        let mut memory = Memory::new(input.content, entities, at);
        if let Some(importance) = input.importance_override {
            memory = memory.with_importance_override(importance);
        }
        if let Some(source) = input.source {
            memory = memory.with_source(source);
        }
        if let Some(metadata) = input.metadata {
            memory = memory.with_metadata(metadata);
        }

        let memory = self.store.insert_prepared(memory, &embedding).await?;

        self.vectors
            .add(memory.id.clone(), embedding, memory.created_at)
            .await?;
        self.graph
            .link(&memory.id, &memory.entities, memory.created_at)
            .await;

        Ok(memory)
    }

    /// Fetch a memory by id
    pub async fn get_memory(&self, id: &str) -> Result<Memory> {
        self.store.get(id).await
    }

    /// Delete a memory, cascading removal through the vector index and
    /// entity graph. Learned profile weights are left alone: importance
    /// outlives the memories that earned it.
    pub async fn delete_memory(&self, id: &str) -> Result<()> {
        self.store.delete(id).await?;
        self.vectors.remove(id).await;
        self.graph.remove_memory(id).await;
        Ok(())
    }

    /// Memories mentioning an entity, newest first
    pub async fn list_by_entity(&self, entity_name: &str) -> Vec<Memory> {
        self.store.list_by_entity(entity_name).await
    }

    /// Rank memories against a query as of now
    pub async fn rank(&self, request: RankRequest) -> Result<Vec<RetrievalResult>> {
        self.rank_at(request, Utc::now()).await
    }

    /// Rank with an explicit query time; the deterministic core of [`rank`](Self::rank).
    ///
    /// When the request carries no embedding and has query text, the text is
    /// embedded here, outside all engine locks.
    pub async fn rank_at(
        &self,
        mut request: RankRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<RetrievalResult>> {
        if request.query_embedding.is_none() && !request.query_text.trim().is_empty() {
            request.query_embedding = Some(self.embedder.embed(&request.query_text).await?);
        }

        ranker::rank(
            &self.store,
            &self.vectors,
            &self.decay,
            &self.profiles,
            &self.graph,
            &self.config.rank,
            &request,
            now,
        )
        .await
    }

    /// Record whether a retrieved entity was useful
    pub async fn record_feedback(&self, entity_name: &str, was_useful: bool) {
        self.profiles
            .record_feedback(entity_name, was_useful, Utc::now())
            .await;
    }

    /// Record feedback for every entity linked to a retrieved memory
    pub async fn record_result_feedback(&self, memory_id: &str, was_useful: bool) -> Result<()> {
        let memory = self.store.get(memory_id).await?;
        let now = Utc::now();
        for mention in &memory.entities {
            self.profiles
                .record_feedback(&mention.name, was_useful, now)
                .await;
        }
        Ok(())
    }

    /// Engine-wide counters
    pub async fn stats(&self) -> SystemStats {
        SystemStats {
            memories: self.store.len().await,
            entities: self.graph.entity_count().await,
            graph_edges: self.graph.edge_count().await,
            profile_weights: self.profiles.len().await,
        }
    }

    /// Run a pruning pass over decayed memories
    pub async fn run_maintenance(&self, config: &MaintenanceConfig) -> Result<MaintenanceReport> {
        run_maintenance(
            &self.store,
            &self.vectors,
            &self.graph,
            &self.decay,
            config,
            Utc::now(),
        )
        .await
    }

    /// Export the full engine state for a storage collaborator
    pub async fn snapshot(&self) -> Snapshot {
        let mut memories = Vec::new();
        for memory in self.store.export().await {
            let embedding = self.vectors.vector(&memory.id).await.unwrap_or_default();
            memories.push(MemoryRecord::from_memory(&memory, embedding));
        }
        Snapshot {
            memories,
            profiles: self.profiles.export().await,
        }
    }

    /// Restore state from a snapshot into this (empty) engine
    pub async fn restore(&self, snapshot: Snapshot) -> Result<()> {
        for record in snapshot.memories {
            let (memory, embedding) = record.into_parts();
            self.store.insert_record(memory.clone()).await?;
            self.vectors
                .add(memory.id.clone(), embedding, memory.created_at)
                .await?;
            self.graph
                .link(&memory.id, &memory.entities, memory.created_at)
                .await;
        }
        self.profiles.import(snapshot.profiles).await;
        Ok(())
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// The underlying vector index
    pub fn vectors(&self) -> &Arc<VectorIndex> {
        &self.vectors
    }

    /// The underlying entity graph
    pub fn graph(&self) -> &Arc<EntityGraph> {
        &self.graph
    }

    /// The underlying profile learner
    pub fn profiles(&self) -> &Arc<ProfileLearner> {
        &self.profiles
    }
}
