//! Hybrid ranking: fuse semantic, lexical, temporal, and learned signals
//!
//! The ranker assembles a candidate set from the vector index and a keyword
//! scan, scores each candidate on four components, fuses them with
//! configurable weights, and returns a deterministic ordering. Fusion weights
//! are validated when the configuration is built so the scoring loop carries
//! no validation branches.

use crate::decay::DecayEngine;
use crate::entity_graph::EntityGraph;
use crate::error::{MemoryError, Result};
use crate::profile::ProfileLearner;
use crate::store::MemoryStore;
use crate::types::{Memory, MemoryId, RetrievalResult, ScoreBreakdown};
use crate::vector_index::{cosine_similarity, VectorIndex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Fusion weights and candidate-set sizing for the hybrid ranker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankConfig {
    /// Weight on cosine similarity (normalized to [0,1])
    pub w_similarity: f64,
    /// Weight on query-token overlap
    pub w_keyword: f64,
    /// Weight on the time-decay retention weight
    pub w_decay: f64,
    /// Weight on the learned entity profile weight
    pub w_profile: f64,
    /// Vector candidates fetched per requested result (N = multiplier * k)
    pub candidate_multiplier: usize,
    /// Hop budget for entity-graph context expansion
    pub expansion_hops: u32,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            w_similarity: 0.4,
            w_keyword: 0.25,
            w_decay: 0.2,
            w_profile: 0.15,
            candidate_multiplier: 3,
            expansion_hops: 1,
        }
    }
}

impl RankConfig {
    /// Check the configuration invariants: non-negative weights summing to 1.
    /// Called once at system construction, never on the scoring path.
    pub fn validate(&self) -> Result<()> {
        let weights = [self.w_similarity, self.w_keyword, self.w_decay, self.w_profile];
        if weights.iter().any(|w| *w < 0.0) {
            return Err(MemoryError::Validation(
                "fusion weights must be non-negative".into(),
            ));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(MemoryError::Validation(format!(
                "fusion weights must sum to 1.0, got {sum}"
            )));
        }
        if self.candidate_multiplier == 0 {
            return Err(MemoryError::Validation(
                "candidate_multiplier must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn weights(mut self, similarity: f64, keyword: f64, decay: f64, profile: f64) -> Self {
        self.w_similarity = similarity;
        self.w_keyword = keyword;
        self.w_decay = decay;
        self.w_profile = profile;
        self
    }

    pub fn candidate_multiplier(mut self, multiplier: usize) -> Self {
        self.candidate_multiplier = multiplier;
        self
    }

    pub fn expansion_hops(mut self, hops: u32) -> Self {
        self.expansion_hops = hops;
        self
    }
}

/// One rank call
#[derive(Debug, Clone, Default)]
pub struct RankRequest {
    /// Query text for keyword matching; may be empty if an embedding is given
    pub query_text: String,
    /// Query embedding; may be absent if query text is given
    pub query_embedding: Option<Vec<f32>>,
    /// Number of primary results
    pub k: usize,
    /// Append entity-graph neighbors of the primary results
    pub expand: bool,
    /// Cooperative cancellation deadline
    pub deadline: Option<Instant>,
}

impl RankRequest {
    pub fn new(query_text: impl Into<String>, k: usize) -> Self {
        Self {
            query_text: query_text.into(),
            k,
            ..Default::default()
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.query_embedding = Some(embedding);
        self
    }

    pub fn with_expansion(mut self) -> Self {
        self.expand = true;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Split text into lowercase alphanumeric tokens
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn check_deadline(deadline: Option<Instant>) -> Result<()> {
    if let Some(d) = deadline {
        if Instant::now() >= d {
            return Err(MemoryError::Timeout);
        }
    }
    Ok(())
}

/// Map cosine similarity from [-1,1] to [0,1]
fn normalize_similarity(cosine: f64) -> f64 {
    ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
}

struct Candidate {
    memory: Memory,
    breakdown: ScoreBreakdown,
    score: f64,
}

/// Rank memories against a query and return the fused, deterministic top-k.
///
/// Returned memories are touched in the store; expansion hits are appended
/// after the primary list and never compete with it.
#[allow(clippy::too_many_arguments)]
pub async fn rank(
    store: &MemoryStore,
    vectors: &VectorIndex,
    decay: &DecayEngine,
    profiles: &ProfileLearner,
    graph: &EntityGraph,
    config: &RankConfig,
    request: &RankRequest,
    now: DateTime<Utc>,
) -> Result<Vec<RetrievalResult>> {
    if request.k == 0 {
        return Err(MemoryError::InvalidQuery("k must be at least 1".into()));
    }
    let query_tokens = tokenize(&request.query_text);
    if query_tokens.is_empty() && request.query_embedding.is_none() {
        return Err(MemoryError::InvalidQuery(
            "query text and query embedding are both empty".into(),
        ));
    }
    if store.is_empty().await {
        return Ok(Vec::new());
    }

    // Candidate set: top-N vector hits unioned with keyword matches, so a
    // lexical match a pure-vector search buries is still considered.
    let mut similarity_by_id: HashMap<MemoryId, f64> = HashMap::new();
    if let Some(embedding) = &request.query_embedding {
        let n = config.candidate_multiplier.saturating_mul(request.k);
        for hit in vectors.query(embedding, n).await? {
            similarity_by_id.insert(hit.id, hit.similarity);
        }
    }

    let mut keyword_by_id: HashMap<MemoryId, f64> = HashMap::new();
    for (id, overlap) in store.keyword_candidates(&query_tokens).await {
        keyword_by_id.insert(id, overlap);
    }

    let mut candidate_ids: Vec<MemoryId> = similarity_by_id
        .keys()
        .chain(keyword_by_id.keys())
        .cloned()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    // Stable iteration order so ties resolve identically on every call.
    candidate_ids.sort();

    let mut candidates: Vec<Candidate> = Vec::with_capacity(candidate_ids.len());
    for id in candidate_ids {
        check_deadline(request.deadline)?;

        // Stale ids from a concurrent delete resolve to a skip, never to
        // dangling data.
        let Some(memory) = store.try_get(&id).await else {
            continue;
        };

        let candidate = score_candidate(
            memory,
            &similarity_by_id,
            &keyword_by_id,
            request.query_embedding.as_deref(),
            vectors,
            decay,
            profiles,
            config,
            now,
        )
        .await;
        candidates.push(candidate);
    }

    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.memory.last_accessed_at.cmp(&a.memory.last_accessed_at))
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
    candidates.truncate(request.k);

    let mut results: Vec<RetrievalResult> = Vec::with_capacity(candidates.len());
    for (i, c) in candidates.iter().enumerate() {
        results.push(RetrievalResult {
            memory_id: c.memory.id.clone(),
            score: c.score,
            rank: i + 1,
            breakdown: c.breakdown,
            via_expansion: false,
        });
    }

    if request.expand {
        let primary: HashSet<MemoryId> = results.iter().map(|r| r.memory_id.clone()).collect();
        let mut appended: HashSet<MemoryId> = HashSet::new();

        let seeds: Vec<MemoryId> = results.iter().map(|r| r.memory_id.clone()).collect();
        for seed in seeds {
            check_deadline(request.deadline)?;
            for neighbor_id in graph.neighbors(&seed, config.expansion_hops).await {
                if primary.contains(&neighbor_id) || !appended.insert(neighbor_id.clone()) {
                    continue;
                }
                let Some(memory) = store.try_get(&neighbor_id).await else {
                    continue;
                };
                let c = score_candidate(
                    memory,
                    &similarity_by_id,
                    &keyword_by_id,
                    request.query_embedding.as_deref(),
                    vectors,
                    decay,
                    profiles,
                    config,
                    now,
                )
                .await;
                let rank = results.len() + 1;
                results.push(RetrievalResult {
                    memory_id: neighbor_id,
                    score: c.score,
                    rank,
                    breakdown: c.breakdown,
                    via_expansion: true,
                });
            }
        }
    }

    // Touches land only after the last fallible step, so a rank that fails
    // (deadline included) leaves the store unmutated. A concurrent delete
    // between scoring and touch is tolerated.
    for r in results.iter().filter(|r| !r.via_expansion) {
        let _ = store.touch(&r.memory_id, now).await;
    }

    tracing::debug!(
        query = %request.query_text,
        k = request.k,
        returned = results.len(),
        "rank completed"
    );
    Ok(results)
}

#[allow(clippy::too_many_arguments)]
async fn score_candidate(
    memory: Memory,
    similarity_by_id: &HashMap<MemoryId, f64>,
    keyword_by_id: &HashMap<MemoryId, f64>,
    query_embedding: Option<&[f32]>,
    vectors: &VectorIndex,
    decay: &DecayEngine,
    profiles: &ProfileLearner,
    config: &RankConfig,
    now: DateTime<Utc>,
) -> Candidate {
    // Keyword-only candidates still get a real similarity score, computed
    // against their stored vector, rather than an artificial zero.
    let cosine = match similarity_by_id.get(&memory.id) {
        Some(s) => Some(*s),
        None => match query_embedding {
            Some(q) => vectors
                .vector(&memory.id)
                .await
                .map(|v| cosine_similarity(q, &v)),
            None => None,
        },
    };

    let similarity = cosine.map(normalize_similarity).unwrap_or(0.0);
    let keyword = keyword_by_id.get(&memory.id).copied().unwrap_or(0.0);
    let decay_weight = decay.weight(&memory, now);

    let mut profile = profiles.neutral_prior();
    let mut any = false;
    for mention in &memory.entities {
        let w = profiles.weight_for(&mention.name, now).await;
        if !any || w > profile {
            profile = w;
            any = true;
        }
    }

    let score = config.w_similarity * similarity
        + config.w_keyword * keyword
        + config.w_decay * decay_weight
        + config.w_profile * profile;

    Candidate {
        memory,
        breakdown: ScoreBreakdown {
            similarity,
            keyword,
            decay: decay_weight,
            profile,
        },
        score,
    }
}
