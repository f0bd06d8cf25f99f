//! Learned per-entity importance
//!
//! The profile learner turns retrieval feedback ("was this memory useful?")
//! into a per-entity importance weight via an exponential moving average.
//! Weights live independently of memory lifecycle: deleting every memory that
//! mentions an entity leaves its learned weight in place, relaxing slowly
//! back toward the neutral prior while the entity sits idle. Importance is a
//! longer-lived signal than memory content, so this relaxation half-life is
//! deliberately much longer than the content decay half-life.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Configuration for the profile learner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// EMA step size; bounds how far a single feedback event can move a weight
    pub learning_rate: f64,
    /// Default weight for unseen entities and the relaxation target for idle ones
    pub neutral_prior: f64,
    /// Half-life of the idle relaxation toward the prior
    pub idle_half_life_days: f64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            neutral_prior: 0.5,
            idle_half_life_days: 90.0,
        }
    }
}

impl ProfileConfig {
    pub fn learning_rate(mut self, rate: f64) -> Self {
        self.learning_rate = rate;
        self
    }

    pub fn neutral_prior(mut self, prior: f64) -> Self {
        self.neutral_prior = prior.clamp(0.0, 1.0);
        self
    }

    pub fn idle_half_life_days(mut self, days: f64) -> Self {
        self.idle_half_life_days = days;
        self
    }
}

/// Learned importance for one entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileWeight {
    /// Normalized entity name
    pub entity_name: String,
    /// Importance in [0, 1]
    pub weight: f64,
    /// Number of feedback events folded into the EMA
    pub feedback_count: u64,
    /// Last feedback or import time; anchor for idle relaxation
    pub last_updated_at: DateTime<Utc>,
}

/// Maintains per-entity importance weights, updated from retrieval feedback
pub struct ProfileLearner {
    config: ProfileConfig,
    weights: RwLock<HashMap<String, ProfileWeight>>,
}

impl ProfileLearner {
    pub fn new(config: ProfileConfig) -> Self {
        Self {
            config,
            weights: RwLock::new(HashMap::new()),
        }
    }

    /// Idle relaxation: pull `weight` toward the prior by the elapsed time
    /// since the last update. Pure; shared by reads and writes.
    fn relaxed(&self, weight: f64, last_updated_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let idle_days = (now - last_updated_at).num_seconds().max(0) as f64 / 86_400.0;
        let retention = (-idle_days * std::f64::consts::LN_2 / self.config.idle_half_life_days).exp();
        let prior = self.config.neutral_prior;
        (prior + (weight - prior) * retention).clamp(0.0, 1.0)
    }

    /// Fold one feedback signal into the entity's weight.
    ///
    /// `new = old + learning_rate * (signal - old)` with signal 1.0 for
    /// useful, 0.0 for not useful. The map-level write lock serializes the
    /// read-modify-write, so concurrent feedback for one entity is applied
    /// in some linear order rather than lost.
    pub async fn record_feedback(&self, entity_name: &str, was_useful: bool, now: DateTime<Utc>) {
        let signal = if was_useful { 1.0 } else { 0.0 };
        let mut weights = self.weights.write().await;

        let entry = weights
            .entry(entity_name.to_string())
            .or_insert_with(|| ProfileWeight {
                entity_name: entity_name.to_string(),
                weight: self.config.neutral_prior,
                feedback_count: 0,
                last_updated_at: now,
            });

        let current = self.relaxed(entry.weight, entry.last_updated_at, now);
        entry.weight = (current + self.config.learning_rate * (signal - current)).clamp(0.0, 1.0);
        entry.feedback_count += 1;
        entry.last_updated_at = now;

        tracing::debug!(
            entity = entity_name,
            weight = entry.weight,
            useful = was_useful,
            "profile feedback recorded"
        );
    }

    /// The configured neutral prior
    pub fn neutral_prior(&self) -> f64 {
        self.config.neutral_prior
    }

    /// Current weight for an entity, with idle relaxation applied.
    /// Unseen entities get the neutral prior.
    pub async fn weight_for(&self, entity_name: &str, now: DateTime<Utc>) -> f64 {
        let weights = self.weights.read().await;
        match weights.get(entity_name) {
            Some(w) => self.relaxed(w.weight, w.last_updated_at, now),
            None => self.config.neutral_prior,
        }
    }

    /// Number of entities with learned weights
    pub async fn len(&self) -> usize {
        self.weights.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.weights.read().await.is_empty()
    }

    /// Export all weights for the storage collaborator
    pub async fn export(&self) -> Vec<ProfileWeight> {
        let mut all: Vec<ProfileWeight> = self.weights.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.entity_name.cmp(&b.entity_name));
        all
    }

    /// Import weights, replacing any existing entry for the same entity
    pub async fn import(&self, records: Vec<ProfileWeight>) {
        let mut weights = self.weights.write().await;
        for mut record in records {
            record.weight = record.weight.clamp(0.0, 1.0);
            weights.insert(record.entity_name.clone(), record);
        }
    }
}

impl Default for ProfileLearner {
    fn default() -> Self {
        Self::new(ProfileConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn unseen_entity_gets_neutral_prior() {
        let learner = ProfileLearner::default();
        assert_eq!(learner.weight_for("nobody", Utc::now()).await, 0.5);
    }

    #[tokio::test]
    async fn useful_feedback_strictly_increases_toward_one() {
        let learner = ProfileLearner::default();
        let now = Utc::now();
        let mut prev = learner.weight_for("alice", now).await;

        for _ in 0..5 {
            learner.record_feedback("alice", true, now).await;
            let w = learner.weight_for("alice", now).await;
            assert!(w > prev, "weight must strictly increase");
            assert!(w <= 1.0);
            prev = w;
        }
    }

    #[tokio::test]
    async fn negative_feedback_drives_toward_zero_bounded() {
        let learner = ProfileLearner::default();
        let now = Utc::now();
        let mut prev = 0.5;

        for _ in 0..50 {
            learner.record_feedback("spam", false, now).await;
            let w = learner.weight_for("spam", now).await;
            assert!(w < prev);
            assert!(w >= 0.0);
            prev = w;
        }
        assert!(prev < 0.01);
    }

    #[tokio::test]
    async fn single_feedback_step_is_bounded_by_learning_rate() {
        let learner = ProfileLearner::new(ProfileConfig::default().learning_rate(0.1));
        let now = Utc::now();
        learner.record_feedback("alice", true, now).await;
        let w = learner.weight_for("alice", now).await;
        assert!((w - 0.55).abs() < 1e-9); // 0.5 + 0.1 * (1.0 - 0.5)
    }

    #[tokio::test]
    async fn idle_weights_relax_toward_the_prior() {
        let learner = ProfileLearner::new(ProfileConfig::default().idle_half_life_days(90.0));
        let t0 = Utc::now();
        for _ in 0..20 {
            learner.record_feedback("alice", true, t0).await;
        }
        let fresh = learner.weight_for("alice", t0).await;
        assert!(fresh > 0.85);

        let much_later = t0 + Duration::days(900);
        let stale = learner.weight_for("alice", much_later).await;
        assert!(stale < fresh);
        assert!(stale > 0.5, "relaxes toward the prior, never below it");

        // One half-life: halfway back to the prior.
        let one_half_life = t0 + Duration::days(90);
        let halfway = learner.weight_for("alice", one_half_life).await;
        let expected = 0.5 + (fresh - 0.5) * 0.5;
        assert!((halfway - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn export_import_round_trip_preserves_weights() {
        let learner = ProfileLearner::default();
        let now = Utc::now();
        learner.record_feedback("alice", true, now).await;
        learner.record_feedback("bob", false, now).await;

        let exported = learner.export().await;
        assert_eq!(exported.len(), 2);

        let restored = ProfileLearner::default();
        restored.import(exported.clone()).await;
        assert_eq!(restored.export().await, exported);
    }
}
