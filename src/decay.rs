//! Time-based retention weighting
//!
//! A memory's retrieval weight fades exponentially with age, and frequent
//! access pushes back against the fade. The weight is a pure function of the
//! memory's own fields and the query time; nothing here reads learner state
//! or mutates the store.

use crate::types::Memory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Configuration for the decay model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayConfig {
    /// E-folding age of the base decay: an untouched memory's base weight
    /// falls to 1/e at this age
    pub half_life_days: f64,
    /// Scale on the logarithmic access boost
    pub access_boost_factor: f64,
    /// Cap on the access boost multiplier
    pub max_access_boost: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            half_life_days: 30.0,
            access_boost_factor: 0.2,
            max_access_boost: 2.0,
        }
    }
}

impl DecayConfig {
    pub fn half_life_days(mut self, days: f64) -> Self {
        self.half_life_days = days;
        self
    }

    pub fn access_boost_factor(mut self, factor: f64) -> Self {
        self.access_boost_factor = factor;
        self
    }

    pub fn max_access_boost(mut self, cap: f64) -> Self {
        self.max_access_boost = cap;
        self
    }
}

/// Computes retention weights from age and access history
#[derive(Debug, Clone, Default)]
pub struct DecayEngine {
    config: DecayConfig,
}

impl DecayEngine {
    pub fn new(config: DecayConfig) -> Self {
        Self { config }
    }

    /// Retention weight in (0,1] for `memory` as of `now`.
    ///
    /// `exp(-age / half_life) * access_boost`, clamped to (0,1]. The
    /// exponential never reaches zero, so age alone can never make a memory
    /// permanently unreachable. Pinned memories bypass decay entirely.
    pub fn weight(&self, memory: &Memory, now: DateTime<Utc>) -> f64 {
        if memory.is_pinned() {
            return 1.0;
        }

        let base = (-memory.age_days(now) / self.config.half_life_days).exp();
        let boost = (1.0 + (1.0 + memory.access_count as f64).ln() * self.config.access_boost_factor)
            .min(self.config.max_access_boost);

        (base * boost).clamp(f64::MIN_POSITIVE, 1.0)
    }
}
