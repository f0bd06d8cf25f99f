//! Entity extraction collaborator boundary
//!
//! The engine consumes typed entity mentions; it does not implement NLP. A
//! real deployment plugs in a model-backed extractor; the bundled heuristic
//! keeps the engine usable with zero configuration.

use crate::error::Result;
use crate::types::{EntityMention, EntityType};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Turns raw text into a set of typed entity mentions
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, text: &str) -> Result<BTreeSet<EntityMention>>;
}

/// Zero-config heuristic extractor: capitalized tokens become entities.
///
/// Tokens that start a sentence are still picked up; that over-extraction is
/// acceptable for a fallback since downstream identity is normalized and
/// profile learning corrects unimportant entities over time.
#[derive(Debug, Clone, Default)]
pub struct CapitalizedTokenExtractor;

#[async_trait]
impl EntityExtractor for CapitalizedTokenExtractor {
    fn name(&self) -> &'static str {
        "capitalized-tokens"
    }

    async fn extract(&self, text: &str) -> Result<BTreeSet<EntityMention>> {
        let mentions = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 1)
            .filter(|t| t.chars().next().is_some_and(|c| c.is_uppercase()))
            .map(|t| EntityMention::new(t, EntityType::Other))
            .collect();
        Ok(mentions)
    }
}

/// Extractor that never finds entities; disables graph linking and profiles
#[derive(Debug, Clone, Default)]
pub struct NoopExtractor;

#[async_trait]
impl EntityExtractor for NoopExtractor {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn extract(&self, _text: &str) -> Result<BTreeSet<EntityMention>> {
        Ok(BTreeSet::new())
    }
}
