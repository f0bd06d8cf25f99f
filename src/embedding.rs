//! Embedding collaborator boundary

use crate::error::Result;
use async_trait::async_trait;

/// Turns text into a fixed-length vector. The engine treats this as an
/// opaque external call: failures surface as `EmbeddingUnavailable` and are
/// never retried here, and no engine lock is held across `embed`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Zero-config embedding provider.
///
/// Deterministic token hashing (no network, no model downloads). It is *not*
/// intended to match the semantic quality of a learned embedding model; it
/// exists so the engine works out of the box and tests are reproducible.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimension: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dimension];
        let mut token_count = 0u32;

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            token_count += 1;
            let token = token.to_lowercase();
            let mut hash = 1469598103934665603u64;
            for b in token.as_bytes() {
                hash ^= *b as u64;
                hash = hash.wrapping_mul(1099511628211u64);
            }

            let idx = (hash as usize) % self.dimension;
            vec[idx] += 1.0;
        }

        if token_count == 0 {
            return vec;
        }

        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        }

        vec
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_one(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_index::cosine_similarity;

    #[tokio::test]
    async fn embeddings_are_deterministic_and_unit_norm() {
        let provider = HashEmbeddingProvider::new(64);
        let a = provider.embed("Alice likes coffee").await.unwrap();
        let b = provider.embed("Alice likes coffee").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_tokens_raise_similarity() {
        let provider = HashEmbeddingProvider::new(256);
        let coffee = provider.embed("alice likes coffee").await.unwrap();
        let overlapping = provider.embed("alice likes tea").await.unwrap();
        let disjoint = provider.embed("bob prefers espresso").await.unwrap();

        assert!(
            cosine_similarity(&coffee, &overlapping) > cosine_similarity(&coffee, &disjoint)
        );
    }

    #[tokio::test]
    async fn empty_text_embeds_to_zero_vector() {
        let provider = HashEmbeddingProvider::new(16);
        let v = provider.embed("").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
