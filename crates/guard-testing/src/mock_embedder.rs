//! A deterministic mock of [`guard_core::capabilities::Embedder`], grounded
//! on `dashflow::core::embeddings::MockEmbeddings` (hash-seeded deterministic
//! vectors, no real model call).

use async_trait::async_trait;
use guard_core::capabilities::Embedder;
use guard_core::error::Result;

/// A fixed-dimension embedder that derives a deterministic pseudo-embedding
/// from each text's hash, so identical inputs always embed identically and
/// distinct inputs embed distinctly without calling a real model.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    /// Build a mock embedder producing `dimension`-length vectors.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        MockEmbedder { dimension }
    }
}

fn deterministic_vector(text: &str, dimension: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut out = Vec::with_capacity(dimension);
    for i in 0..dimension {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        i.hash(&mut hasher);
        let bits = hasher.finish();
        // Map to [-1, 1].
        out.push(((bits % 2001) as f32 / 1000.0) - 1.0);
    }
    out
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(deterministic_vector(text, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_embeds_identically() {
        let embedder = MockEmbedder::new(64);
        let a = embedder.embed("hello world").await.unwrap();
        let b = embedder.embed("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn distinct_text_embeds_differently() {
        let embedder = MockEmbedder::new(64);
        let a = embedder.embed("hello world").await.unwrap();
        let b = embedder.embed("goodbye world").await.unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn dimension_matches_construction() {
        let embedder = MockEmbedder::new(384);
        assert_eq!(embedder.dimension(), 384);
    }
}
