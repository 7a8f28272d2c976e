//! Similarity Index (C3, spec §4.3).
//!
//! `lookup(text) -> Option<{label, similarity, reference_text}>`, grounded
//! on `original_source/.../cost_guard/runtime_guard.py::_check_graph_cache`:
//! exact match first, then cosine similarity over the top-N most recent
//! high-confidence attack samples. Degrades to "no result" (never fatal)
//! when the graph store or embedder is unavailable (spec §7
//! `ExternalUnavailable`).

use std::sync::Arc;

use crate::capabilities::{Embedder, GraphStore};
use crate::model::SampleLabel;

/// Minimum confidence for an exact-match sample to count (spec §4.3).
pub const EXACT_MATCH_MIN_CONFIDENCE: f64 = 0.95;
/// Minimum confidence for a sample to be eligible for semantic lookup (spec §4.3).
pub const SEMANTIC_CANDIDATE_MIN_CONFIDENCE: f64 = 0.90;
/// Cosine-similarity threshold to report a semantic match (spec §4.3).
pub const SEMANTIC_MATCH_THRESHOLD: f64 = 0.92;
/// Max candidate pool size for semantic lookup (spec §4.3).
pub const MAX_CANDIDATES: usize = 100;

/// The outcome of a [`SimilarityIndex::lookup`] call.
#[derive(Debug, Clone)]
pub struct SimilarityMatch {
    /// Attack or benign.
    pub label: SampleLabel,
    /// Cosine similarity (or `1.0` for an exact match) in `[0, 1]`.
    pub similarity: f64,
    /// The matched sample's own labeling confidence, carried through so
    /// callers can combine it with `similarity` (spec §4.6 step 3:
    /// `confidence = sample_confidence * similarity`).
    pub sample_confidence: f64,
    /// The matched sample's text.
    pub reference_text: String,
}

/// The FP-filter evidence C6 needs regardless of whether a match fired.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityEvidence {
    /// Best cosine similarity against any high-confidence attack sample.
    pub best_attack_sim: f64,
    /// Best cosine similarity against any high-confidence benign sample.
    pub best_benign_sim: f64,
}

/// The similarity index over an external [`GraphStore`] and [`Embedder`].
pub struct SimilarityIndex {
    graph: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
}

impl SimilarityIndex {
    /// Construct a similarity index over the given capabilities.
    #[must_use]
    pub fn new(graph: Arc<dyn GraphStore>, embedder: Arc<dyn Embedder>) -> Self {
        SimilarityIndex { graph, embedder }
    }

    /// Run both lookup modes and compute the FP-filter evidence. Degrades
    /// silently to `(None, SimilarityEvidence::default())` on any external
    /// failure.
    pub async fn lookup(&self, text: &str) -> (Option<SimilarityMatch>, SimilarityEvidence) {
        match self.try_lookup(text).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "similarity index degraded to no-result");
                (None, SimilarityEvidence::default())
            }
        }
    }

    async fn try_lookup(
        &self,
        text: &str,
    ) -> crate::error::Result<(Option<SimilarityMatch>, SimilarityEvidence)> {
        if let Some(sample) = self.graph.query_exact(text).await? {
            if sample.confidence >= EXACT_MATCH_MIN_CONFIDENCE && sample.label == SampleLabel::Attack {
                return Ok((
                    Some(SimilarityMatch {
                        label: SampleLabel::Attack,
                        similarity: 1.0,
                        sample_confidence: sample.confidence,
                        reference_text: sample.text,
                    }),
                    SimilarityEvidence {
                        best_attack_sim: 1.0,
                        best_benign_sim: 0.0,
                    },
                ));
            }
        }

        let query_embedding = self.embedder.embed(text).await?;
        let attack_samples = self
            .graph
            .query_attack_samples(SEMANTIC_CANDIDATE_MIN_CONFIDENCE, MAX_CANDIDATES)
            .await?;

        let benign_samples = self
            .graph
            .query_benign_samples(SEMANTIC_CANDIDATE_MIN_CONFIDENCE, MAX_CANDIDATES)
            .await
            .unwrap_or_default();

        let mut best_attack: Option<(f64, &crate::model::Sample)> = None;
        for sample in &attack_samples {
            let Some(embedding) = sample.embedding.as_ref() else {
                continue;
            };
            let sim = cosine_similarity(&query_embedding, embedding);
            if best_attack.map_or(true, |(best, _)| sim > best) {
                best_attack = Some((sim, sample));
            }
        }

        let best_benign_sim = benign_samples
            .iter()
            .filter_map(|s| s.embedding.as_ref())
            .map(|embedding| cosine_similarity(&query_embedding, embedding))
            .fold(0.0_f64, f64::max);

        let evidence = SimilarityEvidence {
            best_attack_sim: best_attack.map_or(0.0, |(sim, _)| sim),
            best_benign_sim,
        };

        let result = best_attack.and_then(|(sim, sample)| {
            if sim >= SEMANTIC_MATCH_THRESHOLD {
                Some(SimilarityMatch {
                    label: SampleLabel::Attack,
                    similarity: sim,
                    sample_confidence: sample.confidence,
                    reference_text: sample.text.clone(),
                })
            } else {
                None
            }
        });

        Ok((result, evidence))
    }
}

/// Standard cosine similarity over two equal-length vectors. Returns `0.0`
/// if dimensions mismatch or either vector is zero.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0_f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors_is_zero() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![0.0_f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_mismatched_dims_is_zero() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![1.0_f32, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn cosine_similarity_zero_vector_is_zero() {
        let a = vec![0.0_f32, 0.0];
        let b = vec![1.0_f32, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
