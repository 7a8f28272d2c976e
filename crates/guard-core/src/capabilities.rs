//! External capability contracts (spec §6, "Consumed"). The core depends
//! only on these narrow traits, never on a specific provider or store.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Category, Sample};

/// One completion from an LLM provider.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The generated text.
    pub text: String,
    /// Prompt tokens billed.
    pub prompt_tokens: u64,
    /// Completion tokens billed.
    pub completion_tokens: u64,
    /// Wall-clock latency of the call.
    pub latency_ms: u64,
}

/// `complete(model, system_prompt, user_message) -> (text, prompt_tokens,
/// completion_tokens, latency_ms)` (spec §6). One implementation per
/// provider; the core requires only this contract.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Run one completion.
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<CompletionResponse>;
}

/// `embed(text) -> vec<f32>` (spec §6). Fixed-dimension, deterministic per
/// text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Compute an embedding for `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// The fixed dimensionality this embedder produces.
    fn dimension(&self) -> usize;
}

/// The opaque graph store API (spec §6): similarity index and
/// attack/benign sample registry.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Query attack samples at or above `min_confidence`, most recent
    /// first, bounded to `limit`.
    async fn query_attack_samples(&self, min_confidence: f64, limit: usize) -> Result<Vec<Sample>>;

    /// Query benign samples at or above `min_confidence`, most recent
    /// first, bounded to `limit`. Symmetric with `query_attack_samples`;
    /// feeds the `best_benign_sim` evidence the FP filter needs (spec §4.3,
    /// §4.6 step 7).
    async fn query_benign_samples(&self, min_confidence: f64, limit: usize) -> Result<Vec<Sample>>;

    /// Exact-text lookup of a known sample.
    async fn query_exact(&self, text: &str) -> Result<Option<Sample>>;

    /// Record a confirmed attack sample.
    async fn store_attack(&self, sample: Sample) -> Result<()>;

    /// Record a confirmed benign sample.
    async fn store_benign(&self, sample: Sample) -> Result<()>;
}

/// A local, pre-trained binary classifier's inference seam (spec §4.4):
/// `embed(text) -> vec` + `predict_proba(vec) -> (p_benign, p_attack)`.
pub trait LocalModel: Send + Sync {
    /// Embed text into the classifier's own feature space (not necessarily
    /// the same as [`Embedder`]'s).
    fn embed(&self, text: &str) -> Vec<f32>;

    /// Predict `(p_benign, p_attack)` from an embedding.
    fn predict_proba(&self, embedding: &[f32]) -> (f64, f64);
}

/// A candidate pattern returned by a defense generator, prior to validation
/// and id assignment (spec §4.12 step 3).
#[derive(Debug, Clone)]
pub struct CandidatePattern {
    /// Proposed regex body.
    pub regex: String,
    /// Proposed category.
    pub category: Category,
    /// Proposed severity.
    pub severity: crate::model::Severity,
    /// Proposed base confidence.
    pub confidence_base: f64,
    /// Proposed human-readable description.
    pub description: String,
}

/// `generate_attacks(n, strategy, prior_evasions) -> [string]` (spec §6,
/// used by C12).
#[async_trait]
pub trait AttackGenerator: Send + Sync {
    /// Generate `n` candidate attack strings for `strategy`, optionally
    /// biased by recent evasions.
    async fn generate_attacks(
        &self,
        n: usize,
        strategy: &str,
        prior_evasions: &[String],
    ) -> Result<Vec<String>>;
}

/// `generate_defenses(evasions) -> [CandidatePattern]` (spec §6, used by
/// C12).
#[async_trait]
pub trait DefenseGenerator: Send + Sync {
    /// Propose candidate patterns that would have caught `evasions`.
    async fn generate_defenses(&self, evasions: &[String]) -> Result<Vec<CandidatePattern>>;
}
