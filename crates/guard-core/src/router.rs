//! Model Router (C8, spec §4.8).
//!
//! `route(message, system_prompt, context_tokens, preferred_model) ->
//! {selected_model, tier, downgraded, estimated_cost, reason,
//! request_type}`.

use crate::config::{ModelCatalogEntry, RoutingConfig, RoutingStrategy};
use crate::detection::intent::classify_request_type;
use crate::model::{RequestType, Tier};

/// Heuristic cues that bump a request towards `Complex` regardless of raw
/// token count (spec §4.8: "presence of code fences or multi-step cues").
const COMPLEXITY_CUES: &[&str] = &["```", "step 1", "step one", "first,", "then,", "finally,"];

/// The outcome of [`ModelRouter::route`].
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    /// The model ultimately selected.
    pub selected_model: String,
    /// Its tier.
    pub tier: Tier,
    /// Whether this is below the caller's preferred tier.
    pub downgraded: bool,
    /// Estimated cost in USD for `context_tokens` prompt tokens (output not
    /// yet known, so this is a prompt-only estimate refined by the caller).
    pub estimated_cost_usd: f64,
    /// Human-readable reason.
    pub reason: String,
    /// Classified request complexity.
    pub request_type: RequestType,
}

/// The model router.
pub struct ModelRouter {
    config: RoutingConfig,
}

impl ModelRouter {
    /// Construct a router over a fixed configuration/catalog.
    #[must_use]
    pub fn new(config: RoutingConfig) -> Self {
        ModelRouter { config }
    }

    /// Classify a request's complexity from its estimated token count and
    /// textual cues (spec §4.8).
    #[must_use]
    pub fn classify_request(&self, message: &str, estimated_tokens: u64) -> RequestType {
        let base = classify_request_type(
            estimated_tokens,
            self.config.simple_token_ceiling,
            self.config.moderate_token_ceiling,
        );
        let lower = message.to_lowercase();
        if base != RequestType::Complex && COMPLEXITY_CUES.iter().any(|c| lower.contains(c)) {
            return RequestType::Complex;
        }
        base
    }

    /// Route a request (spec §4.8). `forced_tier`, if present, skips
    /// strategy-based selection and only picks the cheapest model at that
    /// tier which fits `context_tokens` (used when a policy decision
    /// mandates a tier, spec §4.10 steps 5/6/7/9).
    #[must_use]
    pub fn route(
        &self,
        message: &str,
        estimated_tokens: u64,
        context_tokens: u64,
        preferred_model: &str,
        forced_tier: Option<Tier>,
    ) -> RoutingDecision {
        let request_type = self.classify_request(message, estimated_tokens);

        let preferred_entry = self.config.catalog.iter().find(|m| m.model == preferred_model);
        let preferred_tier = preferred_entry.map_or(self.config.catalog.iter().map(|m| m.tier).max().unwrap_or(Tier::Standard), |e| e.tier);

        let fitting: Vec<&ModelCatalogEntry> = self
            .config
            .catalog
            .iter()
            .filter(|m| m.context_limit >= context_tokens)
            .filter(|m| forced_tier.map_or(true, |t| m.tier == t))
            .collect();

        let selected = if fitting.is_empty() {
            // Nothing fits the forced tier; fall back to any model that fits.
            self.config
                .catalog
                .iter()
                .filter(|m| m.context_limit >= context_tokens)
                .min_by(|a, b| a.tier.cmp(&b.tier))
        } else {
            match self.config.strategy {
                RoutingStrategy::Cheapest => fitting.iter().copied().min_by(|a, b| a.tier.cmp(&b.tier)),
                RoutingStrategy::Quality => fitting.iter().copied().max_by(|a, b| a.tier.cmp(&b.tier)),
                RoutingStrategy::Balanced => {
                    let target_tier = match request_type {
                        RequestType::Simple => Tier::Cheap,
                        RequestType::Moderate => Tier::Standard,
                        RequestType::Complex => Tier::Expensive,
                    };
                    fitting
                        .iter()
                        .copied()
                        .min_by_key(|m| (m.tier as i32 - target_tier as i32).abs())
                }
            }
        };

        let Some(selected) = selected.or_else(|| self.config.catalog.first()) else {
            return RoutingDecision {
                selected_model: preferred_model.to_string(),
                tier: Tier::Standard,
                downgraded: false,
                estimated_cost_usd: 0.0,
                reason: "no model catalog configured, leaving preferred model unchanged".to_string(),
                request_type,
            };
        };

        let downgraded = forced_tier.map_or(selected.tier < preferred_tier, |t| t < preferred_tier) || selected.model != preferred_model && selected.tier < preferred_tier;
        let estimated_cost_usd = (context_tokens as f64) * selected.input_cost_per_token;

        let reason = if forced_tier.is_some() {
            "policy-mandated tier override".to_string()
        } else if downgraded {
            format!("preferred model {preferred_model} unavailable or too costly, downgraded to {}", selected.model)
        } else {
            format!("selected {} via {:?} strategy for {:?} request", selected.model, self.config.strategy, request_type)
        };

        RoutingDecision {
            selected_model: selected.model.clone(),
            tier: selected.tier,
            downgraded,
            estimated_cost_usd,
            reason,
            request_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_router() -> ModelRouter {
        ModelRouter::new(RoutingConfig::default())
    }

    #[test]
    fn classifies_short_message_as_simple() {
        let router = test_router();
        assert_eq!(router.classify_request("hi", 50), RequestType::Simple);
    }

    #[test]
    fn code_fence_forces_complex_regardless_of_length() {
        let router = test_router();
        assert_eq!(router.classify_request("```rust\nfn main(){}\n```", 50), RequestType::Complex);
    }

    #[test]
    fn disqualifies_models_that_cannot_fit_context() {
        let mut config = RoutingConfig::default();
        config.catalog = vec![crate::config::ModelCatalogEntry {
            model: "tiny-model".to_string(),
            tier: Tier::Cheap,
            input_cost_per_token: 0.000_000_1,
            output_cost_per_token: 0.000_000_2,
            context_limit: 100,
        }];
        let router = ModelRouter::new(config);
        let decision = router.route("hello", 50, 50_000, "tiny-model", None);
        // No catalog entry fits 50k tokens; falls back to the only entry.
        assert_eq!(decision.selected_model, "tiny-model");
    }

    #[test]
    fn forced_cheap_tier_selects_cheap_model() {
        let router = test_router();
        let decision = router.route("hello", 50, 100, "gpt-4-turbo", Some(Tier::Cheap));
        assert_eq!(decision.tier, Tier::Cheap);
    }
}
