//! Prometheus metrics registry, grounded on
//! `dashflow-observability::metrics_server`'s `MetricsRegistry::global()`/
//! `.export()` shape, retargeted at the guard's own counters instead of
//! graph-execution metrics.

use std::sync::{Arc, OnceLock};

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::{Error, Result};

static GLOBAL: OnceLock<Arc<MetricsRegistry>> = OnceLock::new();

/// The guard's metric set: detection, cache, routing, budget, and evolver
/// counters a dashboard or Prometheus scraper reads.
pub struct MetricsRegistry {
    registry: Registry,
    /// Requests blocked by the security pipeline (C1-C6).
    pub threats_blocked_total: IntCounterVec,
    /// Response cache hits.
    pub cache_hits_total: IntCounter,
    /// Response cache misses.
    pub cache_misses_total: IntCounter,
    /// Tokens saved across all compression + cache hits.
    pub tokens_saved_total: IntCounter,
    /// Requests blocked by the policy engine for budget reasons.
    pub budget_blocks_total: IntCounter,
    /// Requests downgraded to a cheaper model tier.
    pub model_downgrades_total: IntCounter,
    /// Dynamic patterns deployed by the evolver, lifetime total.
    pub evolver_patterns_deployed_total: IntCounter,
    /// Current installed pattern count (built-in + dynamic).
    pub pattern_store_size: IntGauge,
}

impl MetricsRegistry {
    /// Build a fresh registry and register every guard metric against it.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let threats_blocked_total = IntCounterVec::new(
            Opts::new("guard_threats_blocked_total", "Requests blocked by the security detection pipeline"),
            &["category"],
        )
        .map_err(|e| Error::Metrics(e.to_string()))?;
        let cache_hits_total = IntCounter::new("guard_cache_hits_total", "Response cache hits").map_err(|e| Error::Metrics(e.to_string()))?;
        let cache_misses_total =
            IntCounter::new("guard_cache_misses_total", "Response cache misses").map_err(|e| Error::Metrics(e.to_string()))?;
        let tokens_saved_total =
            IntCounter::new("guard_tokens_saved_total", "Tokens saved via cache hits and compression").map_err(|e| Error::Metrics(e.to_string()))?;
        let budget_blocks_total =
            IntCounter::new("guard_budget_blocks_total", "Requests blocked for exceeding a budget").map_err(|e| Error::Metrics(e.to_string()))?;
        let model_downgrades_total =
            IntCounter::new("guard_model_downgrades_total", "Requests downgraded to a cheaper model tier").map_err(|e| Error::Metrics(e.to_string()))?;
        let evolver_patterns_deployed_total =
            IntCounter::new("guard_evolver_patterns_deployed_total", "Dynamic patterns deployed by the adversarial evolver")
                .map_err(|e| Error::Metrics(e.to_string()))?;
        let pattern_store_size =
            IntGauge::new("guard_pattern_store_size", "Currently installed pattern count").map_err(|e| Error::Metrics(e.to_string()))?;

        registry.register(Box::new(threats_blocked_total.clone())).map_err(|e| Error::Metrics(e.to_string()))?;
        registry.register(Box::new(cache_hits_total.clone())).map_err(|e| Error::Metrics(e.to_string()))?;
        registry.register(Box::new(cache_misses_total.clone())).map_err(|e| Error::Metrics(e.to_string()))?;
        registry.register(Box::new(tokens_saved_total.clone())).map_err(|e| Error::Metrics(e.to_string()))?;
        registry.register(Box::new(budget_blocks_total.clone())).map_err(|e| Error::Metrics(e.to_string()))?;
        registry.register(Box::new(model_downgrades_total.clone())).map_err(|e| Error::Metrics(e.to_string()))?;
        registry
            .register(Box::new(evolver_patterns_deployed_total.clone()))
            .map_err(|e| Error::Metrics(e.to_string()))?;
        registry.register(Box::new(pattern_store_size.clone())).map_err(|e| Error::Metrics(e.to_string()))?;

        Ok(MetricsRegistry {
            registry,
            threats_blocked_total,
            cache_hits_total,
            cache_misses_total,
            tokens_saved_total,
            budget_blocks_total,
            model_downgrades_total,
            evolver_patterns_deployed_total,
            pattern_store_size,
        })
    }

    /// The process-global registry, built lazily on first access.
    pub fn global() -> Arc<MetricsRegistry> {
        GLOBAL
            .get_or_init(|| Arc::new(MetricsRegistry::new().expect("default metric registration never fails")))
            .clone()
    }

    /// Render the current metric values in Prometheus text exposition
    /// format, for a caller to serve from `/metrics` or similar.
    pub fn export(&self) -> Result<String> {
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).map_err(|e| Error::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| Error::Metrics(e.to_string()))
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        MetricsRegistry::new().expect("default metric registration never fails")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_registry_exports_registered_metric_names() {
        let registry = MetricsRegistry::new().unwrap();
        registry.cache_hits_total.inc();
        let exported = registry.export().unwrap();
        assert!(exported.contains("guard_cache_hits_total"));
    }

    #[test]
    fn threats_blocked_total_tracks_by_category_label() {
        let registry = MetricsRegistry::new().unwrap();
        registry.threats_blocked_total.with_label_values(&["jailbreak"]).inc();
        registry.threats_blocked_total.with_label_values(&["jailbreak"]).inc();
        registry.threats_blocked_total.with_label_values(&["encoding_bypass"]).inc();
        assert_eq!(registry.threats_blocked_total.with_label_values(&["jailbreak"]).get(), 2);
    }

    #[test]
    fn global_registry_is_a_singleton() {
        let a = MetricsRegistry::global();
        let b = MetricsRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
