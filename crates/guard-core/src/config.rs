//! `GuardConfig` — the single construction input for [`crate::guard::RuntimeGuard`]
//! (spec §9, "config-object explosion"). Deserializable from TOML or YAML.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::Tier;

/// Security/detection pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SecurityConfig {
    /// Master on/off switch for the detection pipeline.
    pub enabled: bool,
    /// Which layers are active, in the order they should run.
    pub layers: Vec<DetectionLayerKind>,
    /// Path to the dynamic-patterns file (spec §6 persisted state).
    pub dynamic_patterns_path: Option<String>,
    /// Per-pattern regex evaluation timeout, in milliseconds (spec §4.2: 10ms).
    pub pattern_timeout_ms: u64,
    /// Local classifier threshold (spec §4.4 default: 0.85).
    pub classifier_threshold: f64,
    /// Fast-path similarity threshold for `block_security` (spec §4.11 step 1: 0.9).
    pub fast_path_similarity_threshold: f64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            enabled: true,
            layers: vec![
                DetectionLayerKind::RuleMatcher,
                DetectionLayerKind::SimilarityIndex,
                DetectionLayerKind::LocalClassifier,
                DetectionLayerKind::IntentClassifier,
            ],
            dynamic_patterns_path: Some("dynamic_patterns.json".to_string()),
            pattern_timeout_ms: 10,
            classifier_threshold: 0.85,
            fast_path_similarity_threshold: 0.9,
        }
    }
}

/// Which detection layers are enabled, data not code (spec §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DetectionLayerKind {
    /// C2.
    RuleMatcher,
    /// C3.
    SimilarityIndex,
    /// C4.
    LocalClassifier,
    /// C5 as fallback evidence (spec §4.6 step 5).
    IntentClassifier,
}

/// Response cache configuration (C7).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheConfig {
    /// Master on/off switch.
    pub enabled: bool,
    /// Max entries before LRU eviction.
    pub max_entries: usize,
    /// Entry TTL in seconds.
    pub ttl_seconds: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            max_entries: 10_000,
            ttl_seconds: 3_600,
        }
    }
}

/// Prompt compression configuration (C9).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompressionConfig {
    /// Master on/off switch.
    pub enabled: bool,
    /// Whether to additionally apply code-style shortening.
    pub aggressive: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        CompressionConfig {
            enabled: true,
            aggressive: false,
        }
    }
}

/// One entry in the router's model catalog (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ModelCatalogEntry {
    /// Model identifier.
    pub model: String,
    /// Cost/quality tier.
    pub tier: Tier,
    /// Cost per input token, in USD.
    pub input_cost_per_token: f64,
    /// Cost per output token, in USD.
    pub output_cost_per_token: f64,
    /// Maximum context window, in tokens.
    pub context_limit: u64,
}

/// Router strategy (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Always pick the cheapest model that fits.
    Cheapest,
    /// Balance cost and quality against the classified request type.
    Balanced,
    /// Prefer quality, cost secondary.
    Quality,
}

/// Model routing configuration (C8).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RoutingConfig {
    /// Master on/off switch. When disabled, the caller's preferred model
    /// is always used verbatim.
    pub enabled: bool,
    /// Selection strategy.
    pub strategy: RoutingStrategy,
    /// The configured model catalog.
    pub catalog: Vec<ModelCatalogEntry>,
    /// Token-count upper bound for `RequestType::Simple` (spec §4.8 default: 300).
    pub simple_token_ceiling: u64,
    /// Token-count upper bound for `RequestType::Moderate` (spec §4.8 default: 3000).
    pub moderate_token_ceiling: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig {
            enabled: true,
            strategy: RoutingStrategy::Balanced,
            catalog: vec![
                ModelCatalogEntry {
                    model: "gpt-4o-mini".to_string(),
                    tier: Tier::Cheap,
                    input_cost_per_token: 0.000_000_15,
                    output_cost_per_token: 0.000_000_60,
                    context_limit: 128_000,
                },
                ModelCatalogEntry {
                    model: "gpt-4o".to_string(),
                    tier: Tier::Standard,
                    input_cost_per_token: 0.000_002_50,
                    output_cost_per_token: 0.000_010_00,
                    context_limit: 128_000,
                },
                ModelCatalogEntry {
                    model: "gpt-4-turbo".to_string(),
                    tier: Tier::Expensive,
                    input_cost_per_token: 0.000_010_00,
                    output_cost_per_token: 0.000_030_00,
                    context_limit: 128_000,
                },
            ],
            simple_token_ceiling: 300,
            moderate_token_ceiling: 3_000,
        }
    }
}

/// Policy engine configuration wrapper (C10). The actual per-scope
/// [`crate::model::Policy`] objects are managed at runtime by
/// [`crate::policy::PolicyEngine`]; this only configures the engine's
/// own behavior.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PolicyEngineConfig {
    /// How long an approval ticket remains valid before eviction, in seconds.
    pub approval_ticket_ttl_seconds: i64,
}

impl Default for PolicyEngineConfig {
    fn default() -> Self {
        PolicyEngineConfig {
            approval_ticket_ttl_seconds: 3_600,
        }
    }
}

/// The single construction input for the guard runtime (spec §9).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GuardConfig {
    /// Detection pipeline configuration.
    pub security: SecurityConfig,
    /// Response cache configuration.
    pub cache: CacheConfig,
    /// Prompt compression configuration.
    pub compression: CompressionConfig,
    /// Model routing configuration.
    pub routing: RoutingConfig,
    /// Policy engine configuration.
    pub policy: PolicyEngineConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        GuardConfig {
            security: SecurityConfig::default(),
            cache: CacheConfig::default(),
            compression: CompressionConfig::default(),
            routing: RoutingConfig::default(),
            policy: PolicyEngineConfig::default(),
        }
    }
}

impl GuardConfig {
    /// Parse a `GuardConfig` from TOML.
    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(format!("invalid TOML config: {e}")))
    }

    /// Parse a `GuardConfig` from YAML.
    pub fn from_yaml(s: &str) -> Result<Self> {
        serde_yml::from_str(s).map_err(|e| Error::Config(format!("invalid YAML config: {e}")))
    }

    /// Validate cross-field invariants not already enforced by the type system.
    pub fn validate(&self) -> Result<()> {
        if self.security.pattern_timeout_ms == 0 {
            return Err(Error::Config(
                "security.pattern_timeout_ms must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.security.classifier_threshold) {
            return Err(Error::Config(
                "security.classifier_threshold must be in [0, 1]".to_string(),
            ));
        }
        if self.routing.simple_token_ceiling >= self.routing.moderate_token_ceiling {
            return Err(Error::Config(
                "routing.simple_token_ceiling must be below moderate_token_ceiling".to_string(),
            ));
        }
        if self.routing.enabled && self.routing.catalog.is_empty() {
            return Err(Error::Config(
                "routing.catalog must be non-empty when routing is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(GuardConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_pattern_timeout() {
        let mut cfg = GuardConfig::default();
        cfg.security.pattern_timeout_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_inverted_token_ceilings() {
        let mut cfg = GuardConfig::default();
        cfg.routing.simple_token_ceiling = 5_000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_catalog_when_routing_enabled() {
        let mut cfg = GuardConfig::default();
        cfg.routing.catalog.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = GuardConfig::default();
        let toml_str = toml::to_string(&cfg).unwrap();
        let parsed = GuardConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.security.pattern_timeout_ms, cfg.security.pattern_timeout_ms);
    }
}
