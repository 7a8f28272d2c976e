//! The data model (spec §3): `Pattern`, `Threat`, `DetectionResult`,
//! `Fingerprint`, `CacheEntry`, `Policy`, `PolicyScope`, `BudgetState`,
//! `UsageRecord`, `ApprovalTicket`, `GuardDecision`, `AttackSample`,
//! `BenignSample`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The category a detection [`Pattern`] or [`Threat`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// "Ignore previous instructions" style overrides.
    InstructionOverride,
    /// "You are now DAN" style role hijacks.
    RoleManipulation,
    /// Attempts to extract the system prompt verbatim.
    SystemExtraction,
    /// Generic jailbreak framing.
    Jailbreak,
    /// Leetspeak/homoglyph/base64 style obfuscation used to smuggle a payload.
    EncodingBypass,
    /// Attempts to manipulate conversational context/history.
    ContextManipulation,
    /// Attempts to control the shape of the model's output for downstream abuse.
    OutputManipulation,
    /// Attempts to exfiltrate sensitive data via the model.
    DataExtraction,
    /// Attempts to gain elevated tool/system privileges.
    PrivilegeEscalation,
    /// Multi-turn attacks that build up an attack across several messages.
    MultiStep,
    /// Malicious instructions embedded in tool descriptions/outputs (MCP-style).
    ToolPoisoning,
    /// Attacks that chain through an intermediate, seemingly benign tool call.
    ParasiticChain,
    /// Evidence contributed by the local ML classifier (C4), not a named attack family.
    MlClassifier,
}

/// Severity of a [`Pattern`]/[`Threat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Lowest severity.
    Low,
    /// Medium severity.
    Medium,
    /// High severity.
    High,
    /// Highest severity.
    Critical,
}

impl Severity {
    /// The weight used by the risk aggregation formula (spec §4.6 step 8).
    #[must_use]
    pub fn weight(self) -> f64 {
        match self {
            Severity::Critical => 1.0,
            Severity::High => 0.75,
            Severity::Medium => 0.50,
            Severity::Low => 0.25,
        }
    }
}

/// The categorical mapping of an aggregate `risk_score` (spec §3, §4.6 step 9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// `risk_score < 0.10`
    Negligible,
    /// `0.10 <= risk_score < 0.35`
    Low,
    /// `0.35 <= risk_score < 0.60`
    Medium,
    /// `0.60 <= risk_score < 0.80`
    High,
    /// `risk_score >= 0.80`
    Critical,
}

impl RiskLevel {
    /// Monotonic threshold mapping of a risk score in `[0, 1]` (spec §3).
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.80 {
            RiskLevel::Critical
        } else if score >= 0.60 {
            RiskLevel::High
        } else if score >= 0.35 {
            RiskLevel::Medium
        } else if score >= 0.10 {
            RiskLevel::Low
        } else {
            RiskLevel::Negligible
        }
    }
}

/// A compiled detection rule (spec §3).
///
/// Invariant: every regex body compiles; `base_confidence <= 1.0`.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Pattern {
    /// Stable identifier. Built-in patterns use a domain-specific prefix;
    /// evolver-generated patterns use `DYN-{n}` (spec §4.12).
    pub id: String,
    /// The attack family this pattern detects.
    pub category: Category,
    /// One or more regex bodies; a match on any counts as a match of the pattern.
    pub regexes: Vec<String>,
    /// Declared severity.
    pub severity: Severity,
    /// Base confidence in `[0, 1]`, before any similarity-factor multiplication.
    pub base_confidence: f64,
    /// Human-readable description.
    pub description: String,
    /// Whether matching is case-insensitive. Defaults to `true`.
    #[serde(default = "default_true")]
    pub case_insensitive: bool,
}

fn default_true() -> bool {
    true
}

impl Pattern {
    /// Validate the invariants spec §3 requires of a `Pattern`: every regex
    /// compiles and `base_confidence` is within bounds.
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(0.0..=1.0).contains(&self.base_confidence) {
            return Err(crate::error::Error::Validation(format!(
                "pattern {} has out-of-range base_confidence {}",
                self.id, self.base_confidence
            )));
        }
        for body in &self.regexes {
            regex::RegexBuilder::new(body)
                .case_insensitive(self.case_insensitive)
                .build()
                .map_err(|e| {
                    crate::error::Error::Validation(format!(
                        "pattern {} has invalid regex {body:?}: {e}",
                        self.id
                    ))
                })?;
        }
        Ok(())
    }
}

/// The source layer that contributed a [`Threat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceLayer {
    /// C2 rule matcher.
    RuleMatcher,
    /// C3 similarity index.
    SimilarityIndex,
    /// C4 local classifier.
    LocalClassifier,
    /// C5 intent classifier, used as a fallback evidence source.
    IntentClassifier,
}

/// A single detection finding (spec §3).
///
/// Invariant: `confidence in [0, 1]`; `span` is within the bounds of the
/// text that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Threat {
    /// The pattern that produced this threat, or a synthetic id for
    /// non-pattern layers (e.g. `"ml_classifier"`, `"similarity_index"`).
    pub pattern_id: String,
    /// Attack family.
    pub category: Category,
    /// Severity.
    pub severity: Severity,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Byte offsets `(start, end)` of the matched fragment within the text
    /// that was scanned. `None` for layers that don't localize a span.
    pub span: Option<(usize, usize)>,
    /// The matched text fragment, if localized.
    pub matched_text: Option<String>,
    /// Which layer produced this finding.
    pub source_layer: SourceLayer,
}

/// The aggregated outcome of the detection pipeline (spec §3).
///
/// Invariant: `risk_level` is the monotonic mapping of `risk_score` at the
/// thresholds `{0.10, 0.35, 0.60, 0.80}`.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DetectionResult {
    /// All threats surviving merge and the FP filter.
    pub threats: Vec<Threat>,
    /// Aggregate risk in `[0, 1]`.
    pub risk_score: f64,
    /// Threshold-mapped risk level.
    pub risk_level: RiskLevel,
    /// Whether the intent classifier bypassed detection for this text.
    pub bypass: bool,
}

impl DetectionResult {
    /// `true` when no threats survived and this was not an intent bypass,
    /// i.e. the detector itself found nothing of concern.
    #[must_use]
    pub fn is_safe(&self) -> bool {
        self.threats.is_empty()
    }
}

/// A deterministic hash over `(system_prompt, user_message, model_id)`,
/// canonicalized per spec §3 (trailing whitespace stripped, internal runs
/// collapsed) before hashing, so semantically-interchangeable requests
/// share a cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Compute the fingerprint for a `(system_prompt, user_message, model)` triple.
    #[must_use]
    pub fn compute(system_prompt: &str, user_message: &str, model: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        canonicalize(system_prompt).hash(&mut hasher);
        canonicalize(user_message).hash(&mut hasher);
        model.hash(&mut hasher);
        Fingerprint(hasher.finish())
    }
}

/// Strip trailing whitespace and collapse internal whitespace runs, the
/// canonicalization spec §3 requires for fingerprint determinism.
#[must_use]
pub fn canonicalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A memoized model response (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheEntry {
    /// The fingerprint this entry is keyed by.
    pub fingerprint: Fingerprint,
    /// The cached response text.
    pub response_text: String,
    /// Total tokens in the cached response.
    pub token_count: u64,
    /// When this entry was created.
    pub created_at: DateTime<Utc>,
    /// Time-to-live before the entry is considered stale.
    pub ttl: chrono::Duration,
    /// Number of times this entry has been served.
    pub hit_count: u64,
}

impl CacheEntry {
    /// Whether this entry has outlived its TTL as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > self.ttl
    }
}

/// Cost/quality tier of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Cheapest tier.
    Cheap,
    /// Default tier.
    Standard,
    /// Highest-quality, highest-cost tier.
    Expensive,
}

/// Router's classification of a request's complexity (spec §4.8, glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Short, single-step requests.
    Simple,
    /// Mid-size requests with some structure.
    Moderate,
    /// Long or multi-step requests, or those containing code fences.
    Complex,
}

/// Budget and guardrail configuration for a [`PolicyScope`] (spec §3).
///
/// Invariants: all budgets/limits are non-negative; `daily_budget <=
/// monthly_budget`.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Policy {
    /// Stable identifier for this policy.
    pub id: String,
    /// Master on/off switch; disabled policies allow everything.
    pub enabled: bool,
    /// Daily spend budget in USD.
    pub daily_budget_usd: f64,
    /// Monthly spend budget in USD.
    pub monthly_budget_usd: f64,
    /// Max tokens allowed in a single request.
    pub per_request_token_limit: u64,
    /// Max estimated cost allowed in a single request, in USD.
    pub per_request_cost_limit_usd: f64,
    /// Token count above which compression is auto-flagged.
    pub auto_compress_threshold_tokens: u64,
    /// Cost above which the cheapest-fit model is suggested.
    pub auto_downgrade_threshold_usd: f64,
    /// Whether `get_or_build` caching is used for this scope.
    pub auto_cache_enabled: bool,
    /// Default model tier absent any other signal.
    pub default_tier: Tier,
    /// Whether the expensive tier may be used at all.
    pub allow_expensive_tier: bool,
    /// Whether an `ApprovalTicket` is required before using the expensive tier.
    pub require_approval_for_expensive: bool,
    /// Request types forced onto the cheap tier regardless of routing.
    pub force_cheap_for_types: Vec<RequestType>,
    /// Percentage of budget consumed at which a `budget_warning` event fires.
    pub alert_at_budget_percent: f64,
}

impl Policy {
    /// The built-in default policy (spec §4.10, grounded on
    /// `cost_guard/policy.py::_create_default_policy`).
    #[must_use]
    pub fn default_policy() -> Self {
        Policy {
            id: "default".to_string(),
            enabled: true,
            daily_budget_usd: 50.0,
            monthly_budget_usd: 500.0,
            per_request_token_limit: 100_000,
            per_request_cost_limit_usd: 1.0,
            auto_compress_threshold_tokens: 3_000,
            auto_downgrade_threshold_usd: 0.10,
            auto_cache_enabled: true,
            default_tier: Tier::Standard,
            allow_expensive_tier: true,
            require_approval_for_expensive: false,
            force_cheap_for_types: vec![RequestType::Simple],
            alert_at_budget_percent: 80.0,
        }
    }

    /// Validate the invariants spec §3 requires of a `Policy`.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.daily_budget_usd < 0.0
            || self.monthly_budget_usd < 0.0
            || self.per_request_cost_limit_usd < 0.0
            || self.auto_downgrade_threshold_usd < 0.0
        {
            return Err(crate::error::Error::Config(format!(
                "policy {} has a negative budget/limit",
                self.id
            )));
        }
        if self.daily_budget_usd > self.monthly_budget_usd {
            return Err(crate::error::Error::Config(format!(
                "policy {} has daily_budget_usd > monthly_budget_usd",
                self.id
            )));
        }
        Ok(())
    }
}

/// The resolution key for a [`Policy`] (spec §3, §4.10).
///
/// Exactly one policy is active per request: `User` beats `Org` beats
/// `Default`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
pub enum PolicyScope {
    /// Most specific: a single user within an org.
    User {
        /// The organization id.
        org: String,
        /// The user id.
        user: String,
    },
    /// An entire organization.
    Org {
        /// The organization id.
        org: String,
    },
    /// The built-in fallback.
    Default,
}

impl PolicyScope {
    /// The lookup keys to try, in priority order, for a user-scoped request:
    /// `user:{org}:{user}`, `org:{org}`, `default`.
    #[must_use]
    pub fn resolution_chain(org: &str, user: &str) -> Vec<PolicyScope> {
        vec![
            PolicyScope::User {
                org: org.to_string(),
                user: user.to_string(),
            },
            PolicyScope::Org {
                org: org.to_string(),
            },
            PolicyScope::Default,
        ]
    }

    /// A stable string key for this scope, used to index the policy table.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            PolicyScope::User { org, user } => format!("user:{org}:{user}"),
            PolicyScope::Org { org } => format!("org:{org}"),
            PolicyScope::Default => "default".to_string(),
        }
    }
}

/// Rolling usage for a scope within the current day/month windows (spec §3).
///
/// Invariant: costs are non-negative; `daily_cost <= monthly_cost` for the
/// same period (the monthly window always contains the daily one).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct BudgetState {
    /// Total cost incurred so far in the current day window, in USD.
    pub daily_cost_usd: f64,
    /// Total cost incurred so far in the current month window, in USD.
    pub monthly_cost_usd: f64,
}

/// Alert level derived from a [`BudgetState`] against a [`Policy`] (spec
/// §4.10, grounded on `cost_guard/policy.py::BudgetStatus`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    /// Below the configured alert percentage.
    Normal,
    /// At or above the configured alert percentage, below 100%.
    Warning,
    /// At or above 100% of either budget but not yet blocking (monthly
    /// headroom remains under the daily budget, or vice versa).
    Critical,
    /// Budget exhausted; requests in this scope are blocked.
    Exceeded,
}

/// Cache hit/miss classification recorded on a [`UsageRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// No cache involvement.
    None,
    /// Served from cache.
    Hit,
    /// This request was the one that built the cache entry.
    Miss,
}

/// One append-only accounting record (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct UsageRecord {
    /// When the usage occurred.
    pub timestamp: DateTime<Utc>,
    /// The scope this usage is attributed to.
    pub scope: PolicyScope,
    /// Session identifier, for per-conversation accounting.
    pub session_id: String,
    /// The model actually used.
    pub model: String,
    /// Prompt tokens consumed.
    pub prompt_tokens: u64,
    /// Completion tokens consumed.
    pub completion_tokens: u64,
    /// Total cost in USD.
    pub cost_usd: f64,
    /// Cache involvement.
    pub cache_status: CacheStatus,
    /// Whether the prompt was compressed before sending.
    pub compressed: bool,
    /// Prompt token count before compression, if compressed.
    pub original_prompt_tokens: Option<u64>,
}

/// Status of an [`ApprovalTicket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Awaiting a decision.
    Pending,
    /// Approved; promotable to `allow` on a subsequent request.
    Approved,
    /// Rejected; terminal.
    Rejected,
}

/// A pending expensive-tier approval (spec §3, §4.10).
///
/// Lifecycle: created on a policy `require_approval` decision; terminal on
/// approve/reject; not reusable once terminal.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ApprovalTicket {
    /// Stable identifier.
    pub id: Uuid,
    /// When the ticket was created.
    pub created_at: DateTime<Utc>,
    /// Session this ticket was raised for.
    pub session_id: String,
    /// The model that triggered the approval requirement.
    pub model: String,
    /// Estimated cost of the request that triggered this ticket.
    pub estimated_cost_usd: f64,
    /// Current status.
    pub status: ApprovalStatus,
}

impl ApprovalTicket {
    /// Create a new pending ticket.
    #[must_use]
    pub fn new(session_id: String, model: String, estimated_cost_usd: f64) -> Self {
        ApprovalTicket {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            session_id,
            model,
            estimated_cost_usd,
            status: ApprovalStatus::Pending,
        }
    }
}

/// The per-request decision action (spec §3, §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GuardAction {
    /// Request allowed as-is.
    Allow,
    /// Served from the response cache.
    AllowCached,
    /// Allowed after prompt compression.
    AllowCompressed,
    /// Allowed after the router downgraded the model tier.
    AllowDowngraded,
    /// Blocked: a security threat was detected.
    BlockSecurity,
    /// Blocked: a budget or limit was exceeded.
    BlockBudget,
    /// Neither allowed nor blocked yet: an approval ticket was raised.
    RequireApproval,
}

/// The per-request outcome (spec §3).
///
/// Invariant: `action` is consistent with the flags, e.g. `action ==
/// AllowCached` iff `cache_hit && cached_response.is_some()`.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GuardDecision {
    /// The decided action.
    pub action: GuardAction,
    /// The model ultimately selected (may differ from the caller's preference).
    pub selected_model: String,
    /// Whether this was served from cache.
    pub cache_hit: bool,
    /// The cached response, if `cache_hit`.
    pub cached_response: Option<String>,
    /// Estimated cost of the (possibly transformed) request, in USD.
    pub estimated_cost_usd: f64,
    /// Estimated prompt tokens of the (possibly transformed) request.
    pub estimated_tokens: u64,
    /// Tokens saved relative to the untransformed request (cache or compression).
    pub tokens_saved: u64,
    /// Whether the security layer judged this request safe.
    pub security_safe: bool,
    /// Threats found, if any.
    pub threats: Vec<Threat>,
    /// Aggregate risk score.
    pub risk_score: f64,
    /// Stable, enumerated human-readable reason string.
    pub reason: String,
    /// The approval ticket id, if `action == RequireApproval`.
    pub approval_ticket_id: Option<Uuid>,
}

impl GuardDecision {
    /// `true` iff the flags are mutually consistent with `action` (spec §3
    /// invariant). Used in tests and `debug_assert!`-style internal checks.
    #[must_use]
    pub fn invariants_hold(&self) -> bool {
        let cached_consistent = (self.action == GuardAction::AllowCached)
            == (self.cache_hit && self.cached_response.is_some());
        let approval_consistent =
            (self.action == GuardAction::RequireApproval) == self.approval_ticket_id.is_some();
        cached_consistent && approval_consistent
    }
}

/// The label attached to a similarity-index sample (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SampleLabel {
    /// A confirmed attack sample.
    Attack,
    /// A confirmed benign sample.
    Benign,
}

/// A labeled text sample stored in the external graph store and consumed
/// read-only by C3 (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Sample {
    /// The raw text.
    pub text: String,
    /// Attack or benign.
    pub label: SampleLabel,
    /// Attack family, meaningful only for `SampleLabel::Attack`.
    pub category: Option<Category>,
    /// Confidence in `[0, 1]` that the label is correct.
    pub confidence: f64,
    /// Pre-computed embedding, if available.
    pub embedding: Option<Vec<f32>>,
    /// When the sample was recorded.
    pub created_at: DateTime<Utc>,
    /// Where the sample came from (e.g. `"evolver"`, `"manual"`, `"auto_label"`).
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_thresholds_are_monotonic() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Negligible);
        assert_eq!(RiskLevel::from_score(0.09), RiskLevel::Negligible);
        assert_eq!(RiskLevel::from_score(0.10), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.34), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.35), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.59), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.60), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.79), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.80), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(1.0), RiskLevel::Critical);
    }

    #[test]
    fn severity_weights_match_spec() {
        assert_eq!(Severity::Critical.weight(), 1.0);
        assert_eq!(Severity::High.weight(), 0.75);
        assert_eq!(Severity::Medium.weight(), 0.50);
        assert_eq!(Severity::Low.weight(), 0.25);
    }

    #[test]
    fn fingerprint_determinism_on_whitespace_variants() {
        let a = Fingerprint::compute("sys", "hello   world  ", "gpt-4");
        let b = Fingerprint::compute("sys", "hello world", "gpt-4");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_sensitive_to_model() {
        let a = Fingerprint::compute("sys", "hello", "gpt-4");
        let b = Fingerprint::compute("sys", "hello", "gpt-3.5");
        assert_ne!(a, b);
    }

    #[test]
    fn default_policy_matches_spec_constants() {
        let p = Policy::default_policy();
        assert_eq!(p.daily_budget_usd, 50.0);
        assert_eq!(p.monthly_budget_usd, 500.0);
        assert_eq!(p.per_request_token_limit, 100_000);
        assert_eq!(p.per_request_cost_limit_usd, 1.0);
        assert_eq!(p.auto_compress_threshold_tokens, 3_000);
        assert_eq!(p.auto_downgrade_threshold_usd, 0.10);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn policy_validate_rejects_daily_above_monthly() {
        let mut p = Policy::default_policy();
        p.daily_budget_usd = 600.0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn policy_scope_resolution_chain_order() {
        let chain = PolicyScope::resolution_chain("acme", "alice");
        assert_eq!(chain[0].key(), "user:acme:alice");
        assert_eq!(chain[1].key(), "org:acme");
        assert_eq!(chain[2].key(), "default");
    }

    #[test]
    fn pattern_validate_rejects_bad_regex() {
        let p = Pattern {
            id: "P1".to_string(),
            category: Category::Jailbreak,
            regexes: vec!["(unclosed".to_string()],
            severity: Severity::High,
            base_confidence: 0.8,
            description: "test".to_string(),
            case_insensitive: true,
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn pattern_validate_rejects_out_of_range_confidence() {
        let p = Pattern {
            id: "P1".to_string(),
            category: Category::Jailbreak,
            regexes: vec!["ignore".to_string()],
            severity: Severity::High,
            base_confidence: 1.5,
            description: "test".to_string(),
            case_insensitive: true,
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn guard_decision_invariants_hold_for_cached() {
        let decision = GuardDecision {
            action: GuardAction::AllowCached,
            selected_model: "gpt-4".to_string(),
            cache_hit: true,
            cached_response: Some("hi".to_string()),
            estimated_cost_usd: 0.0,
            estimated_tokens: 0,
            tokens_saved: 10,
            security_safe: true,
            threats: vec![],
            risk_score: 0.0,
            reason: "cache_hit".to_string(),
            approval_ticket_id: None,
        };
        assert!(decision.invariants_hold());
    }

    #[test]
    fn guard_decision_invariants_catch_inconsistent_cache_flag() {
        let decision = GuardDecision {
            action: GuardAction::AllowCached,
            selected_model: "gpt-4".to_string(),
            cache_hit: false,
            cached_response: None,
            estimated_cost_usd: 0.0,
            estimated_tokens: 0,
            tokens_saved: 0,
            security_safe: true,
            threats: vec![],
            risk_score: 0.0,
            reason: "bogus".to_string(),
            approval_ticket_id: None,
        };
        assert!(!decision.invariants_hold());
    }
}
