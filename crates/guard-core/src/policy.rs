//! Policy & Budget Engine (C10, spec §4.10).
//!
//! `set_policy`/`get_policy` (scope resolution), `evaluate()` (the ordered
//! short-circuit chain that decides whether/how a request proceeds),
//! `budget_status()`, and the approval ticket lifecycle. Ported from
//! `original_source/.../cost_guard/policy.py`.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{
    AlertLevel, ApprovalStatus, ApprovalTicket, BudgetState, CacheStatus, Policy, PolicyScope, RequestType, Tier, UsageRecord,
};

/// The action the policy engine recommends for a request (spec §4.10).
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyOutcome {
    /// Proceed, optionally forced onto a tier.
    Proceed {
        /// A tier the router must honor, if the policy mandates one.
        forced_tier: Option<Tier>,
        /// Whether compression should be applied before sending.
        should_compress: bool,
    },
    /// Blocked: a budget or per-request limit was exceeded.
    BlockBudget {
        /// Stable, enumerated reason.
        reason: String,
    },
    /// Neither allowed nor blocked: an approval ticket was raised.
    RequireApproval {
        /// The newly created ticket.
        ticket: ApprovalTicket,
    },
}

/// A single scope's rolling usage windows, tracked in-process (spec §3,
/// §4.10 "rolling window accounting").
#[derive(Debug, Clone, Default)]
struct ScopeUsage {
    budget: BudgetState,
    day: Option<(i32, u32, u32)>,
    month: Option<(i32, u32)>,
}

/// The policy and budget engine. Holds per-scope policies, rolling usage,
/// and the pending-approval ticket table.
pub struct PolicyEngine {
    policies: RwLock<HashMap<String, Policy>>,
    usage: RwLock<HashMap<String, ScopeUsage>>,
    tickets: RwLock<HashMap<Uuid, ApprovalTicket>>,
    usage_log: RwLock<Vec<UsageRecord>>,
}

impl PolicyEngine {
    /// Construct an engine with only the built-in default policy registered.
    #[must_use]
    pub fn new() -> Self {
        let mut policies = HashMap::new();
        policies.insert(PolicyScope::Default.key(), Policy::default_policy());
        PolicyEngine {
            policies: RwLock::new(policies),
            usage: RwLock::new(HashMap::new()),
            tickets: RwLock::new(HashMap::new()),
            usage_log: RwLock::new(Vec::new()),
        }
    }

    /// Register or replace the policy for a scope.
    pub fn set_policy(&self, scope: &PolicyScope, policy: Policy) -> Result<()> {
        policy.validate()?;
        self.policies.write().insert(scope.key(), policy);
        Ok(())
    }

    /// Resolve the effective policy for `(org, user)`: user-scoped beats
    /// org-scoped beats the default (spec §4.10, `PolicyScope::resolution_chain`).
    #[must_use]
    pub fn get_policy(&self, org: &str, user: &str) -> Policy {
        let policies = self.policies.read();
        for scope in PolicyScope::resolution_chain(org, user) {
            if let Some(p) = policies.get(&scope.key()) {
                return p.clone();
            }
        }
        Policy::default_policy()
    }

    fn reset_expired_windows(usage: &mut ScopeUsage, now: DateTime<Utc>) {
        let today = (now.year(), now.month(), now.day());
        let this_month = (now.year(), now.month());
        if usage.day != Some(today) {
            usage.budget.daily_cost_usd = 0.0;
            usage.day = Some(today);
        }
        if usage.month != Some(this_month) {
            usage.budget.monthly_cost_usd = 0.0;
            usage.month = Some(this_month);
        }
    }

    /// Current budget consumption for a scope.
    #[must_use]
    pub fn budget_state(&self, scope: &PolicyScope) -> BudgetState {
        let mut usage = self.usage.write();
        let entry = usage.entry(scope.key()).or_default();
        Self::reset_expired_windows(entry, Utc::now());
        entry.budget
    }

    /// The alert level for a scope given its current usage and policy
    /// (spec §4.10, grounded on `cost_guard/policy.py::BudgetStatus`).
    #[must_use]
    pub fn budget_status(&self, scope: &PolicyScope, policy: &Policy) -> AlertLevel {
        let state = self.budget_state(scope);
        if policy.daily_budget_usd <= 0.0 && policy.monthly_budget_usd <= 0.0 {
            return AlertLevel::Normal;
        }
        let daily_pct = if policy.daily_budget_usd > 0.0 {
            state.daily_cost_usd / policy.daily_budget_usd * 100.0
        } else {
            0.0
        };
        let monthly_pct = if policy.monthly_budget_usd > 0.0 {
            state.monthly_cost_usd / policy.monthly_budget_usd * 100.0
        } else {
            0.0
        };
        let worst_pct = daily_pct.max(monthly_pct);

        if worst_pct >= 100.0 {
            AlertLevel::Exceeded
        } else if worst_pct >= 95.0 {
            AlertLevel::Critical
        } else if worst_pct >= policy.alert_at_budget_percent {
            AlertLevel::Warning
        } else {
            AlertLevel::Normal
        }
    }

    /// Run the ordered evaluation chain for a request (spec §4.10, steps
    /// 1-10, any of which may short-circuit):
    ///
    /// 1. Disabled policy: proceed, no transforms.
    /// 2. `daily_cost >= daily_budget`: block.
    /// 3. `monthly_cost >= monthly_budget`: block.
    /// 4. `estimated_tokens > per_request_token_limit`: block, with a
    ///    compression suggestion.
    /// 5. `estimated_cost > per_request_cost_limit`: downgrade to
    ///    `cheapest_available_tier` if the caller found one that fits the
    ///    request's context window; otherwise block. The router, not the
    ///    policy engine, knows what fits a context window, so the caller
    ///    (the runtime guard) resolves this before calling `evaluate`.
    /// 6. Expensive tier requested: downgrade if disallowed outright, else
    ///    raise an approval ticket if approval is required.
    /// 7. `estimated_cost > auto_downgrade_threshold_usd` and the tier isn't
    ///    already cheap: suggest the cheapest tier.
    /// 8. `estimated_tokens > auto_compress_threshold_tokens`: flag compression.
    /// 9. `request_type` is in `force_cheap_for_types` and the tier isn't
    ///    already cheap: suggest the cheapest tier.
    /// 10. Otherwise: proceed at the requested tier.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &self,
        scope: &PolicyScope,
        policy: &Policy,
        session_id: &str,
        requested_tier: Tier,
        request_type: RequestType,
        estimated_tokens: u64,
        estimated_cost_usd: f64,
        cheapest_available_tier: Option<Tier>,
    ) -> PolicyOutcome {
        if !policy.enabled {
            return PolicyOutcome::Proceed {
                forced_tier: None,
                should_compress: false,
            };
        }

        let state = self.budget_state(scope);
        if policy.daily_budget_usd > 0.0 && state.daily_cost_usd >= policy.daily_budget_usd {
            return PolicyOutcome::BlockBudget {
                reason: format!("scope {} has reached its daily budget of ${}", scope.key(), policy.daily_budget_usd),
            };
        }
        if policy.monthly_budget_usd > 0.0 && state.monthly_cost_usd >= policy.monthly_budget_usd {
            return PolicyOutcome::BlockBudget {
                reason: format!("scope {} has reached its monthly budget of ${}", scope.key(), policy.monthly_budget_usd),
            };
        }

        if estimated_tokens > policy.per_request_token_limit {
            return PolicyOutcome::BlockBudget {
                reason: format!(
                    "request estimated at {estimated_tokens} tokens exceeds per_request_token_limit {}",
                    policy.per_request_token_limit
                ),
            };
        }

        if estimated_cost_usd > policy.per_request_cost_limit_usd {
            return match cheapest_available_tier {
                Some(tier) => PolicyOutcome::Proceed {
                    forced_tier: Some(tier),
                    should_compress: estimated_tokens > policy.auto_compress_threshold_tokens,
                },
                None => PolicyOutcome::BlockBudget {
                    reason: format!(
                        "request estimated at ${estimated_cost_usd:.4} exceeds per_request_cost_limit_usd ${} and no cheaper model fits",
                        policy.per_request_cost_limit_usd
                    ),
                },
            };
        }

        if requested_tier == Tier::Expensive {
            if !policy.allow_expensive_tier {
                return PolicyOutcome::Proceed {
                    forced_tier: Some(Tier::Standard),
                    should_compress: estimated_tokens > policy.auto_compress_threshold_tokens,
                };
            }
            if policy.require_approval_for_expensive {
                let ticket = ApprovalTicket::new(session_id.to_string(), "pending-expensive-tier".to_string(), estimated_cost_usd);
                self.tickets.write().insert(ticket.id, ticket.clone());
                return PolicyOutcome::RequireApproval { ticket };
            }
        }

        let should_compress = estimated_tokens > policy.auto_compress_threshold_tokens;

        if estimated_cost_usd > policy.auto_downgrade_threshold_usd && requested_tier != Tier::Cheap {
            return PolicyOutcome::Proceed {
                forced_tier: Some(Tier::Cheap),
                should_compress,
            };
        }

        if policy.force_cheap_for_types.contains(&request_type) && requested_tier != Tier::Cheap {
            return PolicyOutcome::Proceed {
                forced_tier: Some(Tier::Cheap),
                should_compress,
            };
        }

        PolicyOutcome::Proceed {
            forced_tier: None,
            should_compress,
        }
    }

    /// Approve a pending ticket. Errors if the ticket is unknown or already
    /// terminal.
    pub fn approve(&self, ticket_id: Uuid) -> Result<ApprovalTicket> {
        let mut tickets = self.tickets.write();
        let ticket = tickets
            .get_mut(&ticket_id)
            .ok_or_else(|| Error::Validation(format!("no such approval ticket {ticket_id}")))?;
        if ticket.status != ApprovalStatus::Pending {
            return Err(Error::Validation(format!("ticket {ticket_id} is already terminal")));
        }
        ticket.status = ApprovalStatus::Approved;
        Ok(ticket.clone())
    }

    /// Reject a pending ticket. Errors if the ticket is unknown or already
    /// terminal.
    pub fn reject(&self, ticket_id: Uuid) -> Result<ApprovalTicket> {
        let mut tickets = self.tickets.write();
        let ticket = tickets
            .get_mut(&ticket_id)
            .ok_or_else(|| Error::Validation(format!("no such approval ticket {ticket_id}")))?;
        if ticket.status != ApprovalStatus::Pending {
            return Err(Error::Validation(format!("ticket {ticket_id} is already terminal")));
        }
        ticket.status = ApprovalStatus::Rejected;
        Ok(ticket.clone())
    }

    /// Record a completed request's usage, accumulating into the scope's
    /// rolling daily/monthly windows and appending to the usage log.
    pub fn record_usage(&self, scope: &PolicyScope, record: UsageRecord) {
        {
            let mut usage = self.usage.write();
            let entry = usage.entry(scope.key()).or_default();
            Self::reset_expired_windows(entry, record.timestamp);
            entry.budget.daily_cost_usd += record.cost_usd;
            entry.budget.monthly_cost_usd += record.cost_usd;
        }
        self.usage_log.write().push(record);
    }

    /// A human-readable summary of a scope's policy and current usage
    /// (supplemented feature, SPEC_FULL.md: dashboard/CLI `policy` command).
    #[must_use]
    pub fn policy_summary(&self, scope: &PolicyScope, policy: &Policy) -> PolicySummary {
        let state = self.budget_state(scope);
        let alert = self.budget_status(scope, policy);
        PolicySummary {
            scope_key: scope.key(),
            policy_id: policy.id.clone(),
            alert_level: alert,
            budget: state,
            daily_budget_usd: policy.daily_budget_usd,
            monthly_budget_usd: policy.monthly_budget_usd,
        }
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// A dashboard/CLI-facing snapshot of a scope's policy state (SPEC_FULL.md
/// supplemented feature).
#[derive(Debug, Clone)]
pub struct PolicySummary {
    /// The resolved scope key.
    pub scope_key: String,
    /// The policy id in effect.
    pub policy_id: String,
    /// Current alert level.
    pub alert_level: AlertLevel,
    /// Current budget consumption.
    pub budget: BudgetState,
    /// Configured daily budget.
    pub daily_budget_usd: f64,
    /// Configured monthly budget.
    pub monthly_budget_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage_record(scope: &PolicyScope, cost: f64) -> UsageRecord {
        UsageRecord {
            timestamp: Utc::now(),
            scope: scope.clone(),
            session_id: "s1".to_string(),
            model: "gpt-4o-mini".to_string(),
            prompt_tokens: 100,
            completion_tokens: 50,
            cost_usd: cost,
            cache_status: CacheStatus::None,
            compressed: false,
            original_prompt_tokens: None,
        }
    }

    #[test]
    fn get_policy_falls_back_to_default() {
        let engine = PolicyEngine::new();
        let p = engine.get_policy("acme", "alice");
        assert_eq!(p.id, "default");
    }

    #[test]
    fn set_policy_resolves_by_scope_priority() {
        let engine = PolicyEngine::new();
        let mut org_policy = Policy::default_policy();
        org_policy.id = "org-acme".to_string();
        engine.set_policy(&PolicyScope::Org { org: "acme".to_string() }, org_policy).unwrap();

        let resolved = engine.get_policy("acme", "alice");
        assert_eq!(resolved.id, "org-acme");

        let mut user_policy = Policy::default_policy();
        user_policy.id = "user-alice".to_string();
        engine
            .set_policy(
                &PolicyScope::User {
                    org: "acme".to_string(),
                    user: "alice".to_string(),
                },
                user_policy,
            )
            .unwrap();
        assert_eq!(engine.get_policy("acme", "alice").id, "user-alice");
        assert_eq!(engine.get_policy("acme", "bob").id, "org-acme");
    }

    #[test]
    fn evaluate_blocks_over_token_limit() {
        let engine = PolicyEngine::new();
        let scope = PolicyScope::Default;
        let mut policy = Policy::default_policy();
        policy.per_request_token_limit = 100;
        let outcome = engine.evaluate(&scope, &policy, "s1", Tier::Standard, RequestType::Simple, 500, 0.01, None);
        assert!(matches!(outcome, PolicyOutcome::BlockBudget { .. }));
    }

    #[test]
    fn evaluate_forces_cheap_for_configured_request_types() {
        let engine = PolicyEngine::new();
        let scope = PolicyScope::Default;
        let policy = Policy::default_policy();
        let outcome = engine.evaluate(&scope, &policy, "s1", Tier::Standard, RequestType::Simple, 50, 0.001, None);
        assert_eq!(
            outcome,
            PolicyOutcome::Proceed {
                forced_tier: Some(Tier::Cheap),
                should_compress: false
            }
        );
    }

    #[test]
    fn evaluate_requires_approval_for_expensive_when_configured() {
        let engine = PolicyEngine::new();
        let scope = PolicyScope::Default;
        let mut policy = Policy::default_policy();
        policy.require_approval_for_expensive = true;
        policy.force_cheap_for_types = vec![];
        let outcome = engine.evaluate(&scope, &policy, "s1", Tier::Expensive, RequestType::Complex, 500, 0.5, None);
        assert!(matches!(outcome, PolicyOutcome::RequireApproval { .. }));
    }

    #[test]
    fn evaluate_blocks_when_budget_exceeded() {
        let engine = PolicyEngine::new();
        let scope = PolicyScope::Default;
        let mut policy = Policy::default_policy();
        policy.force_cheap_for_types = vec![];
        engine.record_usage(&scope, usage_record(&scope, policy.daily_budget_usd + 1.0));
        let outcome = engine.evaluate(&scope, &policy, "s1", Tier::Standard, RequestType::Moderate, 50, 0.01, None);
        assert!(matches!(outcome, PolicyOutcome::BlockBudget { .. }));
    }

    #[test]
    fn evaluate_downgrades_when_cheaper_tier_fits_over_cost_limit() {
        let engine = PolicyEngine::new();
        let scope = PolicyScope::Default;
        let mut policy = Policy::default_policy();
        policy.force_cheap_for_types = vec![];
        policy.per_request_cost_limit_usd = 0.01;
        let outcome = engine.evaluate(&scope, &policy, "s1", Tier::Standard, RequestType::Moderate, 50, 0.5, Some(Tier::Cheap));
        assert_eq!(
            outcome,
            PolicyOutcome::Proceed {
                forced_tier: Some(Tier::Cheap),
                should_compress: false
            }
        );
    }

    #[test]
    fn evaluate_blocks_over_cost_limit_when_nothing_cheaper_fits() {
        let engine = PolicyEngine::new();
        let scope = PolicyScope::Default;
        let mut policy = Policy::default_policy();
        policy.force_cheap_for_types = vec![];
        policy.per_request_cost_limit_usd = 0.01;
        let outcome = engine.evaluate(&scope, &policy, "s1", Tier::Standard, RequestType::Moderate, 50, 0.5, None);
        assert!(matches!(outcome, PolicyOutcome::BlockBudget { .. }));
    }

    #[test]
    fn approve_then_reject_is_rejected() {
        let engine = PolicyEngine::new();
        let scope = PolicyScope::Default;
        let mut policy = Policy::default_policy();
        policy.require_approval_for_expensive = true;
        policy.force_cheap_for_types = vec![];
        let outcome = engine.evaluate(&scope, &policy, "s1", Tier::Expensive, RequestType::Complex, 500, 0.5, None);
        let PolicyOutcome::RequireApproval { ticket } = outcome else {
            panic!("expected RequireApproval");
        };
        engine.approve(ticket.id).unwrap();
        assert!(engine.reject(ticket.id).is_err());
    }

    #[test]
    fn budget_status_reports_warning_at_configured_percent() {
        let engine = PolicyEngine::new();
        let scope = PolicyScope::Default;
        let policy = Policy::default_policy();
        engine.record_usage(&scope, usage_record(&scope, policy.daily_budget_usd * 0.85));
        assert_eq!(engine.budget_status(&scope, &policy), AlertLevel::Warning);
    }

    #[test]
    fn record_usage_accumulates_across_calls() {
        let engine = PolicyEngine::new();
        let scope = PolicyScope::Default;
        engine.record_usage(&scope, usage_record(&scope, 1.0));
        engine.record_usage(&scope, usage_record(&scope, 2.0));
        let state = engine.budget_state(&scope);
        assert_eq!(state.daily_cost_usd, 3.0);
        assert_eq!(state.monthly_cost_usd, 3.0);
    }
}
