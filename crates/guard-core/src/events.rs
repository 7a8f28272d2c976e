//! The pub/sub event taxonomy (spec §6): `{threat_blocked, budget_warning,
//! budget_exceeded, model_downgraded, cache_hit, self_heal, metrics_update,
//! anomaly_detected}`. Delivery is best-effort at-most-once per subscriber,
//! implemented with a `tokio::sync::broadcast` channel — a lagging
//! subscriber drops the oldest events rather than blocking publishers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{AlertLevel, PolicyScope, Threat};

/// A structured event published by the guard runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A request was blocked for security reasons.
    ThreatBlocked {
        /// The scope the request belonged to.
        scope: PolicyScope,
        /// The threats that triggered the block.
        threats: Vec<Threat>,
        /// The aggregate risk score.
        risk_score: f64,
    },
    /// A scope crossed its alert threshold but is not yet blocked.
    BudgetWarning {
        /// The affected scope.
        scope: PolicyScope,
        /// The current alert level.
        level: AlertLevel,
        /// Percentage of budget consumed.
        percent_consumed: f64,
    },
    /// A scope's budget is fully exhausted.
    BudgetExceeded {
        /// The affected scope.
        scope: PolicyScope,
        /// Which budget was exceeded (`"daily"` or `"monthly"`).
        window: String,
    },
    /// The router downgraded the model tier for a request.
    ModelDowngraded {
        /// The originally preferred model.
        original_model: String,
        /// The model actually selected.
        selected_model: String,
        /// Why the downgrade occurred.
        reason: String,
    },
    /// A request was served from the response cache.
    CacheHit {
        /// Tokens saved by serving from cache.
        tokens_saved: u64,
    },
    /// Advisory-only signal that a supervisor might want to restart a
    /// guard instance (spec §9 open question: auto-heal is advisory, not a
    /// core decision).
    SelfHeal {
        /// Why self-heal was signaled.
        reason: String,
    },
    /// A periodic metrics snapshot.
    MetricsUpdate {
        /// Current pattern-store version.
        pattern_store_version: u64,
        /// Current cache entry count.
        cache_entries: u64,
    },
    /// The evolver or detection pipeline observed an anomalous pattern of
    /// requests (e.g. a spike in a single attack category).
    AnomalyDetected {
        /// Human-readable description.
        description: String,
    },
}

/// A lightweight best-effort pub/sub bus. Subscribers that fall behind the
/// buffer size miss the oldest events rather than stalling publishers.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus with the given broadcast buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        EventBus { sender }
    }

    /// Subscribe to future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of subscribers it was
    /// delivered to; an error here only means there were zero subscribers,
    /// which is not a failure for a best-effort bus.
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
