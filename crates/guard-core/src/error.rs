//! Error taxonomy for the guard core.
//!
//! Block decisions (`block_security`, `block_budget`, `require_approval`)
//! are *not* represented here — they are [`crate::model::GuardAction`]
//! variants, ordinary return values rather than errors. This enum covers
//! only the failure modes a caller cannot route around.

use thiserror::Error;

/// Error type for guard-core operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed policy or pattern file at load time.
    #[error("configuration error: {0}")]
    Config(String),

    /// The graph store, embedder, or completion capability is down or
    /// timed out. Callers should treat this as "that layer contributed no
    /// evidence" rather than abort the request.
    #[error("external capability unavailable: {0}")]
    ExternalUnavailable(String),

    /// A specific regex failed to evaluate against a specific input.
    #[error("pattern {pattern_id} failed to evaluate: {reason}")]
    Pattern {
        /// The offending pattern's id.
        pattern_id: String,
        /// Why it failed (timeout, compile error surfaced late, etc).
        reason: String,
    },

    /// A dynamically generated pattern failed validation against the
    /// benign corpus or duplicated an existing id.
    #[error("pattern validation failed: {0}")]
    Validation(String),

    /// The external completion errored while a `get_or_build` was pending;
    /// propagated verbatim to every waiter.
    #[error("cache build failed: {0}")]
    CacheBuild(String),

    /// A `debug_assert`-class invariant violation (e.g. risk score out of
    /// `[0, 1]`). Logged at critical severity by the caller; callers
    /// handling this in `RuntimeGuard` must fail closed to
    /// `block_security`.
    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),

    /// Escape hatch for everything else.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type for guard-core operations.
pub type Result<T> = std::result::Result<T, Error>;
