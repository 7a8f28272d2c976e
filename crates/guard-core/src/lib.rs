//! Core detection, caching, routing, policy, and self-improvement engine
//! for the guard runtime.
//!
//! This crate has no knowledge of any specific LLM provider, vector store,
//! or transport. It depends only on the capability traits in
//! [`capabilities`]; a concrete deployment wires real implementations of
//! those traits (see `guard-cli` and `guard-testing`) into a
//! [`guard::RuntimeGuard`].

pub mod cache;
pub mod capabilities;
pub mod compressor;
pub mod config;
pub mod detection;
pub mod error;
pub mod events;
pub mod evolver;
pub mod guard;
pub mod model;
pub mod policy;
pub mod router;
pub mod store;

pub use error::{Error, Result};
pub use guard::{GuardStatus, PendingRequest, RequestContext, RuntimeGuard};
