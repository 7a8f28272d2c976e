//! A configurable mock of [`guard_core::capabilities::DefenseGenerator`].

use std::sync::Arc;

use async_trait::async_trait;
use guard_core::capabilities::{CandidatePattern, DefenseGenerator};
use guard_core::error::{Error, Result};
use parking_lot::Mutex;

/// A mock defense generator that returns a fixed set of candidate patterns
/// for every call, regardless of the evasions passed in.
pub struct MockDefenseGenerator {
    candidates: Vec<CandidatePattern>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    should_fail: Arc<Mutex<bool>>,
}

impl MockDefenseGenerator {
    /// Build a generator that always proposes `candidates`.
    #[must_use]
    pub fn new(candidates: Vec<CandidatePattern>) -> Self {
        MockDefenseGenerator {
            candidates,
            calls: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    /// Fail on the next call only.
    pub fn fail_next(&self) {
        *self.should_fail.lock() = true;
    }

    /// The evasion batches passed in so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl DefenseGenerator for MockDefenseGenerator {
    async fn generate_defenses(&self, evasions: &[String]) -> Result<Vec<CandidatePattern>> {
        self.calls.lock().push(evasions.to_vec());

        {
            let mut should_fail = self.should_fail.lock();
            if *should_fail {
                *should_fail = false;
                return Err(Error::ExternalUnavailable("mock defense generator failed".to_string()));
            }
        }

        Ok(self.candidates.clone())
    }
}
