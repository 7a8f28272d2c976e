//! A configurable mock of [`guard_core::capabilities::AttackGenerator`].

use std::sync::Arc;

use async_trait::async_trait;
use guard_core::capabilities::AttackGenerator;
use guard_core::error::{Error, Result};
use parking_lot::Mutex;

/// A mock attack generator that cycles through a fixed pool of strings
/// (repeating if `n` exceeds the pool size), recording every call it saw.
pub struct MockAttackGenerator {
    pool: Vec<String>,
    calls: Arc<Mutex<Vec<(usize, String, Vec<String>)>>>,
    should_fail: Arc<Mutex<bool>>,
}

impl MockAttackGenerator {
    /// Build a generator that draws from `pool`.
    #[must_use]
    pub fn new(pool: Vec<&str>) -> Self {
        MockAttackGenerator {
            pool: pool.into_iter().map(str::to_string).collect(),
            calls: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    /// Fail on the next call only.
    pub fn fail_next(&self) {
        *self.should_fail.lock() = true;
    }

    /// The `(n, strategy, prior_evasions)` arguments seen so far.
    #[must_use]
    pub fn calls(&self) -> Vec<(usize, String, Vec<String>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AttackGenerator for MockAttackGenerator {
    async fn generate_attacks(&self, n: usize, strategy: &str, prior_evasions: &[String]) -> Result<Vec<String>> {
        self.calls.lock().push((n, strategy.to_string(), prior_evasions.to_vec()));

        {
            let mut should_fail = self.should_fail.lock();
            if *should_fail {
                *should_fail = false;
                return Err(Error::ExternalUnavailable("mock attack generator failed".to_string()));
            }
        }

        if self.pool.is_empty() {
            return Ok(Vec::new());
        }
        Ok((0..n).map(|i| self.pool[i % self.pool.len()].clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cycles_through_pool() {
        let gen = MockAttackGenerator::new(vec!["a", "b"]);
        let attacks = gen.generate_attacks(5, "multi-language", &[]).await.unwrap();
        assert_eq!(attacks, vec!["a", "b", "a", "b", "a"]);
    }

    #[tokio::test]
    async fn records_call_arguments() {
        let gen = MockAttackGenerator::new(vec!["x"]);
        gen.generate_attacks(2, "encoding-cipher", &["prior".to_string()]).await.unwrap();
        let calls = gen.calls();
        assert_eq!(calls[0].1, "encoding-cipher");
        assert_eq!(calls[0].2, vec!["prior".to_string()]);
    }

    #[tokio::test]
    async fn fail_next_errors_once() {
        let gen = MockAttackGenerator::new(vec!["a"]);
        gen.fail_next();
        assert!(gen.generate_attacks(1, "s", &[]).await.is_err());
        assert!(gen.generate_attacks(1, "s", &[]).await.is_ok());
    }
}
