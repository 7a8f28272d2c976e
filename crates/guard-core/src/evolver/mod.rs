//! Adversarial Evolver (C12, spec §4.12).
//!
//! `run_round(strategy) -> RoundReport` and `run_continuous(params)`, the
//! generate -> test -> analyze -> validate -> deploy -> bank loop ported
//! from `original_source/.../services/{continuous_learning,auto_defense}.py`.

pub mod benign_corpus;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::capabilities::{AttackGenerator, CandidatePattern, DefenseGenerator};
use crate::detection::DetectionAggregator;
use crate::model::Pattern;
use crate::store::PatternStore;

/// Round-robin attack strategies (spec §4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Non-English-language framing.
    MultiLanguage,
    /// Ciphers and encodings (ROT13, base64, reversed text, homoglyphs).
    EncodingCipher,
    /// Fake authority, urgency, emotional manipulation.
    SocialEngineering,
    /// Payloads embedded in code, markdown, or HTML.
    CodeInjection,
    /// Whatever else evaded the most recent round.
    AdvancedEvasion,
}

impl Strategy {
    const ROTATION: [Strategy; 5] = [
        Strategy::MultiLanguage,
        Strategy::EncodingCipher,
        Strategy::SocialEngineering,
        Strategy::CodeInjection,
        Strategy::AdvancedEvasion,
    ];

    /// The stable string identifier passed to [`AttackGenerator`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::MultiLanguage => "multi-language",
            Strategy::EncodingCipher => "encoding-cipher",
            Strategy::SocialEngineering => "social-engineering",
            Strategy::CodeInjection => "code-injection",
            Strategy::AdvancedEvasion => "advanced-evasion",
        }
    }
}

/// Max size of the few-shot example bank (spec §4.12 step 6).
const FEW_SHOT_BANK_CAP: usize = 50;
/// Dynamic pattern ids start here (spec §4.12 step 4).
const DYNAMIC_ID_START: u64 = 1000;

/// A labeled example banked for the optional LLM classifier (spec §4.12 step 6).
#[derive(Debug, Clone)]
pub struct FewShotExample {
    /// The evasion text.
    pub input: String,
    /// Always `"injection"` — the bank only records confirmed evasions.
    pub label: String,
}

/// Report from a single evolver round (spec §4.12).
#[derive(Debug, Clone, Default)]
pub struct RoundReport {
    /// The strategy this round used.
    pub strategy: Option<&'static str>,
    /// How many attacks the generator produced.
    pub attacks_generated: usize,
    /// How many attacks evaded C6.
    pub attacks_evaded: usize,
    /// How many candidate patterns the defense generator proposed.
    pub patterns_proposed: usize,
    /// How many candidates passed validation.
    pub patterns_validated: usize,
    /// How many validated patterns were actually deployed (equals
    /// `patterns_validated` unless the deploy step itself failed).
    pub patterns_deployed: usize,
    /// How many few-shot examples were banked this round.
    pub examples_added: usize,
}

/// The adversarial evolver.
pub struct Evolver {
    attack_generator: Arc<dyn AttackGenerator>,
    defense_generator: Arc<dyn DefenseGenerator>,
    detector: Arc<DetectionAggregator>,
    pattern_store: Arc<PatternStore>,
    few_shot_bank: RwLock<VecDeque<FewShotExample>>,
    evasion_history: RwLock<Vec<String>>,
    strategy_cursor: AtomicUsize,
}

impl Evolver {
    /// Construct an evolver over its generator capabilities and the live
    /// detection pipeline/pattern store it is meant to improve.
    #[must_use]
    pub fn new(
        attack_generator: Arc<dyn AttackGenerator>,
        defense_generator: Arc<dyn DefenseGenerator>,
        detector: Arc<DetectionAggregator>,
        pattern_store: Arc<PatternStore>,
    ) -> Self {
        Evolver {
            attack_generator,
            defense_generator,
            detector,
            pattern_store,
            few_shot_bank: RwLock::new(VecDeque::new()),
            evasion_history: RwLock::new(Vec::new()),
            strategy_cursor: AtomicUsize::new(0),
        }
    }

    /// The current contents of the few-shot bank, oldest first.
    #[must_use]
    pub fn few_shot_examples(&self) -> Vec<FewShotExample> {
        self.few_shot_bank.read().iter().cloned().collect()
    }

    fn next_strategy(&self) -> Strategy {
        let idx = self.strategy_cursor.fetch_add(1, Ordering::Relaxed) % Strategy::ROTATION.len();
        Strategy::ROTATION[idx]
    }

    /// Run one generate -> test -> analyze -> validate -> deploy -> bank
    /// round (spec §4.12). A failed generation step produces an empty
    /// report rather than propagating an error (spec §4.12 "failure
    /// handling").
    pub async fn run_round(&self, n: usize) -> RoundReport {
        let strategy = self.next_strategy();
        let prior_evasions: Vec<String> = self.evasion_history.read().iter().rev().take(5).cloned().collect();

        let attacks = match self.attack_generator.generate_attacks(n, strategy.as_str(), &prior_evasions).await {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(error = %e, strategy = strategy.as_str(), "attack generation failed, skipping round");
                return RoundReport {
                    strategy: Some(strategy.as_str()),
                    ..Default::default()
                };
            }
        };

        let mut evaded = Vec::new();
        for attack in &attacks {
            let result = self.detector.detect(attack).await;
            let detected = !result.is_safe() && !result.bypass;
            if !detected {
                evaded.push(attack.clone());
            }
        }

        let mut report = RoundReport {
            strategy: Some(strategy.as_str()),
            attacks_generated: attacks.len(),
            attacks_evaded: evaded.len(),
            ..Default::default()
        };

        if evaded.is_empty() {
            return report;
        }

        self.evasion_history.write().extend(evaded.iter().cloned());

        let candidates = match self.defense_generator.generate_defenses(&evaded).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "defense generation failed, banking examples without new patterns");
                self.bank_examples(&evaded, &mut report);
                return report;
            }
        };
        report.patterns_proposed = candidates.len();

        let validated = self.validate_candidates(candidates);
        report.patterns_validated = validated.len();

        if !validated.is_empty() {
            match self.pattern_store.deploy_batch(validated.clone()) {
                Ok(()) => report.patterns_deployed = validated.len(),
                Err(e) => tracing::warn!(error = %e, "pattern deploy failed, round produced no deployed patterns"),
            }
        }

        self.bank_examples(&evaded, &mut report);
        report
    }

    fn bank_examples(&self, evasions: &[String], report: &mut RoundReport) {
        let mut bank = self.few_shot_bank.write();
        for text in evasions {
            if bank.len() >= FEW_SHOT_BANK_CAP {
                bank.pop_front();
            }
            bank.push_back(FewShotExample {
                input: text.clone(),
                label: "injection".to_string(),
            });
            report.examples_added += 1;
        }
    }

    /// Validate candidate patterns against the benign corpus and existing
    /// ids (spec §4.12 step 4), assigning fresh `DYN-{n}` ids to survivors.
    fn validate_candidates(&self, candidates: Vec<CandidatePattern>) -> Vec<Pattern> {
        let mut assigned_ids = std::collections::HashSet::new();
        let mut next_id = self.first_free_dynamic_id();
        let mut validated = Vec::new();

        for candidate in candidates {
            let regex = match regex::RegexBuilder::new(&candidate.regex).case_insensitive(true).build() {
                Ok(r) => r,
                Err(e) => {
                    tracing::info!(regex = %candidate.regex, error = %e, "dropping candidate pattern: does not compile");
                    continue;
                }
            };

            if benign_corpus::BENIGN_VALIDATION_CORPUS.iter().any(|benign| regex.is_match(benign)) {
                tracing::info!(regex = %candidate.regex, "dropping candidate pattern: matches benign corpus");
                continue;
            }

            let id = loop {
                let candidate_id = format!("DYN-{next_id}");
                next_id += 1;
                if !self.pattern_store.contains_id(&candidate_id) && !assigned_ids.contains(&candidate_id) {
                    break candidate_id;
                }
            };
            assigned_ids.insert(id.clone());

            validated.push(Pattern {
                id,
                category: candidate.category,
                regexes: vec![candidate.regex],
                severity: candidate.severity,
                base_confidence: candidate.confidence_base,
                description: candidate.description,
                case_insensitive: true,
            });
        }

        validated
    }

    fn first_free_dynamic_id(&self) -> u64 {
        self.pattern_store
            .next_dynamic_id()
            .strip_prefix("DYN-")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DYNAMIC_ID_START)
    }

    /// Parameters for [`Evolver::run_continuous`].
    pub async fn run_continuous(&self, attacks_per_round: usize, interval: Duration, max_rounds: Option<usize>, cancel: Arc<tokio::sync::Notify>) -> Vec<RoundReport> {
        let mut reports = Vec::new();
        let mut rounds_run = 0usize;
        loop {
            if let Some(max) = max_rounds {
                if rounds_run >= max {
                    break;
                }
            }
            reports.push(self.run_round(attacks_per_round).await);
            rounds_run += 1;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.notified() => break,
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::classifier::LocalClassifier;
    use crate::error::Result;
    use crate::model::{Category, Severity};
    use async_trait::async_trait;

    struct FixedAttackGenerator {
        attacks: Vec<String>,
    }

    #[async_trait]
    impl AttackGenerator for FixedAttackGenerator {
        async fn generate_attacks(&self, n: usize, _strategy: &str, _prior_evasions: &[String]) -> Result<Vec<String>> {
            Ok(self.attacks.iter().take(n).cloned().collect())
        }
    }

    struct FixedDefenseGenerator {
        candidates: Vec<CandidatePattern>,
    }

    #[async_trait]
    impl DefenseGenerator for FixedDefenseGenerator {
        async fn generate_defenses(&self, _evasions: &[String]) -> Result<Vec<CandidatePattern>> {
            Ok(self.candidates.clone())
        }
    }

    fn test_evolver(attacks: Vec<String>, candidates: Vec<CandidatePattern>) -> Evolver {
        let pattern_store = Arc::new(PatternStore::new(vec![]));
        let detector = Arc::new(DetectionAggregator::new(
            pattern_store.clone(),
            None,
            LocalClassifier::disabled(),
            std::time::Duration::from_millis(10),
            false,
        ));
        Evolver::new(
            Arc::new(FixedAttackGenerator { attacks }),
            Arc::new(FixedDefenseGenerator { candidates }),
            detector,
            pattern_store,
        )
    }

    #[tokio::test]
    async fn round_with_no_evasions_deploys_nothing() {
        // Empty attack generator means nothing evades (nothing is generated).
        let evolver = test_evolver(vec![], vec![]);
        let report = evolver.run_round(5).await;
        assert_eq!(report.attacks_generated, 0);
        assert_eq!(report.patterns_deployed, 0);
    }

    #[tokio::test]
    async fn evaded_attack_with_valid_candidate_gets_deployed() {
        let evolver = test_evolver(
            vec!["totally benign looking evasion text".to_string()],
            vec![CandidatePattern {
                regex: r"totally benign looking evasion".to_string(),
                category: Category::Jailbreak,
                severity: Severity::High,
                confidence_base: 0.8,
                description: "evasion technique".to_string(),
            }],
        );
        let report = evolver.run_round(1).await;
        assert_eq!(report.attacks_evaded, 1);
        assert_eq!(report.patterns_validated, 1);
        assert_eq!(report.patterns_deployed, 1);
        assert_eq!(report.examples_added, 1);
        assert!(evolver.pattern_store.contains_id("DYN-1000"));
    }

    #[tokio::test]
    async fn candidate_matching_benign_corpus_is_rejected() {
        let evolver = test_evolver(
            vec!["some evasive attack".to_string()],
            vec![CandidatePattern {
                regex: r"password".to_string(), // matches a benign corpus entry
                category: Category::Jailbreak,
                severity: Severity::High,
                confidence_base: 0.8,
                description: "overly broad".to_string(),
            }],
        );
        let report = evolver.run_round(1).await;
        assert_eq!(report.patterns_proposed, 1);
        assert_eq!(report.patterns_validated, 0);
        assert_eq!(report.patterns_deployed, 0);
    }

    #[tokio::test]
    async fn few_shot_bank_caps_at_fifty() {
        let attacks: Vec<String> = (0..60).map(|i| format!("evasive unique attack number {i} zzz")).collect();
        let evolver = test_evolver(attacks, vec![]);
        evolver.run_round(60).await;
        assert_eq!(evolver.few_shot_examples().len(), FEW_SHOT_BANK_CAP);
    }

    #[tokio::test]
    async fn strategy_rotates_round_robin() {
        let evolver = test_evolver(vec![], vec![]);
        let first = evolver.run_round(0).await.strategy;
        let second = evolver.run_round(0).await.strategy;
        assert_ne!(first, second);
    }
}
