//! Intent Classifier (C5, spec §4.5).
//!
//! `classify_intent(text) -> {intent, educational_score, attack_score,
//! confidence, reason}`. Ported with unchanged scoring constants and
//! combination rule from the original
//! `detectors/injection/intent_classifier.py`.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::RequestType;

/// The classified intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// A genuine question about the domain (e.g. "what is prompt injection?").
    Educational,
    /// An attempt to manipulate the model.
    Attack,
    /// Neither signal dominates.
    Ambiguous,
}

/// The outcome of [`classify_intent`].
#[derive(Debug, Clone)]
pub struct IntentResult {
    /// Classified intent.
    pub intent: Intent,
    /// Educational signal score in `[0, 1]`.
    pub educational_score: f64,
    /// Attack signal score in `[0, 1]`.
    pub attack_score: f64,
    /// Confidence in the classification, the absolute margin between scores.
    pub confidence: f64,
    /// Human-readable explanation of the dominant signals.
    pub reason: String,
}

impl IntentResult {
    /// Spec §4.5/§4.6: bypass detection entirely when intent is
    /// `educational` with confidence >= 0.7, OR when `ambiguous` with an
    /// educational-minus-attack margin >= 0.3.
    #[must_use]
    pub fn should_bypass(&self) -> bool {
        match self.intent {
            Intent::Educational => self.educational_score >= 0.7,
            Intent::Ambiguous => self.educational_score - self.attack_score >= 0.3,
            Intent::Attack => false,
        }
    }
}

static QUESTION_PATTERN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(what|how|why|explain|define|describe|tell me about)\b").unwrap()
});

const EDUCATIONAL_KEYWORDS: &[&str] = &[
    "definition", "example", "explain", "concept", "overview",
    "difference between", "history of", "how does", "learn about",
];

const EDUCATIONAL_TOPICS: &[&str] = &[
    "prompt injection", "jailbreak", "security", "cybersecurity",
    "machine learning", "llm", "ai safety", "red team", "red-teaming",
];

static SYSTEM_TARGET_QUESTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(what (is|are) your (system prompt|instructions|rules)|how (were|are) you (configured|instructed|programmed))").unwrap()
});

static ATTACK_PATTERN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(ignore|disregard|forget|override|reveal|show|print|output|pretend|act as|bypass)\b").unwrap()
});

const ATTACK_KEYWORDS: &[&str] = &[
    "ignore", "disregard", "override", "bypass", "jailbreak", "reveal",
    "system prompt", "instructions", "pretend", "roleplay", "extract",
];

static ACADEMIC_FRAMING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(for (my|a) (research|thesis|paper|class)|academic purposes|hypothetically)").unwrap()
});

const EXTRACTION_VOCAB: &[&str] = &["extract", "reveal", "disclose", "leak", "dump", "output the"];

static IMPERATIVE_OPENER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(do|show|give|tell|output|print|write)\b").unwrap()
});

fn educational_score(text: &str, lower: &str) -> f64 {
    let mut score = 0.0;
    if QUESTION_PATTERN_RE.is_match(text) {
        score += 0.35;
    }
    if text.trim_end().ends_with('?') {
        score += 0.15;
    }
    let keyword_hits = EDUCATIONAL_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
    score += (0.1 * keyword_hits as f64).min(0.3);
    if score > 0.2 {
        let topic_hits = EDUCATIONAL_TOPICS.iter().filter(|t| lower.contains(*t)).count();
        score += (0.1 * topic_hits as f64).min(0.2);
    }
    let attack_keyword_hits = ATTACK_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
    score -= 0.15 * attack_keyword_hits as f64;
    score.clamp(0.0, 1.0)
}

fn attack_score(text: &str, lower: &str) -> f64 {
    let mut score = 0.0;
    let system_targeting = SYSTEM_TARGET_QUESTION_RE.is_match(text);
    if ATTACK_PATTERN_RE.is_match(text) {
        score += 0.4;
    }
    if system_targeting {
        score += 0.5;
    }
    let academic_framing = ACADEMIC_FRAMING_RE.is_match(text);
    let extraction_hits = EXTRACTION_VOCAB.iter().any(|k| lower.contains(*k));
    if academic_framing && extraction_hits {
        score += 0.35;
    }
    let keyword_hits = ATTACK_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
    score += (0.15 * keyword_hits as f64).min(0.4);
    if IMPERATIVE_OPENER_RE.is_match(text) {
        score += 0.2;
    }
    if text.trim_end().ends_with('?') && !system_targeting {
        score -= 0.15;
    }
    if QUESTION_PATTERN_RE.is_match(text) && !system_targeting {
        score -= 0.2;
    }
    score.clamp(0.0, 1.0)
}

/// Classify the intent of `text` (spec §4.5).
#[must_use]
pub fn classify_intent(text: &str) -> IntentResult {
    let lower = text.to_lowercase();
    let educational = educational_score(text, &lower);
    let attack = attack_score(text, &lower);

    let intent = if educational >= 0.7 && educational - attack >= 0.2 {
        Intent::Educational
    } else if attack > educational + 0.1 {
        Intent::Attack
    } else {
        Intent::Ambiguous
    };

    let reason = match intent {
        Intent::Educational => format!("educational_score={educational:.2} dominates attack_score={attack:.2}"),
        Intent::Attack => format!("attack_score={attack:.2} dominates educational_score={educational:.2}"),
        Intent::Ambiguous => format!("educational_score={educational:.2} and attack_score={attack:.2} are close"),
    };

    IntentResult {
        intent,
        educational_score: educational,
        attack_score: attack,
        confidence: (educational - attack).abs(),
        reason,
    }
}

/// Classify the request-complexity type of a message, used by C8/C10's
/// `force_cheap_for_types` (spec glossary, §4.8).
#[must_use]
pub fn classify_request_type(estimated_tokens: u64, simple_ceiling: u64, moderate_ceiling: u64) -> RequestType {
    if estimated_tokens < simple_ceiling {
        RequestType::Simple
    } else if estimated_tokens < moderate_ceiling {
        RequestType::Moderate
    } else {
        RequestType::Complex
    }
}
