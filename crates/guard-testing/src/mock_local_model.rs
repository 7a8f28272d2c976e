//! A configurable mock of [`guard_core::capabilities::LocalModel`].

use guard_core::capabilities::LocalModel;

/// A mock classifier returning a fixed `(p_benign, p_attack)` regardless of
/// input, or one driven by a keyword list for slightly more realistic tests.
pub struct MockLocalModel {
    attack_keywords: Vec<String>,
    attack_proba: f64,
    benign_proba: f64,
}

impl MockLocalModel {
    /// A model that always predicts benign.
    #[must_use]
    pub fn always_benign() -> Self {
        MockLocalModel {
            attack_keywords: Vec::new(),
            attack_proba: 0.05,
            benign_proba: 0.95,
        }
    }

    /// A model that flags `p_attack = attack_proba` whenever the input
    /// contains any of `keywords` (case-insensitive), else predicts benign.
    #[must_use]
    pub fn flagging_keywords(keywords: Vec<&str>, attack_proba: f64) -> Self {
        MockLocalModel {
            attack_keywords: keywords.into_iter().map(str::to_lowercase).collect(),
            attack_proba,
            benign_proba: 0.95,
        }
    }
}

impl LocalModel for MockLocalModel {
    fn embed(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let matched = self.attack_keywords.iter().any(|k| lower.contains(k.as_str()));
        vec![if matched { 1.0 } else { 0.0 }]
    }

    fn predict_proba(&self, embedding: &[f32]) -> (f64, f64) {
        if embedding.first().copied().unwrap_or(0.0) >= 1.0 {
            (1.0 - self.attack_proba, self.attack_proba)
        } else {
            (self.benign_proba, 1.0 - self.benign_proba)
        }
    }
}

impl MockLocalModel {
    /// Test convenience: classify `text` through the full `embed` +
    /// `predict_proba` seam, returning `(p_benign, p_attack)`.
    #[must_use]
    pub fn classify(&self, text: &str) -> (f64, f64) {
        let embedding = self.embed(text);
        self.predict_proba(&embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_benign_predicts_low_attack_probability() {
        let model = MockLocalModel::always_benign();
        let (p_benign, p_attack) = model.classify("anything at all");
        assert!(p_benign > p_attack);
    }

    #[test]
    fn flags_configured_keywords() {
        let model = MockLocalModel::flagging_keywords(vec!["jailbreak"], 0.9);
        let (_, p_attack) = model.classify("this is a jailbreak attempt");
        assert_eq!(p_attack, 0.9);
        let (p_benign, _) = model.classify("totally normal question");
        assert!(p_benign > 0.5);
    }
}
