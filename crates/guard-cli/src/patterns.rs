//! The CLI's bundled default pattern set.
//!
//! `guard-core` has no opinion on what patterns exist (spec §6: patterns
//! are data, supplied by the caller). This is the seed catalog the CLI
//! ships so `scan`/`status`/`evolve` have something to run against out of
//! the box; a real deployment typically supplies its own, larger catalog
//! via [`guard_core::store::PatternStore::with_persistence`].

use guard_core::model::{Category, Pattern, Severity};

/// The CLI's built-in pattern catalog, prefixed `CORE-`.
#[must_use]
pub fn builtin_patterns() -> Vec<Pattern> {
    vec![
        Pattern {
            id: "CORE-001".to_string(),
            category: Category::InstructionOverride,
            regexes: vec![
                r"ignore (all|any) (previous|prior|above) instructions".to_string(),
                r"disregard (all|any) (previous|prior|above) (rules|instructions)".to_string(),
            ],
            severity: Severity::Critical,
            base_confidence: 0.95,
            description: "explicit instruction override".to_string(),
            case_insensitive: true,
        },
        Pattern {
            id: "CORE-002".to_string(),
            category: Category::RoleManipulation,
            regexes: vec![
                r"you are now (DAN|in developer mode|unrestricted)".to_string(),
                r"act as an? (unrestricted|jailbroken|uncensored) AI".to_string(),
            ],
            severity: Severity::Critical,
            base_confidence: 0.92,
            description: "role hijack / persona jailbreak".to_string(),
            case_insensitive: true,
        },
        Pattern {
            id: "CORE-003".to_string(),
            category: Category::SystemExtraction,
            regexes: vec![
                r"(repeat|print|reveal|show) (your|the) (system prompt|instructions above)".to_string(),
            ],
            severity: Severity::High,
            base_confidence: 0.85,
            description: "system prompt extraction attempt".to_string(),
            case_insensitive: true,
        },
        Pattern {
            id: "CORE-004".to_string(),
            category: Category::Jailbreak,
            regexes: vec![r"hypothetically, if you had no (restrictions|guidelines|rules)".to_string()],
            severity: Severity::High,
            base_confidence: 0.80,
            description: "hypothetical-framing jailbreak".to_string(),
            case_insensitive: true,
        },
        Pattern {
            id: "CORE-005".to_string(),
            category: Category::EncodingBypass,
            regexes: vec![r"[A-Za-z0-9+/]{40,}={0,2}".to_string()],
            severity: Severity::Medium,
            base_confidence: 0.55,
            description: "long base64-looking payload".to_string(),
            case_insensitive: false,
        },
        Pattern {
            id: "CORE-006".to_string(),
            category: Category::DataExtraction,
            regexes: vec![r"list (all|every) (api key|password|secret|credential)s?".to_string()],
            severity: Severity::Critical,
            base_confidence: 0.90,
            description: "bulk credential exfiltration request".to_string(),
            case_insensitive: true,
        },
        Pattern {
            id: "CORE-007".to_string(),
            category: Category::PrivilegeEscalation,
            regexes: vec![r"grant (me|yourself) (admin|root|sudo) (access|privileges)".to_string()],
            severity: Severity::High,
            base_confidence: 0.85,
            description: "privilege escalation request".to_string(),
            case_insensitive: true,
        },
        Pattern {
            id: "CORE-008".to_string(),
            category: Category::ToolPoisoning,
            regexes: vec![r"when (this|the) tool (is called|runs), (also|secretly)".to_string()],
            severity: Severity::High,
            base_confidence: 0.82,
            description: "tool-description poisoning".to_string(),
            case_insensitive: true,
        },
    ]
}
