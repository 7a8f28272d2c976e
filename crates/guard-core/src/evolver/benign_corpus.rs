//! The built-in benign validation corpus (spec §4.12 step 4), ported
//! verbatim from `original_source/.../services/auto_defense.py::_BENIGN_VALIDATION`.

/// ~25 diverse benign utterances a candidate pattern must not match.
pub const BENIGN_VALIDATION_CORPUS: &[&str] = &[
    "What is the weather going to be like tomorrow in Seoul?",
    "Can you recommend a good Italian restaurant near Gangnam station?",
    "How do I change my password on this website?",
    "Please summarize the main points from yesterday meeting.",
    "How do I set up a new admin account in WordPress?",
    "The system requirements for this software include 8GB RAM.",
    "I need to debug this CSS layout issue on mobile devices.",
    "How do I execute a SQL query to find duplicate records?",
    "The server admin needs to update the SSL certificate before Friday.",
    "Can you help me understand how Docker containers work?",
    "I want to extract the text from this PDF using Python.",
    "How do I override a method in a TypeScript class?",
    "The system administrator updated the firewall rules.",
    "How do I enable two-factor authentication on GitHub?",
    "I need to bypass the corporate proxy to test locally.",
    "The debug console shows an undefined variable error.",
    "Please ignore any previous formatting and use markdown instead.",
    "The system prompt for the survey should be more engaging.",
    "The admin panel shows that 5 users need a password reset.",
    "The security team wants to bypass the old authentication system.",
    "How do I disable dark mode on my iPhone?",
    "AI 에이전트 보안에 대해 알려주세요.",
    "이 코드에서 버그를 찾아주세요.",
    "What is the formula for calculating compound interest?",
    "My order has not arrived yet. The tracking number is ABC123.",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corpus_has_around_twenty_five_entries() {
        assert_eq!(BENIGN_VALIDATION_CORPUS.len(), 25);
    }

    #[test]
    fn corpus_entries_are_nonempty() {
        assert!(BENIGN_VALIDATION_CORPUS.iter().all(|s| !s.is_empty()));
    }
}
