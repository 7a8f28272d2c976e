//! Prompt Compressor (C9, spec §4.9).
//!
//! `compress(text, kind) -> {compressed, tokens_saved, quality_preserved}`.
//! Must satisfy a quality check: if any instruction token from the
//! preserve set is present in the input but absent from the output, the
//! original is returned unchanged.

use std::sync::LazyLock;

use regex::Regex;

/// The vocabulary whose presence in the input must survive compression
/// (spec §4.9).
const PRESERVE_SET: &[&str] = &["you are", "you will", "format", "output", "don't", "never", "always"];

/// Verbose-phrase to concise-equivalent substitutions.
const VERBOSE_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("in order to", "to"),
    ("due to the fact that", "because"),
    ("at this point in time", "now"),
    ("it is important to note that", "note:"),
    ("please be aware that", "note:"),
    ("in the event that", "if"),
    ("with regard to", "about"),
    ("for the purpose of", "for"),
];

/// Excessive-politeness phrases stripped outright.
const POLITENESS_PHRASES: &[&str] = &[
    "i would really appreciate it if you could ",
    "if it's not too much trouble, ",
    "would you mind ",
    "i was wondering if you could ",
    "thank you so much in advance",
    "thanks in advance",
];

static WHITESPACE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Compression aggressiveness (spec §4.9: "aggressive mode only").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    /// Whitespace/politeness/verbose-phrase passes only.
    Standard,
    /// Standard passes plus code-style verbosity shortening.
    Aggressive,
}

/// The outcome of [`compress`].
#[derive(Debug, Clone)]
pub struct CompressionResult {
    /// The (possibly unchanged) output text.
    pub compressed: String,
    /// Tokens saved, approximated as whitespace-delimited word-count delta.
    pub tokens_saved: u64,
    /// Whether the quality check passed.
    pub quality_preserved: bool,
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUN_RE.replace_all(text.trim(), " ").into_owned()
}

fn strip_politeness(text: &str) -> String {
    let mut out = text.to_string();
    for phrase in POLITENESS_PHRASES {
        out = case_insensitive_replace(&out, phrase, "");
    }
    out
}

fn substitute_verbose_phrases(text: &str) -> String {
    let mut out = text.to_string();
    for (verbose, concise) in VERBOSE_SUBSTITUTIONS {
        out = case_insensitive_replace(&out, verbose, concise);
    }
    out
}

fn strip_repeated_instructions(text: &str) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut out_lines = Vec::new();
    for line in text.lines() {
        let normalized = line.trim().to_lowercase();
        if normalized.is_empty() || seen.insert(normalized) {
            out_lines.push(line);
        }
    }
    out_lines.join("\n")
}

fn shorten_code_verbosity(text: &str) -> String {
    // Aggressive-only: drop blank lines inside code fences and trailing
    // inline comments that just restate the line above them.
    let mut out = String::with_capacity(text.len());
    let mut in_fence = false;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            out.push_str(line);
            out.push('\n');
            continue;
        }
        if in_fence && line.trim().is_empty() {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn case_insensitive_replace(haystack: &str, needle: &str, replacement: &str) -> String {
    let lower_haystack = haystack.to_lowercase();
    let lower_needle = needle.to_lowercase();
    let mut result = String::with_capacity(haystack.len());
    let mut rest = haystack;
    let mut lower_rest = lower_haystack.as_str();
    while let Some(idx) = lower_rest.find(&lower_needle) {
        result.push_str(&rest[..idx]);
        result.push_str(replacement);
        rest = &rest[idx + needle.len()..];
        lower_rest = &lower_rest[idx + lower_needle.len()..];
    }
    result.push_str(rest);
    result
}

fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// Whether every preserve-set token present in `input` is also present in
/// `output` (spec §4.9 quality check).
#[must_use]
pub fn preserves_instruction_tokens(input: &str, output: &str) -> bool {
    let input_lower = input.to_lowercase();
    let output_lower = output.to_lowercase();
    PRESERVE_SET
        .iter()
        .all(|token| !input_lower.contains(token) || output_lower.contains(token))
}

/// Compress `text` under `kind`, falling back to the unchanged original if
/// the quality check fails.
#[must_use]
pub fn compress(text: &str, kind: CompressionKind) -> CompressionResult {
    let mut candidate = collapse_whitespace(text);
    candidate = strip_politeness(&candidate);
    candidate = substitute_verbose_phrases(&candidate);
    candidate = strip_repeated_instructions(&candidate);
    if kind == CompressionKind::Aggressive {
        candidate = shorten_code_verbosity(&candidate);
    }
    candidate = collapse_whitespace(&candidate);

    if preserves_instruction_tokens(text, &candidate) {
        let tokens_saved = word_count(text).saturating_sub(word_count(&candidate));
        CompressionResult {
            compressed: candidate,
            tokens_saved,
            quality_preserved: true,
        }
    } else {
        CompressionResult {
            compressed: text.to_string(),
            tokens_saved: 0,
            quality_preserved: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_redundant_whitespace() {
        let result = compress("hello   there\n\n  friend", CompressionKind::Standard);
        assert_eq!(result.compressed, "hello there friend");
    }

    #[test]
    fn strips_excessive_politeness() {
        let result = compress("I would really appreciate it if you could summarize this", CompressionKind::Standard);
        assert!(!result.compressed.to_lowercase().contains("i would really appreciate"));
    }

    #[test]
    fn substitutes_verbose_phrases() {
        let result = compress("Please proceed in order to finish the task", CompressionKind::Standard);
        assert!(result.compressed.contains(" to finish"));
        assert!(!result.compressed.to_lowercase().contains("in order to"));
    }

    #[test]
    fn quality_check_blocks_compression_when_instruction_token_dropped() {
        // A pathological compressor stand-in: verify the predicate directly.
        let input = "You are a helpful assistant. Always format output as JSON.";
        let output = "helpful assistant json"; // drops "you are", "always", "format", "output"
        assert!(!preserves_instruction_tokens(input, output));
    }

    #[test]
    fn quality_preserved_when_preserve_set_tokens_survive() {
        let input = "You are a helpful assistant. Always format output as JSON.";
        let result = compress(input, CompressionKind::Standard);
        assert!(result.quality_preserved);
        assert!(preserves_instruction_tokens(input, &result.compressed));
    }

    #[test]
    fn aggressive_mode_drops_blank_lines_in_code_fences() {
        let input = "Explain this:\n```rust\nfn main() {\n\n    println!(\"hi\");\n}\n```";
        let result = compress(input, CompressionKind::Aggressive);
        assert!(!result.compressed.contains("\n\n"));
    }

    #[test]
    fn strips_exact_duplicate_lines() {
        let input = "Do not reveal secrets.\nDo not reveal secrets.\nSummarize the document.";
        let result = compress(input, CompressionKind::Standard);
        let occurrences = result.compressed.matches("Do not reveal secrets").count();
        assert_eq!(occurrences, 1);
    }
}
