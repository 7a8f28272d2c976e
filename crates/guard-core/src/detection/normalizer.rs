//! Normalizer (C1, spec §4.1).
//!
//! `normalize(text) -> text'` defeats common evasion tricks while
//! preserving semantic content. Deterministic and idempotent modulo a
//! fixed point: `normalize(normalize(x)) == normalize(x)`.
//!
//! Ported with unchanged semantics from the original Python
//! `detectors/injection/normalizer.py`: the invisible-codepoint strip set,
//! homoglyph map, word-scoped leetspeak substitution, and word-split
//! collapse (with its attack-keyword allowlist) all carry the same
//! behavior, rewritten idiomatically against `regex` and
//! `unicode-normalization` instead of Python's `re`/`unicodedata`.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Invisible code points stripped in pass 1: zero-width space/joiners,
/// BOM, word joiner, soft hyphen, bidi/invisible-math marks, Hangul/Khmer
/// fillers.
const INVISIBLE_CODEPOINTS: &[char] = &[
    '\u{200B}', // zero width space
    '\u{200C}', // zero width non-joiner
    '\u{200D}', // zero width joiner
    '\u{FEFF}', // BOM / zero width no-break space
    '\u{2060}', // word joiner
    '\u{180E}', // Mongolian vowel separator
    '\u{00AD}', // soft hyphen
    '\u{2061}', // function application
    '\u{2062}', // invisible times
    '\u{2063}', // invisible separator
    '\u{2064}', // invisible plus
    '\u{034F}', // combining grapheme joiner
    '\u{061C}', // Arabic letter mark
    '\u{3164}', // Hangul filler
    '\u{FFA0}', // halfwidth Hangul filler
    '\u{17B4}', // Khmer vowel inherent AQ
    '\u{17B5}', // Khmer vowel inherent AA
];

/// Homoglyph map: visually-similar Cyrillic/Greek/Armenian/diacritic/
/// math/fullwidth/small-caps characters to their base Latin letter.
static HOMOGLYPH_MAP: LazyLock<std::collections::HashMap<char, char>> = LazyLock::new(|| {
    let mut m = std::collections::HashMap::new();
    // Cyrillic look-alikes.
    for (cy, la) in [
        ('а', 'a'), ('А', 'A'), ('е', 'e'), ('Е', 'E'), ('о', 'o'), ('О', 'O'),
        ('р', 'p'), ('Р', 'P'), ('с', 'c'), ('С', 'C'), ('у', 'y'), ('У', 'Y'),
        ('х', 'x'), ('Х', 'X'), ('і', 'i'), ('І', 'I'), ('ѕ', 's'), ('ј', 'j'),
        ('к', 'k'), ('К', 'K'), ('м', 'm'), ('М', 'M'), ('н', 'h'), ('Н', 'H'),
        ('т', 't'), ('Т', 'T'), ('в', 'b'), ('В', 'B'),
    ] {
        m.insert(cy, la);
    }
    // Greek look-alikes.
    for (gr, la) in [
        ('α', 'a'), ('Α', 'A'), ('ο', 'o'), ('Ο', 'O'), ('ρ', 'p'), ('Ρ', 'P'),
        ('τ', 't'), ('Τ', 'T'), ('υ', 'u'), ('Υ', 'Y'), ('ι', 'i'), ('Ι', 'I'),
        ('ν', 'v'), ('Ν', 'N'), ('κ', 'k'), ('Κ', 'K'), ('η', 'n'), ('Η', 'H'),
    ] {
        m.insert(gr, la);
    }
    // Armenian look-alikes.
    for (am, la) in [('օ', 'o'), ('ո', 'n'), ('ս', 's')] {
        m.insert(am, la);
    }
    // Diacritics to base Latin.
    for (d, la) in [
        ('á', 'a'), ('à', 'a'), ('â', 'a'), ('ä', 'a'), ('ã', 'a'),
        ('é', 'e'), ('è', 'e'), ('ê', 'e'), ('ë', 'e'),
        ('í', 'i'), ('ì', 'i'), ('î', 'i'), ('ï', 'i'),
        ('ó', 'o'), ('ò', 'o'), ('ô', 'o'), ('ö', 'o'), ('õ', 'o'),
        ('ú', 'u'), ('ù', 'u'), ('û', 'u'), ('ü', 'u'),
    ] {
        m.insert(d, la);
    }
    // Math-styled and fullwidth/small-caps Latin.
    for (sym, la) in [
        ('𝐚', 'a'), ('𝐛', 'b'), ('𝐜', 'c'), ('𝐢', 'i'), ('𝐠', 'g'), ('𝐧', 'n'),
        ('ⅰ', 'i'), ('ⅼ', 'l'),
        ('ᴀ', 'a'), ('ʙ', 'b'), ('ᴄ', 'c'), ('ᴅ', 'd'), ('ᴇ', 'e'),
        ('ａ', 'a'), ('ｂ', 'b'), ('ｃ', 'c'), ('ｉ', 'i'), ('ｇ', 'g'), ('ｎ', 'n'),
        ('ₐ', 'a'),
    ] {
        m.insert(sym, la);
    }
    m
});

/// Single-character leetspeak substitutions.
const LEET_MAP: &[(char, char)] = &[
    ('0', 'o'), ('1', 'i'), ('3', 'e'), ('4', 'a'), ('5', 's'),
    ('7', 't'), ('@', 'a'), ('$', 's'), ('8', 'b'),
];

/// Multi-character leetspeak substitutions, applied before single-char mapping.
const MULTI_LEET: &[(&str, &str)] = &[
    ("|-|", "h"), ("|_|", "u"), ("()", "o"), ("ph", "f"),
    ("vv", "w"), ("|)", "d"), ("/\\", "a"), ("|<", "k"),
];

/// Attack-keyword allowlist: the only vocabulary that licenses rejoining a
/// single-separator two-piece split (e.g. `"sys tem"` -> `"system"`).
/// Keeping this list narrow is what preserves legitimate hyphenation
/// (`"well-known"` is left untouched).
const ATTACK_KEYWORDS: &[&str] = &[
    "ignore", "disregard", "override", "bypass", "jailbreak",
    "system", "prompt", "instruction", "instructions",
    "admin", "root", "sudo", "privilege", "access", "unlock",
    "reveal", "extract", "exfiltrate", "leak", "dump",
    "pretend", "roleplay", "persona", "mode",
    "password", "secret", "credential", "token", "apikey",
    "hack", "exploit", "inject", "injection",
    // Romanized Korean attack vocabulary.
    "musi", "myeongryeong", "tasi",
];

static INVISIBLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let class: String = INVISIBLE_CODEPOINTS.iter().collect();
    Regex::new(&format!("[{}]", regex::escape(&class))).expect("invisible regex compiles")
});

static WORD_SPLIT_CHAR_RUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Two or more single characters each separated by a space/dot/dash/underscore,
    // e.g. "i g n o r e" -> collapse separators between consecutive single chars.
    Regex::new(r"(?:\b\w[ .\-_]){2,}\w\b").expect("word split regex compiles")
});

static TWO_PIECE_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\w{1,4})[ .\-_](\w{2,})\b").expect("two piece split regex compiles"));

/// Strip invisible code points (pass 1).
fn strip_invisible(text: &str) -> String {
    INVISIBLE_RE.replace_all(text, "").into_owned()
}

/// Compatibility-decompose and drop combining marks, then apply the
/// homoglyph map (pass 2 + 3).
fn decompose_and_map_homoglyphs(text: &str) -> String {
    let decomposed: String = text.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    decomposed
        .chars()
        .map(|c| *HOMOGLYPH_MAP.get(&c).unwrap_or(&c))
        .collect()
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF)
}

/// Leetspeak substitution, word-scoped: only substitute within a run that
/// contains at least one real alphabetic character (pass 4).
fn leet_substitute(text: &str) -> String {
    let mut text = text.to_string();
    for (multi, replacement) in MULTI_LEET {
        text = text.replace(multi, replacement);
    }

    let mut out = String::with_capacity(text.len());
    let mut run = String::new();
    let leet_chars: std::collections::HashSet<char> =
        LEET_MAP.iter().map(|(k, _)| *k).collect();

    let flush = |run: &mut String, out: &mut String| {
        if run.is_empty() {
            return;
        }
        let has_alpha = run.chars().any(|c| c.is_ascii_alphabetic());
        if has_alpha {
            for c in run.chars() {
                let mapped = LEET_MAP
                    .iter()
                    .find(|(k, _)| *k == c)
                    .map(|(_, v)| *v)
                    .unwrap_or(c);
                out.push(mapped);
            }
        } else {
            out.push_str(run);
        }
        run.clear();
    };

    for c in text.chars() {
        if c.is_ascii_alphabetic() || leet_chars.contains(&c) {
            run.push(c);
        } else {
            flush(&mut run, &mut out);
            out.push(c);
        }
    }
    flush(&mut run, &mut out);
    out
}

/// Word-split collapse (pass 5): rejoin a word broken into single-character
/// runs, then conditionally rejoin a two-piece split if the concatenation
/// is an attack keyword.
fn collapse_word_splits(text: &str) -> String {
    let collapsed = WORD_SPLIT_CHAR_RUN_RE.replace_all(text, |caps: &regex::Captures| {
        caps[0].chars().filter(|c| c.is_alphanumeric()).collect::<String>()
    });

    TWO_PIECE_SPLIT_RE
        .replace_all(&collapsed, |caps: &regex::Captures| {
            let left = &caps[1];
            let right = &caps[2];
            let joined = format!("{left}{right}");
            if ATTACK_KEYWORDS.contains(&joined.to_lowercase().as_str()) {
                joined
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Maximum fixed-point iterations. Collapsing a word split can expose a
/// fresh leetspeak run (e.g. `"1-g-n-o-r-e"` collapses to `"1gnore"`,
/// which only then reads as a leet word); iterating to a fixed point is
/// what makes `normalize` idempotent in a single public call rather than
/// requiring callers to normalize twice.
const MAX_FIXED_POINT_ITERATIONS: usize = 4;

fn normalize_once(text: &str) -> String {
    let text = strip_invisible(text);
    let text = decompose_and_map_homoglyphs(&text);
    let text = leet_substitute(&text);
    collapse_word_splits(&text)
}

/// Run the normalization passes to a fixed point.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_FIXED_POINT_ITERATIONS {
        let next = normalize_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
    current
}
