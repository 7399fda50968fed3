//! Input normalization and cheap content heuristics applied before any text
//! leaves the process. These guard a paid upstream against degenerate payloads;
//! they are not a security boundary.

use std::collections::HashSet;

/// Longest whitespace-delimited token accepted.
pub const MAX_TOKEN_CHARS: usize = 100;

const MIN_REPEAT_BLOCK: usize = 10;
/// Copies that must follow the first occurrence of a block.
const MIN_EXTRA_REPEATS: usize = 5;

const DIVERSITY_MIN_CHARS: usize = 100;
const MIN_DIVERSITY_RATIO: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct ContentCheck {
    pub valid: bool,
    pub reason: Option<String>,
}

impl ContentCheck {
    fn pass() -> Self {
        ContentCheck {
            valid: true,
            reason: None,
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        ContentCheck {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Normalizes free text:
/// - drops C0 controls other than `\n`, `\t` and `\r`, plus DEL
/// - drops zero-width and bidi format characters
/// - every whitespace run, line breaks included, becomes one space
/// - leading and trailing whitespace is removed
///
/// The output never contains a newline, so it never holds three in a row.
/// Idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars().filter(|&c| !is_stripped(c)) {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }

        // Only flushed between two visible characters, which trims both ends.
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }

    out
}

fn is_stripped(c: char) -> bool {
    match c {
        '\n' | '\t' | '\r' => false,
        '\u{0}'..='\u{1F}' | '\u{7F}' => true,
        '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' => true,
        '\u{FEFF}' => true,
        _ => false,
    }
}

/// Heuristic content check. Rules, in the order they are reported:
/// 1. empty after trimming
/// 2. texts over 100 chars with fewer than 10% distinct non-space characters
/// 3. any token longer than `MAX_TOKEN_CHARS`
/// 4. a block of 10+ chars followed by 5+ copies of itself on one line
pub fn validate_content(text: &str) -> ContentCheck {
    if text.trim().is_empty() {
        return ContentCheck::fail("Text cannot be empty");
    }

    if lacks_diversity(text) {
        return ContentCheck::fail("Text lacks sufficient character diversity");
    }

    if text
        .split_whitespace()
        .any(|token| token.chars().count() > MAX_TOKEN_CHARS)
    {
        return ContentCheck::fail(format!(
            "Word exceeds maximum length of {MAX_TOKEN_CHARS} characters"
        ));
    }

    if has_excessive_repetition(text) {
        return ContentCheck::fail("Text contains excessive repetition");
    }

    ContentCheck::pass()
}

/// Rejects text longer than `max_chars` characters.
pub fn check_length(text: &str, max_chars: usize) -> ContentCheck {
    if text.chars().count() > max_chars {
        ContentCheck::fail(format!(
            "Text exceeds maximum length of {max_chars} characters"
        ))
    } else {
        ContentCheck::pass()
    }
}

fn lacks_diversity(text: &str) -> bool {
    let total = text.chars().count();
    if total <= DIVERSITY_MIN_CHARS {
        return false;
    }

    let distinct: HashSet<char> = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();

    (distinct.len() as f64 / total as f64) < MIN_DIVERSITY_RATIO
}

/// A block of length `p` repeated six times in a row is exactly a stretch of
/// `5p` positions where `c[j] == c[j + p]`, so each period needs one scan.
fn has_excessive_repetition(text: &str) -> bool {
    let copies = MIN_EXTRA_REPEATS + 1;

    for line in text.split(|c| matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')) {
        let chars: Vec<char> = line.chars().collect();
        let n = chars.len();

        for period in MIN_REPEAT_BLOCK..=n / copies {
            let needed = period * MIN_EXTRA_REPEATS;
            let mut run = 0usize;
            for j in 0..n - period {
                if chars[j] == chars[j + period] {
                    run += 1;
                    if run >= needed {
                        return true;
                    }
                } else {
                    run = 0;
                }
            }
        }
    }

    false
}
