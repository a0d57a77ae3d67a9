// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Glob patterns as understood by shared-store key scans.
//!
//! The dialect is the one Redis uses for `SCAN MATCH`: `*` matches any run of
//! characters, `?` matches one character, `[abc]`, `[a-z]` and `[^a]` match
//! character classes, and a backslash makes the next character literal.

const SPECIAL: [char; 6] = ['*', '?', '[', ']', '^', '\\'];

/// Escapes every glob metacharacter in `literal`.
///
/// The result matches exactly `literal` when used as a pattern, which lets a
/// caller-supplied prefix be turned into a `prefix*` pattern safely.
///
/// # Examples
///
/// ```
/// use strata_tier::{escape_glob, glob_matches};
///
/// let pattern = format!("{}*", escape_glob("rag[1]:"));
/// assert!(glob_matches(&pattern, "rag[1]:doc"));
/// assert!(!glob_matches(&pattern, "rag1:doc"));
/// ```
#[must_use]
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Returns `true` if `text` matches the glob `pattern`.
#[must_use]
pub fn glob_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    matches_from(&pattern, &text)
}

fn matches_from(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen and the text position it is currently absorbing up to.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match step(pattern, p, text[t]) {
            Step::Star => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Step::Advance(next) => {
                p = next;
                t += 1;
                continue;
            }
            Step::Mismatch => {}
        }

        match backtrack {
            Some((star, absorbed)) => {
                p = star + 1;
                t = absorbed + 1;
                backtrack = Some((star, t));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

enum Step {
    Star,
    Advance(usize),
    Mismatch,
}

fn step(pattern: &[char], p: usize, c: char) -> Step {
    let Some(&head) = pattern.get(p) else {
        return Step::Mismatch;
    };

    match head {
        '*' => Step::Star,
        '?' => Step::Advance(p + 1),
        '[' => match class(pattern, p + 1, c) {
            Some((true, next)) => Step::Advance(next),
            Some((false, _)) => Step::Mismatch,
            // An unterminated class is treated as a literal `[`.
            None if c == '[' => Step::Advance(p + 1),
            None => Step::Mismatch,
        },
        '\\' => match pattern.get(p + 1) {
            Some(&escaped) if escaped == c => Step::Advance(p + 2),
            Some(_) => Step::Mismatch,
            None if c == '\\' => Step::Advance(p + 1),
            None => Step::Mismatch,
        },
        literal if literal == c => Step::Advance(p + 1),
        _ => Step::Mismatch,
    }
}

/// Matches `c` against the class starting at `start` (just past `[`).
///
/// Returns whether it matched and the pattern position after the closing `]`,
/// or `None` if the class is never closed.
fn class(pattern: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start;
    let negated = pattern.get(i) == Some(&'^');
    if negated {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    loop {
        let current = *pattern.get(i)?;
        if current == ']' && !first {
            return Some((matched != negated, i + 1));
        }
        first = false;

        let low = if current == '\\' {
            i += 1;
            *pattern.get(i)?
        } else {
            current
        };

        if pattern.get(i + 1) == Some(&'-') && pattern.get(i + 2).is_some_and(|&end| end != ']') {
            let mut high = pattern[i + 2];
            i += 2;
            if high == '\\' {
                i += 1;
                high = *pattern.get(i)?;
            }
            let (low, high) = if low <= high { (low, high) } else { (high, low) };
            matched |= (low..=high).contains(&c);
        } else {
            matched |= low == c;
        }
        i += 1;
    }
}
