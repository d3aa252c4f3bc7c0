//! Keyword normalization: split, trim, lowercase, dedupe.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Split raw input into normalized keywords.
///
/// Any run of commas and/or newlines is a single boundary. Fragments are
/// trimmed and lower-cased; empty fragments are dropped; duplicates keep
/// their first position.
pub fn normalize(raw: &str) -> Vec<String> {
    static SEP_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[,\r\n]+").expect("valid regex"));

    let mut seen = HashSet::new();
    let mut keywords = Vec::new();

    for fragment in SEP_RE.split(raw) {
        let token = fragment.trim().to_lowercase();
        if token.is_empty() {
            continue;
        }
        if seen.insert(token.clone()) {
            keywords.push(token);
        }
    }

    keywords
}
