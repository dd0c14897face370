//! Whitespace normalization and length bounding.
//!
//! All lengths are counted in `char`s so truncation never splits a code point.

use std::sync::LazyLock;

use regex::Regex;

/// Marker appended by [`truncate_with_ellipsis`].
const ELLIPSIS: &str = "...";

/// Collapse every whitespace run to a single space and trim the ends.
///
/// Idempotent: `normalize_whitespace(normalize_whitespace(s)) == normalize_whitespace(s)`.
pub fn normalize_whitespace(text: &str) -> String {
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    WS_RE.replace_all(text, " ").trim().to_string()
}

/// Keep at most `max` characters of `text`, appending `...` when anything was cut.
///
/// The result is never longer than `max + 3` characters.
pub fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &text[..cut]),
        None => text.to_string(),
    }
}

/// Keep at most `max` characters of `text`, with no marker.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}
