//! Escape normalization for model-supplied text
//!
//! Models sometimes emit a file body with literal two-character escapes
//! (`\n`, `\t`) instead of real control characters. `normalize_escapes`
//! decodes them best-effort. It is a heuristic and never fails: anything it
//! cannot decode comes back unchanged.

use std::borrow::Cow;

/// Decode literal escape sequences in `text`.
///
/// Decoding is attempted only when `text` contains a literal `\n` or `\t`
/// and no real newline. Recognized escapes are `\n \t \r \" \' \\`; any other
/// escape (or a trailing backslash) returns the raw text.
pub fn normalize_escapes(text: &str) -> Cow<'_, str> {
    if text.contains('\n') || !(text.contains("\\n") || text.contains("\\t")) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let decoded = match chars.next() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('"') => '"',
            Some('\'') => '\'',
            Some('\\') => '\\',
            _ => return Cow::Borrowed(text),
        };
        out.push(decoded);
    }
    Cow::Owned(out)
}
