//! `@path` mentions in user input.

use regex::Regex;
use std::sync::OnceLock;

static MENTION: OnceLock<Regex> = OnceLock::new();

fn mention_regex() -> &'static Regex {
    MENTION.get_or_init(|| {
        Regex::new(r#"(?:^|\s)@(?:"([^"]+)"|(\S+))"#).expect("Invalid mention pattern")
    })
}

/// Paths referenced as `@path` or `@"path with spaces"`, in order of appearance.
pub fn extract_mentions(text: &str) -> Vec<String> {
    mention_regex()
        .captures_iter(text)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// The input with all mentions removed and whitespace tidied.
pub fn strip_mentions(text: &str) -> String {
    let stripped = mention_regex().replace_all(text, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
