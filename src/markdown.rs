//! Markdown → speakable plain text.
//!
//! The speech backend reads text aloud; markdown markers would be
//! pronounced. This strips the common ones and turns line breaks into
//! short spoken pauses (`" . "`). Rules run in order; code blocks are
//! collapsed to a space since reading code aloud is useless.

use regex::Regex;
use std::sync::LazyLock;

static RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // Headings: keep the text, drop the marker.
        (r"(?m)^#{1,6}\s+(.*)$", "$1 "),
        // Fenced code blocks become a single pause.
        (r"(?s)```.*?```", " "),
        // Bold and italics, both marker styles.
        (r"\*\*(.*?)\*\*", "$1"),
        (r"__(.*?)__", "$1"),
        (r"\*([^*]+)\*", "$1"),
        (r"_([^_]+)_", "$1"),
        // Images before links: the image syntax contains the link syntax.
        (r"!\[([^\]]*)\]\([^)]+\)", "$1"),
        (r"\[([^\]]+)\]\([^)]+\)", "$1"),
        // List markers and horizontal rules.
        (r"(?m)^\s*[-*+]\s+", ""),
        (r"(?m)^\s*\d+[.)]\s+", ""),
        (r"(?m)^\s*[-*_]{3,}\s*$", ""),
        // Inline code and blockquotes.
        (r"`([^`]+)`", "$1"),
        (r"(?m)^\s*>\s?", ""),
        // Line breaks become spoken pauses.
        (r"(\r\n|\n|\r)+", " . "),
        // Collapse runs of whitespace.
        (r"\s\s+", " "),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid pattern"), replacement))
    .collect()
});

/// Strip markdown markers and normalize whitespace for speech.
pub fn strip_markdown(text: &str) -> String {
    let mut out = text.to_string();
    for (regex, replacement) in RULES.iter() {
        out = regex.replace_all(&out, *replacement).into_owned();
    }
    out.trim().to_string()
}
