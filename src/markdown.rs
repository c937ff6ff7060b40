//! Markdown to plain text for the speech engine.

use regex::Regex;
use std::sync::LazyLock;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).unwrap(),
        replacement,
    }
}

// Order matters: images before links, line markers before emphasis so that
// "* item" is not read as the start of an italic span.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(r"(?m)^[ \t]*```[^\n]*$", ""),
        rule(r"!\[[^\]]*\]\([^)]*\)", ""),
        rule(r"\[([^\]]*)\]\([^)]*\)", "$1"),
        rule(r"(?m)^[ \t]*#{1,6}[ \t]+", ""),
        rule(r"(?m)^[ \t]*>[ \t]?", ""),
        rule(r"(?m)^[ \t]*(?:[-*+]|\d+[.)])[ \t]+", ""),
        rule(r"\*\*(.+?)\*\*", "$1"),
        rule(r"__(.+?)__", "$1"),
        rule(r"~~(.+?)~~", "$1"),
        rule(r"\*([^*\n]+)\*", "$1"),
        rule(r"\b_([^_\n]+)_\b", "$1"),
        rule(r"`([^`]*)`", "$1"),
        rule(r"[\r\n]+", " "),
    ]
});

/// Strip markdown syntax so the text reads naturally when spoken.
pub fn clean_for_speech(text: &str) -> String {
    RULES.iter().fold(text.to_string(), |acc, rule| {
        rule.pattern.replace_all(&acc, rule.replacement).into_owned()
    })
}
