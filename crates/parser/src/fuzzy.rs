//! Pattern tables for the fuzzy (natural language) parse strategy.
//!
//! Two tables per tool: `arg` patterns whose first capture group is a usable
//! argument value, tried first-match-wins, and broader `intent` patterns that
//! detect the desire to use a tool even when no argument can be extracted.

use once_cell::sync::Lazy;
use regex::Regex;

/// Fixed probe order. `browser` is intentionally absent: there is no reliable
/// natural-language signal for it.
pub(crate) const FUZZY_TOOL_ORDER: [&str; 5] = ["web_search", "web_fetch", "read", "write", "exec"];

pub(crate) struct FuzzyTable {
    /// Argument-extraction patterns; first capture group is the value.
    pub arg: Vec<Regex>,
    /// Broad intent-detection patterns; no capture required.
    pub intent: Vec<Regex>,
    /// Argument key the captured value is stored under.
    pub arg_key: &'static str,
}

fn compile(raws: &[&str]) -> Vec<Regex> {
    raws.iter()
        .map(|r| Regex::new(r).expect("fuzzy pattern must compile"))
        .collect()
}

pub(crate) static FUZZY_TABLES: Lazy<Vec<(&'static str, FuzzyTable)>> = Lazy::new(|| {
    vec![
        (
            "web_search",
            FuzzyTable {
                arg: compile(&[
                    // "search for X", "look up X", "find X"
                    r#"(?i)(?:search|look\s+up|query|find)\s+(?:for\s+)?["']?(.+?)["']?(?:\s+(?:on|using|via|with)|[.\n]|$)"#,
                    // "browse the web to get/find X"
                    r#"(?i)browse\s+(?:the\s+)?web\s+(?:to\s+(?:get|find|look\s+up|retrieve|check)\s+)?["']?(.+?)["']?(?:[.\n]|$)"#,
                    // "need/want/going to search/browse/google X"
                    r#"(?i)(?:need|want|should|going)\s+to\s+(?:search|browse|look\s+up|google|find|check)\s+(?:(?:the\s+)?web\s+)?(?:for\s+|to\s+get\s+|about\s+)?["']?(.+?)["']?(?:[.\n]|$)"#,
                    // "to get the current X", "to find the X"
                    r#"(?i)\bto\s+(?:get|find|retrieve|check|look\s+up)\s+(?:the\s+)?(?:current\s+)?["']?(.+?)["']?(?:[.\n]|$)"#,
                ]),
                intent: compile(&[
                    // Explicit search verbs
                    r"(?i)\b(?:search|browse\s+(?:the\s+)?web|look\s+up|google|web\s+search)\b",
                    r"(?i)\buse\s+(?:search|web_search)\b",
                    r"(?i)\b(?:search|browse)\s+(?:the\s+)?(?:web|internet|online)\b",
                    // Real-time / current-data signals
                    r"(?i)\b(?:current|today'?s?|latest|live|right\s+now|real[\s-]?time)\b.{0,40}\b(?:price|rate|stock|value|cost|quote|news|score|weather|temperature)\b",
                    r"(?i)\b(?:price|rate|stock|value|cost|quote|news|score|weather|temperature)\b.{0,40}\b(?:current|today|latest|live|now|real[\s-]?time)\b",
                    // What is X today / right now
                    r"(?i)\bwhat\s+is\s+(?:the\s+)?(?:current|today'?s?|latest)\b",
                ]),
                arg_key: "query",
            },
        ),
        (
            "web_fetch",
            FuzzyTable {
                arg: compile(&[
                    // "fetch/get the page at URL"
                    r"(?i)(?:fetch|retrieve|get|download|open)\s+(?:the\s+)?(?:page|url|site|content)?\s*(?:at|from)?\s*(https?://\S+)",
                ]),
                intent: compile(&[
                    r"(?i)\b(?:fetch|retrieve|download)\s+(?:the\s+)?(?:url|page|site)\b",
                ]),
                arg_key: "url",
            },
        ),
        (
            "read",
            FuzzyTable {
                arg: compile(&[
                    r#"(?i)(?:read|open|view|check|load)\s+(?:the\s+)?(?:file|contents?\s+of\s+)?\s*["'`]?([/~][\w.\-/]+)["'`]?"#,
                ]),
                intent: vec![],
                arg_key: "path",
            },
        ),
        (
            "write",
            FuzzyTable {
                arg: compile(&[
                    r#"(?i)(?:write|save|create|output)\s+(?:to|as|the file)\s+["'`]?([/~][\w.\-/]+)["'`]?"#,
                ]),
                intent: vec![],
                arg_key: "path",
            },
        ),
        (
            "exec",
            FuzzyTable {
                arg: compile(&[
                    r#"(?i)(?:run|execute|exec)\s+(?:the\s+)?(?:command|shell|bash)?\s*["'`]([^"'`\n]+)["'`]"#,
                ]),
                intent: vec![],
                arg_key: "command",
            },
        ),
    ]
});
