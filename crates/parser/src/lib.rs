//! Four-strategy intent parser that extracts tool call intents from model
//! output text.
//!
//! Strategies, with the confidence each stamps on its intents:
//!
//! - **guided_json** (1.0): the model emits a JSON document with a
//!   `tool_calls` array and a `done` boolean, possibly inside a ```json fence.
//! - **react** (0.9): `Action:` / `Action Input:` line pairs.
//! - **markers** (0.85): inline `[TOOL:name|key=val]` markers.
//! - **fuzzy** (0.6 / 0.4): natural-language heuristics; 0.6 when a concrete
//!   argument was extracted, 0.4 when only the intent was detected.
//!
//! The primary strategy is attempted first; if it produces nothing the
//! configured fallback is tried. Results are deduplicated by canonical tool
//! name (first occurrence wins) and never raise: any parse failure yields an
//! empty list.

mod fuzzy;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use drover_core::ToolIntent;
use fuzzy::{FUZZY_TABLES, FUZZY_TOOL_ORDER};

/// Maps every known surface spelling to a canonical tool name that matches
/// the gateway's `tool` field exactly.
static TOOL_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("web_search", "web_search"),
        ("websearch", "web_search"),
        ("search", "web_search"),
        ("web_fetch", "web_fetch"),
        ("webfetch", "web_fetch"),
        ("fetch", "web_fetch"),
        ("get", "web_fetch"),
        ("read_file", "read"),
        ("readfile", "read"),
        ("read", "read"),
        ("open", "read"),
        ("write_file", "write"),
        ("writefile", "write"),
        ("write", "write"),
        ("save", "write"),
        ("execute", "exec"),
        ("run", "exec"),
        ("exec", "exec"),
        ("shell", "exec"),
        ("bash", "exec"),
        ("browser", "browser"),
        ("browse", "browser"),
    ])
});

/// Matches lines of the form "Action: <name>" at the start of a line.
static ACTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Action:\s*(\S+)\s*$").expect("action pattern must compile"));

/// Matches lines of the form "Action Input: <value>".
static ACTION_INPUT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^Action Input:\s*(.+)$").expect("action input pattern must compile")
});

/// Matches [TOOL:name|key=val|key2=val2] with tolerance for spaces.
static MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[\s*TOOL\s*:\s*(\w+)\s*\|([^\]]+)\]").expect("marker pattern must compile")
});

/// Matches the first ```json ... ``` code fence.
static JSON_FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```json\s*\n?(.*?)\n?```").expect("fence pattern must compile")
});

/// Extracts [`ToolIntent`]s from model output using a configurable parse
/// strategy with an optional fallback. Stateless apart from the process-wide
/// precompiled pattern tables.
pub struct IntentParser {
    /// Primary parse strategy name: "guided_json", "react", "markers", or
    /// "fuzzy".
    strategy: String,
    /// Secondary strategy used when the primary returns no results. Empty
    /// disables the fallback tier.
    fallback_strategy: String,
}

impl IntentParser {
    pub fn new(strategy: impl Into<String>, fallback_strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            fallback_strategy: fallback_strategy.into(),
        }
    }

    /// Extract tool intents from `text` using the configured primary
    /// strategy, falling back once when it yields nothing. Never fails; any
    /// parse problem produces an empty list.
    pub fn parse(&self, text: &str) -> Vec<ToolIntent> {
        let mut results = self.run_strategy(&self.strategy, text);
        if results.is_empty() && !self.fallback_strategy.is_empty() {
            debug!(
                primary = %self.strategy,
                fallback = %self.fallback_strategy,
                "primary strategy returned no results, trying fallback"
            );
            results = self.run_strategy(&self.fallback_strategy, text);
        }
        results
    }

    fn run_strategy(&self, strategy: &str, text: &str) -> Vec<ToolIntent> {
        match strategy {
            "guided_json" => parse_guided_json(text),
            "react" => parse_react(text),
            "markers" => parse_markers(text),
            "fuzzy" => parse_fuzzy(text),
            other => {
                warn!(strategy = %other, "unknown parse strategy, no intents extracted");
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// guided_json
// ---------------------------------------------------------------------------

/// Expected shape of structured model output. The `reasoning` field the model
/// also emits is ignored here; the engine reads it from the response choice.
#[derive(Debug, Default, Deserialize)]
struct GuidedPayload {
    #[serde(default)]
    tool_calls: Vec<GuidedToolCall>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct GuidedToolCall {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: serde_json::Map<String, serde_json::Value>,
}

/// The model is expected to emit a JSON document with a `tool_calls` array
/// and a `done` boolean. Tries a direct parse first, then the first
/// ```json fence. `done=true` with no tool_calls signals task completion.
/// Confidence is 1.0.
fn parse_guided_json(text: &str) -> Vec<ToolIntent> {
    let payload = match serde_json::from_str::<GuidedPayload>(text.trim()) {
        Ok(p) => p,
        Err(_) => {
            let Some(fenced) = extract_json_code_block(text) else {
                return Vec::new();
            };
            match serde_json::from_str::<GuidedPayload>(&fenced) {
                Ok(p) => p,
                Err(_) => return Vec::new(),
            }
        }
    };

    if payload.done && payload.tool_calls.is_empty() {
        debug!("guided_json: done=true, no tool_calls — task complete");
        return Vec::new();
    }

    let mut intents: Vec<ToolIntent> = Vec::new();
    for call in payload.tool_calls {
        let Some(canonical) = normalize_tool(&call.name) else {
            warn!(name = %call.name, "guided_json: unknown tool name, skipping");
            continue;
        };
        if intent_exists(&intents, canonical) {
            continue;
        }
        intents.push(ToolIntent::new(canonical, args_to_strings(call.arguments), 1.0));
    }
    intents
}

/// Returns the content of the first ```json ... ``` fence in `text`.
fn extract_json_code_block(text: &str) -> Option<String> {
    JSON_FENCE_RE
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
}

// ---------------------------------------------------------------------------
// react
// ---------------------------------------------------------------------------

/// The ReAct prompting format: "Action:" / "Action Input:" line pairs. A
/// `done` action stops processing. Confidence is 0.9.
fn parse_react(text: &str) -> Vec<ToolIntent> {
    let mut intents: Vec<ToolIntent> = Vec::new();

    for caps in ACTION_RE.captures_iter(text) {
        let raw_name = &caps[1];

        // "done" signals the model is finished; stop processing.
        if raw_name.eq_ignore_ascii_case("done") {
            debug!("react: Action: done — stopping");
            break;
        }

        let Some(canonical) = normalize_tool(raw_name) else {
            warn!(name = %raw_name, "react: unknown tool name, skipping");
            continue;
        };
        if intent_exists(&intents, canonical) {
            continue;
        }

        // Find the first "Action Input:" after this Action line.
        let remaining = &text[caps.get(0).expect("match 0 always present").end()..];
        let mut args: HashMap<String, String> = HashMap::new();
        if let Some(input_caps) = ACTION_INPUT_RE.captures(remaining) {
            let raw_input = input_caps[1].trim();
            match serde_json::from_str::<HashMap<String, String>>(raw_input) {
                Ok(parsed) => args = parsed,
                // Not a JSON object of strings: store the raw value whole.
                Err(_) => {
                    args.insert("input".to_string(), raw_input.to_string());
                }
            }
        }

        intents.push(ToolIntent::new(canonical, args, 0.9));
    }

    intents
}

// ---------------------------------------------------------------------------
// markers
// ---------------------------------------------------------------------------

/// Inline `[TOOL:name|key=val]` markers. Confidence is 0.85.
fn parse_markers(text: &str) -> Vec<ToolIntent> {
    let mut intents: Vec<ToolIntent> = Vec::new();

    for caps in MARKER_RE.captures_iter(text) {
        let raw_name = caps[1].trim();
        let raw_pairs = &caps[2];

        let Some(canonical) = normalize_tool(raw_name) else {
            warn!(name = %raw_name, "markers: unknown tool name, skipping");
            continue;
        };
        if intent_exists(&intents, canonical) {
            continue;
        }

        let mut args: HashMap<String, String> = HashMap::new();
        for segment in raw_pairs.split('|') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            if let Some((key, val)) = segment.split_once('=') {
                let key = key.trim();
                if !key.is_empty() {
                    args.insert(key.to_string(), val.trim().to_string());
                }
            }
        }

        intents.push(ToolIntent::new(canonical, args, 0.85));
    }

    intents
}

// ---------------------------------------------------------------------------
// fuzzy
// ---------------------------------------------------------------------------

/// Heuristic natural-language matching. For each tool, first try to extract a
/// concrete argument (confidence 0.6); failing that, probe for broad intent
/// keywords and emit an empty-argument intent (confidence 0.4) so the caller
/// can substitute a default such as the user's last message. Tools are probed
/// in a fixed order so output is deterministic regardless of text order.
fn parse_fuzzy(text: &str) -> Vec<ToolIntent> {
    let mut intents: Vec<ToolIntent> = Vec::new();

    for tool in FUZZY_TOOL_ORDER {
        if intent_exists(&intents, tool) {
            continue;
        }
        let Some((_, table)) = FUZZY_TABLES.iter().find(|(name, _)| *name == tool) else {
            continue;
        };

        // Phase 1: extract a specific argument value, first match wins.
        let matched = table.arg.iter().find_map(|re| {
            re.captures(text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|v| !v.is_empty())
        });

        if let Some(value) = matched {
            let args = HashMap::from([(table.arg_key.to_string(), value)]);
            intents.push(ToolIntent::new(tool, args, 0.6));
            continue;
        }

        // Phase 2: broad intent without an extractable argument.
        if table.intent.iter().any(|re| re.is_match(text)) {
            let args = HashMap::from([(table.arg_key.to_string(), String::new())]);
            intents.push(ToolIntent::new(tool, args, 0.4));
        }
    }

    intents
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Canonical tool name for `alias`, or None if the alias is not recognised.
fn normalize_tool(alias: &str) -> Option<&'static str> {
    TOOL_ALIASES
        .get(alias.trim().to_lowercase().as_str())
        .copied()
}

/// Whether any intent already carries the given canonical name. Dedup is
/// intentionally coarse: one of each tool per parse is enough for the loop.
fn intent_exists(intents: &[ToolIntent], name: &str) -> bool {
    intents.iter().any(|i| i.name == name)
}

/// Converts JSON argument values to strings: string values are used verbatim,
/// everything else keeps its compact JSON rendering.
fn args_to_strings(map: serde_json::Map<String, serde_json::Value>) -> HashMap<String, String> {
    map.into_iter()
        .map(|(k, v)| {
            let s = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, s)
        })
        .collect()
}
