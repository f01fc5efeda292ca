//! Tool intent: the parser's output and the dispatcher's input.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The canonical tool names accepted by the tool gateway, in the order the
/// fuzzy parser probes them. Every parser strategy normalises its output to
/// one of these; aliases that do not resolve yield no intent.
pub const CANONICAL_TOOLS: [&str; 6] = [
    "web_search",
    "web_fetch",
    "read",
    "write",
    "exec",
    "browser",
];

/// A single tool invocation extracted from model output.
///
/// Intents are immutable once produced. `confidence` encodes which strategy
/// produced the intent (1.0 guided_json, 0.9 react, 0.85 markers, 0.6/0.4
/// fuzzy); it is diagnostic, not a probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolIntent {
    /// Canonical tool name.
    pub name: String,

    /// Tool arguments as string key-value pairs.
    pub args: HashMap<String, String>,

    /// Parser certainty in [0.0, 1.0].
    pub confidence: f32,
}

impl ToolIntent {
    pub fn new(name: impl Into<String>, args: HashMap<String, String>, confidence: f32) -> Self {
        Self {
            name: name.into(),
            args,
            confidence,
        }
    }

    /// Reports whether `name` is in the canonical tool set.
    pub fn is_canonical(name: &str) -> bool {
        CANONICAL_TOOLS.contains(&name)
    }
}
