//! Tiered context-window management.
//!
//! Applied before each completion call: estimate the conversation's token
//! footprint, then shorten tool results (tier 1) and drop the oldest
//! non-pinned turns (tier 2) as pressure demands. The manager never reorders
//! messages, never touches non-tool content, and never fabricates content.

use drover_core::{Message, Role};
use tracing::warn;

/// Tool-result messages above this many characters are shortened in tier 1.
const MAX_TOOL_RESULT: usize = 500;

/// Apply tiered compaction to keep the estimated footprint under budget.
///
/// With `trunc_at = limit × trunc_threshold` and
/// `compact_at = limit × compact_threshold` (trunc below compact):
/// below `trunc_at` nothing changes; at or above it tool results are
/// shortened; if the estimate then still reaches `compact_at`, the oldest
/// messages are dropped, keeping the leading system message, the first
/// remaining message, and the most recent half of the rest.
pub fn manage_context(
    messages: Vec<Message>,
    limit: usize,
    compact_threshold: f64,
    trunc_threshold: f64,
) -> Vec<Message> {
    let compact_at = limit as f64 * compact_threshold;
    let trunc_at = limit as f64 * trunc_threshold;

    let estimated = estimate_tokens(&messages);
    if (estimated as f64) < trunc_at {
        return messages;
    }

    warn!(
        estimated_tokens = estimated,
        trunc_threshold = trunc_at,
        "context near trunc threshold, shortening tool results"
    );

    let messages = truncate_tool_results(messages);
    let estimated = estimate_tokens(&messages);

    if (estimated as f64) < compact_at {
        return messages;
    }

    warn!(
        estimated_tokens = estimated,
        compact_threshold = compact_at,
        "context above compact threshold, dropping oldest messages"
    );

    compact_messages(messages)
}

/// Estimate the token footprint of a message list.
///
/// Heuristic: 3.5 characters ≈ 1 token over role names and contents, plus 4
/// tokens per message for role/separator overhead. Exact counts come back
/// from the upstream in its usage field; this only drives thresholding.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    let total: usize = messages
        .iter()
        .map(|m| m.role.as_str().len() + m.content.chars().count())
        .sum();
    (total as f64 / 3.5) as usize + messages.len() * 4
}

/// Tier 1: shorten tool-role messages above [`MAX_TOOL_RESULT`] characters.
/// Preserves structure but cuts bulk.
fn truncate_tool_results(messages: Vec<Message>) -> Vec<Message> {
    messages
        .into_iter()
        .map(|mut m| {
            if m.role == Role::Tool && m.content.chars().count() > MAX_TOOL_RESULT {
                let mut shortened: String = m.content.chars().take(MAX_TOOL_RESULT).collect();
                shortened.push_str("\n... [compacted]");
                m.content = shortened;
            }
            m
        })
        .collect()
}

/// Tier 2: retain the system message (if present), the first remaining
/// message, and the most recent half of the rest. A no-op at 4 messages or
/// fewer.
fn compact_messages(messages: Vec<Message>) -> Vec<Message> {
    if messages.len() <= 4 {
        return messages;
    }

    let mut result = Vec::new();
    let mut start = 0;

    if messages[0].role == Role::System {
        result.push(messages[0].clone());
        start = 1;
    }

    let rest = &messages[start..];
    if rest.is_empty() {
        return result;
    }

    // Always keep the first remaining message: it pins the task.
    result.push(rest[0].clone());

    let tail = &rest[1..];
    let keep_from = tail.len() / 2;
    result.extend_from_slice(&tail[keep_from..]);

    result
}
