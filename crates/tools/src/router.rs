//! Routes tool intents to the gateway with per-tool argument mapping,
//! retry, and result truncation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use drover_core::{ToolArgs, ToolError, ToolGateway, ToolIntent};

/// Result cap applied when no per-tool limit is configured.
const DEFAULT_RESULT_LIMIT: usize = 3000;

/// Dispatches [`ToolIntent`]s to a [`ToolGateway`].
pub struct ToolRouter {
    gateway: Arc<dyn ToolGateway>,
    /// Max chars per tool result; zero or missing → 3000.
    result_limits: HashMap<String, i64>,
    /// Attempt budget per invocation; zero → 3.
    max_retries: u32,
}

impl ToolRouter {
    pub fn new(
        gateway: Arc<dyn ToolGateway>,
        result_limits: HashMap<String, i64>,
        max_retries: u32,
    ) -> Self {
        Self {
            gateway,
            result_limits,
            max_retries,
        }
    }

    /// Map the intent's arguments to the gateway's shape, invoke with retry
    /// honouring `deadline`, and truncate the result to the per-tool cap.
    pub async fn execute(
        &self,
        intent: &ToolIntent,
        deadline: Instant,
    ) -> Result<String, ToolError> {
        let args = map_args(intent);

        debug!(tool = %intent.name, "executing tool");

        let result = self.execute_with_retry(&intent.name, args, deadline).await?;
        Ok(self.truncate_result(&intent.name, result))
    }

    /// Invoke the gateway up to the retry budget, backing off exponentially
    /// between attempts. Backoff waits are interruptible by the deadline.
    /// Non-retryable errors abort immediately.
    async fn execute_with_retry(
        &self,
        tool: &str,
        args: ToolArgs,
        deadline: Instant,
    ) -> Result<String, ToolError> {
        let max_attempts = if self.max_retries == 0 { 3 } else { self.max_retries };
        let mut backoff = Duration::from_secs(1);
        let mut last_err: Option<ToolError> = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                warn!(
                    tool,
                    attempt = attempt + 1,
                    backoff_secs = backoff.as_secs(),
                    last_error = %last_err.as_ref().expect("set on prior attempt"),
                    "retrying tool invocation"
                );
                if tokio::time::timeout_at(deadline, tokio::time::sleep(backoff))
                    .await
                    .is_err()
                {
                    return Err(ToolError::Cancelled);
                }
                backoff *= 2;
            }

            let outcome = match tokio::time::timeout_at(
                deadline,
                self.gateway.invoke(tool, args.clone()),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => return Err(ToolError::Cancelled),
            };

            match outcome {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !is_retryable(&err) {
                        debug!(tool, error = %err, "non-retryable error from gateway");
                        return Err(err);
                    }
                    last_err = Some(err);
                }
            }
        }

        Err(ToolError::Exhausted {
            tool: tool.to_string(),
            attempts: max_attempts,
            last: last_err.expect("at least one attempt ran").to_string(),
        })
    }

    /// Cap `result` at the configured limit for `tool`, appending a suffix
    /// that records how many characters were omitted. Counts characters, not
    /// bytes.
    fn truncate_result(&self, tool: &str, result: String) -> String {
        let limit = self
            .result_limits
            .get(tool)
            .copied()
            .filter(|l| *l > 0)
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_RESULT_LIMIT);

        let total = result.chars().count();
        if total <= limit {
            return result;
        }

        let omitted = total - limit;
        let mut out: String = result.chars().take(limit).collect();
        out.push_str(&format!("\n... [truncated: {omitted} chars omitted]"));
        out
    }
}

/// Whether an error represents a transient condition that is safe to retry:
/// HTTP 5xx responses, connection-level failures, or timeouts. Matching is
/// case-insensitive over the error's display form.
fn is_retryable(err: &ToolError) -> bool {
    if matches!(err, ToolError::Cancelled) {
        return false;
    }
    let s = err.to_string().to_lowercase();
    s.contains("http 5")
        || s.contains("connection refused")
        || s.contains("connection reset")
        || s.contains("timeout")
}

/// Map intent arguments to the exact field names and types the gateway
/// expects for each tool. Unknown tools pass their arguments through
/// unchanged so the gateway can decide.
fn map_args(intent: &ToolIntent) -> ToolArgs {
    let mut args = ToolArgs::new();
    let get = |key: &str| intent.args.get(key).cloned().unwrap_or_default();

    match intent.name.as_str() {
        "web_search" => {
            args.insert("query".into(), get("query").into());
            if let Some(count) = intent.args.get("count") {
                args.insert("count".into(), parse_int_or(count, 10).into());
            }
            for key in ["country", "freshness"] {
                if let Some(v) = intent.args.get(key) {
                    if !v.is_empty() {
                        args.insert(key.into(), v.clone().into());
                    }
                }
            }
        }

        "web_fetch" => {
            args.insert("url".into(), get("url").into());
            // camelCase; markdown keeps fetched pages model-readable
            args.insert("extractMode".into(), "markdown".into());
            if let Some(mc) = intent.args.get("max_chars") {
                args.insert("maxChars".into(), parse_int_or(mc, 50000).into());
            }
        }

        "read" => {
            args.insert("path".into(), get("path").into());
        }

        "write" => {
            args.insert("path".into(), get("path").into());
            // The gateway's write tool takes "file_text", not "content".
            let mut content = get("content");
            if content.is_empty() {
                content = get("file_text");
            }
            args.insert("file_text".into(), content.into());
        }

        "exec" => {
            args.insert("command".into(), get("command").into());
            if let Some(wd) = intent.args.get("workdir") {
                if !wd.is_empty() {
                    args.insert("workdir".into(), wd.clone().into());
                }
            }
            // The gateway's exec tool takes "timeout" in integer seconds.
            args.insert("timeout".into(), 60.into());
        }

        "browser" => {
            args.insert("action".into(), get("action").into());
            for key in ["url", "target"] {
                if let Some(v) = intent.args.get(key) {
                    if !v.is_empty() {
                        args.insert(key.into(), v.clone().into());
                    }
                }
            }
        }

        _ => {
            for (k, v) in &intent.args {
                args.insert(k.clone(), v.clone().into());
            }
        }
    }

    args
}

/// Parse `s` as a base-10 integer, falling back to `default` when empty or
/// invalid.
fn parse_int_or(s: &str, default: i64) -> i64 {
    if s.is_empty() {
        return default;
    }
    s.parse().unwrap_or(default)
}
