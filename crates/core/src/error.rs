//! Error types for the Drover domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context has
//! its own error type: `UpstreamError` for the completion endpoint,
//! `ToolError` for the tool gateway, and `RunError` for the terminal outcome
//! of an agentic run. Run errors carry a stable machine-readable code that
//! the HTTP façade maps to OpenAI-style error bodies without string matching.

use thiserror::Error;

/// Terminal outcome of an agentic run.
#[derive(Debug, Error)]
pub enum RunError {
    /// The completion endpoint could not be reached or kept failing.
    #[error("completion endpoint unreachable: {0}")]
    UpstreamUnreachable(String),

    /// The accumulated prompt exceeds the model's context window.
    #[error("model context window exceeded: {0}")]
    ContextWindow(String),

    /// The iteration budget was exhausted without a final answer.
    #[error("maximum iteration count exceeded")]
    MaxIterations,

    /// The overall run deadline elapsed.
    #[error("run timeout exceeded")]
    RunTimeout,

    /// Anything else: protocol violations, serialization failures.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RunError {
    /// Stable machine-readable identifier, used as the OpenAI error `code`.
    pub fn code(&self) -> &'static str {
        match self {
            RunError::UpstreamUnreachable(_) => "upstream_unavailable",
            RunError::ContextWindow(_) => "context_length_exceeded",
            RunError::MaxIterations => "max_iterations_exceeded",
            RunError::RunTimeout => "timeout_exceeded",
            RunError::Internal(_) => "",
        }
    }
}

/// Failure from a single completion-endpoint call.
///
/// The engine treats `Unreachable` as transient (the iteration is retried),
/// `ContextWindow` as terminal, and `Protocol` as terminal.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport failure or non-200 status that is not a context overflow.
    #[error("completion endpoint unreachable: {0}")]
    Unreachable(String),

    /// HTTP 400 whose body signals a context-length overflow.
    #[error("context window exceeded: {0}")]
    ContextWindow(String),

    /// The endpoint answered but the exchange was malformed (bad JSON,
    /// unexpected 400).
    #[error("completion protocol error: {0}")]
    Protocol(String),
}

/// Failure from a tool-gateway invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Non-200 status from the gateway.
    #[error("gateway returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The gateway answered `ok=false`.
    #[error("gateway error [{kind}]: {message}")]
    Gateway { kind: String, message: String },

    /// Connection-level failure.
    #[error("gateway request failed: {0}")]
    Transport(String),

    /// The gateway answered 200 but the body was not the invoke envelope.
    #[error("gateway protocol error: {0}")]
    Protocol(String),

    /// The run deadline elapsed during the call or a backoff wait.
    #[error("cancelled: run deadline elapsed")]
    Cancelled,

    /// Retry budget exhausted; wraps the last error seen.
    #[error("invoking {tool} after {attempts} attempts: {last}")]
    Exhausted {
        tool: String,
        attempts: u32,
        last: String,
    },
}
