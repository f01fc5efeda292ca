//! Completion backend trait: the abstraction over the upstream model server.
//!
//! The upstream is an OpenAI-shaped `/v1/chat/completions` endpoint served by
//! a local inference stack. It does not support native tool calling or
//! streaming; the engine reads free-form `content` and (when the server is
//! configured to emit it) `reasoning` text from the first choice.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;
use crate::message::Message;

/// A single non-streaming completion request.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    /// Model name as the upstream knows it.
    pub model: String,

    /// Full conversation so far.
    pub messages: Vec<Message>,

    /// Maximum tokens the model may generate in this call.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,

    /// Schema forwarded verbatim as `extra_body.guided_json`, when the
    /// guided_json parse strategy is active.
    pub guided_json: Option<serde_json::Value>,
}

/// One choice from the upstream response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionChoice {
    /// The assistant's answer text. May be empty.
    pub content: String,

    /// Chain-of-thought text, present only when the upstream is configured
    /// to emit it. May be empty.
    pub reasoning: String,
}

/// Token accounting reported by the upstream.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The upstream response, reduced to what the engine consumes.
///
/// `choices` may be empty: the upstream non-deterministically returns zero
/// choices on certain prompts, which the engine treats as a retry condition
/// rather than an error.
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
    pub usage: Option<Usage>,
}

/// A completion endpoint the engine can drive.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, UpstreamError>;
}
