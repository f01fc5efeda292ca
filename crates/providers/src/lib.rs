//! Client for the upstream OpenAI-compatible completion endpoint.
//!
//! The upstream is a local inference stack serving `/v1/chat/completions`.
//! Quirks this client accounts for:
//!
//! - Context-window overflow arrives as HTTP 400 with
//!   `context_length_exceeded` (or `maximum context length`) in the body and
//!   must be distinguished from other client errors.
//! - The optional `reasoning` field on a choice is populated only when the
//!   server is started with reasoning output enabled.
//! - Guided decoding is requested through the non-standard
//!   `extra_body.guided_json` extension.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use drover_core::{
    CompletionBackend, CompletionChoice, CompletionRequest, CompletionResponse, Usage,
    UpstreamError,
};

/// reqwest-backed [`CompletionBackend`].
pub struct CompletionClient {
    base_url: String,
    client: reqwest::Client,
}

impl CompletionClient {
    /// Create a client for `base_url` with a per-call timeout.
    pub fn new(base_url: impl Into<String>, call_timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .expect("failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Build the JSON request body for one completion call.
    fn build_body(request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(schema) = &request.guided_json {
            body["extra_body"] = serde_json::json!({ "guided_json": schema });
        }

        body
    }
}

/// Whether an HTTP 400 body signals a context-length overflow.
fn is_context_window_body(body: &str) -> bool {
    body.contains("context_length_exceeded") || body.contains("maximum context length")
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, UpstreamError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = Self::build_body(&request);

        debug!(model = %request.model, messages = request.messages.len(), "sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Unreachable(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 400 {
            let error_body = response.text().await.unwrap_or_default();
            let trimmed = error_body.trim();
            if is_context_window_body(trimmed) {
                return Err(UpstreamError::ContextWindow(format!("HTTP 400: {trimmed}")));
            }
            return Err(UpstreamError::Protocol(format!(
                "completion endpoint returned HTTP 400: {trimmed}"
            )));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "completion endpoint returned error");
            return Err(UpstreamError::Unreachable(format!(
                "HTTP {status}: {}",
                error_body.trim()
            )));
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            UpstreamError::Protocol(format!("failed to parse completion response: {e}"))
        })?;

        Ok(api_response.into())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<ApiResponse> for CompletionResponse {
    fn from(api: ApiResponse) -> Self {
        CompletionResponse {
            choices: api
                .choices
                .into_iter()
                .map(|c| CompletionChoice {
                    content: c.message.content.unwrap_or_default(),
                    reasoning: c.message.reasoning.unwrap_or_default(),
                })
                .collect(),
            usage: api.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        }
    }
}
