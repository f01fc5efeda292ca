//! OpenAI-compatible HTTP facade for the Drover engine.
//!
//! Endpoints:
//!
//! - `POST /v1/chat/completions` drives one agentic run
//! - `GET  /health` is a liveness check
//!
//! Built on Axum. Handlers reach the engine through the [`Runner`] trait so
//! they can be tested with a stub.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use drover_agent::Runner;
use drover_core::{Message, RunError};

/// Shared application state for the facade.
pub struct AppState {
    pub runner: Arc<dyn Runner>,
    /// Model name echoed in responses and the health payload.
    pub model: String,
}

pub type SharedState = Arc<AppState>;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions_handler))
        .route("/health", get(health_handler))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(bind: &str, port: u16, state: SharedState) -> std::io::Result<()> {
    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server starting");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("signal received, shutting down");
}

// ── Request / response types ──────────────────────────────────────────────

/// The subset of the OpenAI chat completions request body the engine
/// consumes. Other standard fields are accepted and ignored.
#[derive(Deserialize)]
struct ChatRequest {
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct ChatResponse {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<ChatChoice>,
    usage: ChatUsage,
}

#[derive(Serialize)]
struct ChatChoice {
    index: u32,
    message: Message,
    finish_reason: &'static str,
}

#[derive(Default, Serialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// OpenAI-compatible error body.
#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "empty_code")]
    code: &'static str,
}

fn empty_code(code: &&str) -> bool {
    code.is_empty()
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn chat_completions_handler(
    State(state): State<SharedState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    if request.messages.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request_error",
            "messages array must not be empty",
            "",
        );
    }

    match state.runner.run(request.messages).await {
        Ok(result) => {
            let response = ChatResponse {
                id: format!("chatcmpl-{}", result.run_id),
                object: "chat.completion",
                created: chrono::Utc::now().timestamp(),
                model: state.model.clone(),
                choices: vec![ChatChoice {
                    index: 0,
                    message: Message::assistant(result.answer),
                    finish_reason: "stop",
                }],
                usage: ChatUsage::default(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "run failed");
            let (status, kind) = classify_run_error(&err);
            error_response(status, kind, &err.to_string(), err.code())
        }
    }
}

async fn health_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "model": state.model,
    }))
}

// ── Middleware ────────────────────────────────────────────────────────────

/// Log each request's method, path, status, and latency.
async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "http request"
    );
    response
}

// ── Helpers ───────────────────────────────────────────────────────────────

/// Map a run error to its HTTP status and OpenAI error type. The stable
/// error code comes from [`RunError::code`].
fn classify_run_error(err: &RunError) -> (StatusCode, &'static str) {
    match err {
        RunError::ContextWindow(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
        RunError::MaxIterations => (StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
        RunError::RunTimeout => (StatusCode::GATEWAY_TIMEOUT, "server_error"),
        RunError::UpstreamUnreachable(_) => (StatusCode::BAD_GATEWAY, "server_error"),
        RunError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
    }
}

fn error_response(
    status: StatusCode,
    kind: &'static str,
    message: &str,
    code: &'static str,
) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail {
                message: message.to_string(),
                kind,
                code,
            },
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use tower::ServiceExt;

    use drover_core::RunResult;

    /// Stub runner that returns one canned outcome and records its input.
    struct StubRunner {
        outcome: Mutex<Option<Result<RunResult, RunError>>>,
        received: Mutex<Vec<Message>>,
    }

    impl StubRunner {
        fn ok(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                outcome: Mutex::new(Some(Ok(RunResult {
                    run_id: "abcdef0123456789".into(),
                    answer: answer.into(),
                    iterations: 1,
                    messages: vec![],
                }))),
                received: Mutex::new(Vec::new()),
            })
        }

        fn err(err: RunError) -> Arc<Self> {
            Arc::new(Self {
                outcome: Mutex::new(Some(Err(err))),
                received: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Runner for StubRunner {
        async fn run(&self, messages: Vec<Message>) -> Result<RunResult, RunError> {
            *self.received.lock().unwrap() = messages;
            self.outcome.lock().unwrap().take().expect("single-shot stub")
        }
    }

    fn app(runner: Arc<StubRunner>) -> Router {
        build_router(Arc::new(AppState {
            runner,
            model: "gpt-oss".into(),
        }))
    }

    async fn post_chat(app: Router, body: &str) -> (StatusCode, serde_json::Value) {
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_endpoint_reports_model() {
        let request = HttpRequest::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app(StubRunner::ok("x")).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["model"], "gpt-oss");
    }

    #[tokio::test]
    async fn successful_run_returns_openai_shape() {
        let runner = StubRunner::ok("Paris");
        let (status, json) = post_chat(
            app(runner.clone()),
            r#"{"model": "gpt-oss", "messages": [{"role": "user", "content": "Capital of France?"}]}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], "chatcmpl-abcdef0123456789");
        assert_eq!(json["object"], "chat.completion");
        assert_eq!(json["model"], "gpt-oss");
        assert_eq!(json["choices"][0]["index"], 0);
        assert_eq!(json["choices"][0]["message"]["role"], "assistant");
        assert_eq!(json["choices"][0]["message"]["content"], "Paris");
        assert_eq!(json["choices"][0]["finish_reason"], "stop");
        assert_eq!(json["usage"]["total_tokens"], 0);

        // The caller's messages reach the runner untouched.
        let received = runner.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].content, "Capital of France?");
    }

    #[tokio::test]
    async fn empty_messages_rejected() {
        let (status, json) =
            post_chat(app(StubRunner::ok("x")), r#"{"messages": []}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["type"], "invalid_request_error");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("must not be empty"));
    }

    #[tokio::test]
    async fn invalid_json_rejected() {
        let (status, _) = post_chat(app(StubRunner::ok("x")), "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn context_window_error_maps_to_400() {
        let runner = StubRunner::err(RunError::ContextWindow("too big".into()));
        let (status, json) = post_chat(
            app(runner),
            r#"{"messages": [{"role": "user", "content": "hi"}]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["type"], "invalid_request_error");
        assert_eq!(json["error"]["code"], "context_length_exceeded");
    }

    #[tokio::test]
    async fn max_iterations_maps_to_500() {
        let runner = StubRunner::err(RunError::MaxIterations);
        let (status, json) = post_chat(
            app(runner),
            r#"{"messages": [{"role": "user", "content": "hi"}]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["type"], "server_error");
        assert_eq!(json["error"]["code"], "max_iterations_exceeded");
    }

    #[tokio::test]
    async fn run_timeout_maps_to_504() {
        let runner = StubRunner::err(RunError::RunTimeout);
        let (status, json) = post_chat(
            app(runner),
            r#"{"messages": [{"role": "user", "content": "hi"}]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json["error"]["code"], "timeout_exceeded");
    }

    #[tokio::test]
    async fn upstream_unreachable_maps_to_502() {
        let runner = StubRunner::err(RunError::UpstreamUnreachable("down".into()));
        let (status, json) = post_chat(
            app(runner),
            r#"{"messages": [{"role": "user", "content": "hi"}]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"]["code"], "upstream_unavailable");
    }

    #[tokio::test]
    async fn internal_error_maps_to_500_without_code() {
        let runner = StubRunner::err(RunError::Internal("boom".into()));
        let (status, json) = post_chat(
            app(runner),
            r#"{"messages": [{"role": "user", "content": "hi"}]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["type"], "server_error");
        assert!(json["error"].get("code").is_none());
    }
}
