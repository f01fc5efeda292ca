//! The agentic loop.
//!
//! Per request: prepend the system prompt, call the completion endpoint,
//! select the parse source, extract tool intents, dispatch them through the
//! tool router, inject results into the transcript, and repeat until the
//! model produces a final answer or a limit is reached.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use drover_core::{
    CompletionBackend, CompletionRequest, Message, RunError, RunResult, ToolError, UpstreamError,
};
use drover_parser::IntentParser;
use drover_telemetry::ErrorLogger;
use drover_tools::ToolRouter;

/// Pause before re-entering an iteration after a zero-choice or empty
/// response, to avoid hammering a non-deterministic upstream.
const EMPTY_RESPONSE_BACKOFF: Duration = Duration::from_millis(500);

/// Executes an agentic loop for the given messages.
///
/// The HTTP façade depends on this trait rather than on [`Engine`] so its
/// handlers can be tested with a stub.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, messages: Vec<Message>) -> Result<RunResult, RunError>;
}

/// Engine parameters, derived from configuration at startup.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Model name passed through to the completion endpoint.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Max tokens the model may generate per call.
    pub max_tokens: u32,
    /// Loop iteration cap. Must be at least 1 (enforced by config validation).
    pub max_iterations: u32,
    /// Overall wall-clock deadline for one run.
    pub run_timeout: Duration,
    /// Model context window size in tokens.
    pub context_window_limit: usize,
    /// Fraction of the window at which old messages are dropped.
    pub context_compact_threshold: f64,
    /// Fraction of the window at which tool results are shortened.
    pub context_trunc_threshold: f64,
    /// Primary parse strategy name.
    pub parser_strategy: String,
    /// Fallback parse strategy name; empty disables the fallback.
    pub parser_fallback: String,
    /// Which response field to parse: "reasoning" or "content".
    pub source_field: String,
    /// Field used when the primary source field is empty.
    pub fallback_field: String,
    /// Prompt concatenated into the first user turn. Empty → none.
    pub system_prompt: String,
    /// Schema forwarded as `extra_body.guided_json` under the guided_json
    /// strategy.
    pub guided_json_schema: Option<serde_json::Value>,
}

/// Orchestrates the agentic loop. One instance serves the whole process;
/// every run owns its own state and deadline.
pub struct Engine {
    settings: EngineSettings,
    backend: Arc<dyn CompletionBackend>,
    router: ToolRouter,
    parser: IntentParser,
    error_log: Option<Arc<ErrorLogger>>,
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        backend: Arc<dyn CompletionBackend>,
        router: ToolRouter,
        error_log: Option<Arc<ErrorLogger>>,
    ) -> Self {
        let parser = IntentParser::new(&settings.parser_strategy, &settings.parser_fallback);
        Self {
            settings,
            backend,
            router,
            parser,
            error_log,
        }
    }

    /// Execute the loop for `input`, enforcing the run timeout as an overall
    /// deadline and the iteration cap as a cycle budget.
    async fn run_loop(&self, input: Vec<Message>) -> Result<RunResult, RunError> {
        let run_id = generate_run_id();
        let deadline = Instant::now() + self.settings.run_timeout;

        info!(
            run_id = %run_id,
            max_iterations = self.settings.max_iterations,
            "run started"
        );

        let mut messages = self.build_initial_messages(input);

        let mut answer = String::new();
        let mut last_content = String::new();
        let mut iterations_done: u32 = 0;
        let mut iteration: u32 = 0;

        while iteration < self.settings.max_iterations {
            if Instant::now() >= deadline {
                return Err(RunError::RunTimeout);
            }

            messages = crate::context::manage_context(
                messages,
                self.settings.context_window_limit,
                self.settings.context_compact_threshold,
                self.settings.context_trunc_threshold,
            );

            debug!(
                run_id = %run_id,
                iteration = iteration + 1,
                message_count = messages.len(),
                "calling completion endpoint"
            );

            let request = CompletionRequest {
                model: self.settings.model.clone(),
                messages: messages.clone(),
                max_tokens: self.settings.max_tokens,
                temperature: self.settings.temperature,
                guided_json: if self.settings.parser_strategy == "guided_json" {
                    self.settings.guided_json_schema.clone()
                } else {
                    None
                },
            };

            let outcome = tokio::time::timeout_at(deadline, self.backend.complete(request)).await;
            let response = match outcome {
                Err(_) => return Err(RunError::RunTimeout),
                Ok(Err(UpstreamError::ContextWindow(msg))) => {
                    return Err(RunError::ContextWindow(msg));
                }
                Ok(Err(UpstreamError::Unreachable(msg))) => {
                    warn!(
                        run_id = %run_id,
                        iteration = iteration + 1,
                        error = %msg,
                        "transient error from completion endpoint, retrying next iteration"
                    );
                    iteration += 1;
                    continue;
                }
                Ok(Err(UpstreamError::Protocol(msg))) => {
                    return Err(RunError::Internal(format!(
                        "calling completion endpoint at iteration {}: {msg}",
                        iteration + 1
                    )));
                }
                Ok(Ok(response)) => response,
            };

            if response.choices.is_empty() {
                // The upstream non-deterministically returns 0 choices on
                // certain prompts. Re-enter the same iteration after a short
                // pause; the counter does not advance.
                warn!(
                    run_id = %run_id,
                    iteration = iteration + 1,
                    "completion endpoint returned 0 choices, retrying iteration"
                );
                self.pause(deadline).await?;
                continue;
            }

            let choice = &response.choices[0];
            let content = choice.content.clone();
            let reasoning = choice.reasoning.clone();

            if let Some(usage) = response.usage {
                debug!(
                    run_id = %run_id,
                    iteration = iteration + 1,
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    has_reasoning = !reasoning.is_empty(),
                    "completion response received"
                );
            }

            // Track last non-empty content for use as a best-effort answer.
            if !content.trim().is_empty() {
                last_content = content.clone();
            }

            messages.push(Message::assistant(content.clone()));

            let parse_source = self.select_parse_source(&reasoning, &content);
            if parse_source.trim().is_empty() {
                if content.trim().is_empty() {
                    // Both reasoning and content empty: the model produced
                    // nothing at all this round.
                    warn!(
                        run_id = %run_id,
                        iteration = iteration + 1,
                        "empty reasoning and content, retrying"
                    );
                    self.pause(deadline).await?;
                    iteration += 1;
                    continue;
                }
                // Non-empty content with no parse source: final answer.
                info!(
                    run_id = %run_id,
                    iteration = iteration + 1,
                    "empty parse source, treating content as final answer"
                );
                answer = content;
                iterations_done = iteration + 1;
                break;
            }

            let intents = self.parser.parse(&parse_source);

            debug!(
                run_id = %run_id,
                iteration = iteration + 1,
                intent_count = intents.len(),
                "intents parsed"
            );

            if intents.is_empty() {
                info!(
                    run_id = %run_id,
                    iteration = iteration + 1,
                    "no tool intents found, final answer reached"
                );
                answer = content;
                iterations_done = iteration + 1;
                break;
            }

            for intent in &intents {
                if Instant::now() >= deadline {
                    return Err(RunError::RunTimeout);
                }

                match self.router.execute(intent, deadline).await {
                    Ok(result) => {
                        debug!(
                            run_id = %run_id,
                            iteration = iteration + 1,
                            tool = %intent.name,
                            result_len = result.len(),
                            "tool result injected"
                        );
                        messages.push(Message::tool(format!(
                            "Tool \"{}\" result:\n{result}",
                            intent.name
                        )));
                    }
                    Err(ToolError::Cancelled) => return Err(RunError::RunTimeout),
                    Err(err) => {
                        warn!(
                            run_id = %run_id,
                            iteration = iteration + 1,
                            tool = %intent.name,
                            error = %err,
                            "tool execution failed"
                        );
                        if let Some(error_log) = &self.error_log {
                            if let Err(log_err) = error_log.log(
                                &run_id,
                                iteration + 1,
                                &intent.name,
                                &err.to_string(),
                                "injecting error into context for model recovery",
                            ) {
                                warn!(error = %log_err, "error log append failed");
                            }
                        }
                        // The failure is data: the model sees it and adapts.
                        messages.push(Message::tool(format!(
                            "Tool \"{}\" failed: {err}",
                            intent.name
                        )));
                    }
                }
            }

            iteration += 1;
        }

        // Exhausted the iteration budget without a clean break. If the model
        // produced content along the way, return it as the best answer.
        if answer.is_empty() {
            if last_content.is_empty() {
                return Err(RunError::MaxIterations);
            }
            warn!(
                run_id = %run_id,
                iterations = iteration,
                "max iterations reached, returning last content as answer"
            );
            answer = last_content;
        }
        if iterations_done == 0 {
            iterations_done = self.settings.max_iterations;
        }

        info!(
            run_id = %run_id,
            iterations = iterations_done,
            answer_len = answer.len(),
            "run complete"
        );

        Ok(RunResult {
            run_id,
            answer,
            iterations: iterations_done,
            messages,
        })
    }

    /// Prepend the system prompt (if configured) to the caller's messages.
    ///
    /// NOTE: the upstream returns 0 choices when a "system" role message is
    /// present; its serving stack bakes in a conflicting system prompt.
    /// Workaround: inject the prompt at the top of the first user message
    /// instead of as a dedicated system role entry.
    fn build_initial_messages(&self, input: Vec<Message>) -> Vec<Message> {
        if self.settings.system_prompt.is_empty() {
            return input;
        }

        let mut result = Vec::with_capacity(input.len());
        let mut injected = false;

        for msg in input {
            if !injected && msg.role == drover_core::Role::User {
                result.push(Message::user(format!(
                    "{}\n\n{}",
                    self.settings.system_prompt, msg.content
                )));
                injected = true;
            } else {
                result.push(msg);
            }
        }

        // No user message found: fall back to prepending a user turn.
        if !injected {
            result.insert(0, Message::user(self.settings.system_prompt.clone()));
        }

        result
    }

    /// Pick the text the parser should analyse, preferring the configured
    /// source field and falling back as configured.
    fn select_parse_source(&self, reasoning: &str, content: &str) -> String {
        match self.settings.source_field.as_str() {
            "reasoning" => {
                if !reasoning.trim().is_empty() {
                    return reasoning.to_string();
                }
                if self.settings.fallback_field == "content" {
                    return content.to_string();
                }
                String::new()
            }
            _ => content.to_string(),
        }
    }

    /// Sleep [`EMPTY_RESPONSE_BACKOFF`], bailing out with run-timeout if the
    /// deadline elapses first.
    async fn pause(&self, deadline: Instant) -> Result<(), RunError> {
        tokio::time::timeout_at(deadline, tokio::time::sleep(EMPTY_RESPONSE_BACKOFF))
            .await
            .map_err(|_| RunError::RunTimeout)
    }
}

#[async_trait]
impl Runner for Engine {
    async fn run(&self, messages: Vec<Message>) -> Result<RunResult, RunError> {
        self.run_loop(messages).await
    }
}

/// A 16-character lowercase hex run identifier from cryptographic randomness.
fn generate_run_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    hex[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use drover_core::{
        CompletionChoice, CompletionResponse, Role, ToolArgs, ToolGateway, Usage,
    };

    // -- scripted doubles ---------------------------------------------------

    /// Completion backend that pops one canned outcome per call.
    struct SequentialMockBackend {
        outcomes: Mutex<Vec<Result<CompletionResponse, UpstreamError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl SequentialMockBackend {
        fn new(outcomes: Vec<Result<CompletionResponse, UpstreamError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_request(&self) -> CompletionRequest {
            self.requests.lock().unwrap().last().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionBackend for SequentialMockBackend {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, UpstreamError> {
            self.requests.lock().unwrap().push(request);
            let mut outcomes = self.outcomes.lock().unwrap();
            assert!(!outcomes.is_empty(), "mock backend exhausted");
            outcomes.remove(0)
        }
    }

    /// Tool gateway that pops one canned outcome per call and records calls.
    struct ScriptedGateway {
        outcomes: Mutex<Vec<Result<String, ToolError>>>,
        calls: Mutex<Vec<(String, ToolArgs)>>,
    }

    impl ScriptedGateway {
        fn new(outcomes: Vec<Result<String, ToolError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ToolGateway for ScriptedGateway {
        async fn invoke(&self, tool: &str, args: ToolArgs) -> Result<String, ToolError> {
            self.calls.lock().unwrap().push((tool.to_string(), args));
            let mut outcomes = self.outcomes.lock().unwrap();
            assert!(!outcomes.is_empty(), "mock gateway exhausted");
            outcomes.remove(0)
        }
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            model: "gpt-oss".into(),
            temperature: 0.25,
            max_tokens: 1000,
            max_iterations: 5,
            run_timeout: Duration::from_secs(300),
            context_window_limit: 32768,
            context_compact_threshold: 0.8,
            context_trunc_threshold: 0.6,
            parser_strategy: "react".into(),
            parser_fallback: "".into(),
            source_field: "reasoning".into(),
            fallback_field: "content".into(),
            system_prompt: String::new(),
            guided_json_schema: None,
        }
    }

    fn engine(
        settings: EngineSettings,
        backend: Arc<SequentialMockBackend>,
        gateway: Arc<ScriptedGateway>,
    ) -> Engine {
        let router = ToolRouter::new(gateway, HashMap::new(), 3);
        Engine::new(settings, backend, router, None)
    }

    fn choice(content: &str, reasoning: &str) -> Result<CompletionResponse, UpstreamError> {
        Ok(CompletionResponse {
            choices: vec![CompletionChoice {
                content: content.into(),
                reasoning: reasoning.into(),
            }],
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
        })
    }

    const SEARCH_REASONING: &str = "Action: web_search\nAction Input: {\"query\":\"x\"}";

    // -- end-to-end scenarios -----------------------------------------------

    #[tokio::test]
    async fn immediate_final_answer() {
        let backend = SequentialMockBackend::new(vec![choice("Paris", "")]);
        let gateway = ScriptedGateway::new(vec![]);
        let engine = engine(settings(), backend.clone(), gateway.clone());

        let result = engine
            .run(vec![Message::user("Capital of France?")])
            .await
            .unwrap();

        assert_eq!(result.answer, "Paris");
        assert_eq!(result.iterations, 1);
        assert_eq!(gateway.call_count(), 0, "gateway must never be called");
    }

    #[tokio::test]
    async fn one_tool_call_then_done() {
        let backend = SequentialMockBackend::new(vec![
            choice("ok", SEARCH_REASONING),
            choice("Done. R.", ""),
        ]);
        let gateway = ScriptedGateway::new(vec![Ok("\"R\"".into())]);
        let engine = engine(settings(), backend.clone(), gateway.clone());

        let result = engine.run(vec![Message::user("find x")]).await.unwrap();

        assert_eq!(result.answer, "Done. R.");
        assert_eq!(result.iterations, 2);
        assert_eq!(gateway.call_count(), 1);

        let tool_msg = result
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .expect("transcript must contain a tool message");
        assert_eq!(tool_msg.content, "Tool \"web_search\" result:\n\"R\"");
    }

    #[tokio::test]
    async fn max_iterations_returns_best_effort_answer() {
        let mut cfg = settings();
        cfg.max_iterations = 2;
        let backend = SequentialMockBackend::new(vec![
            choice("ok", SEARCH_REASONING),
            choice("ok", SEARCH_REASONING),
        ]);
        let gateway = ScriptedGateway::new(vec![Ok("\"r\"".into()), Ok("\"r\"".into())]);
        let engine = engine(cfg, backend.clone(), gateway.clone());

        let result = engine.run(vec![Message::user("loop")]).await.unwrap();

        // Non-empty content was seen, so the cap yields a best-effort answer.
        assert_eq!(result.answer, "ok");
        assert_eq!(result.iterations, 2);
        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn max_iterations_without_content_fails() {
        let mut cfg = settings();
        cfg.max_iterations = 2;
        let backend = SequentialMockBackend::new(vec![
            choice("", SEARCH_REASONING),
            choice("", SEARCH_REASONING),
        ]);
        let gateway = ScriptedGateway::new(vec![Ok("\"r\"".into()), Ok("\"r\"".into())]);
        let engine = engine(cfg, backend.clone(), gateway.clone());

        let err = engine.run(vec![Message::user("loop")]).await.unwrap_err();
        assert!(matches!(err, RunError::MaxIterations));
    }

    #[tokio::test]
    async fn context_window_error_is_terminal() {
        let backend = SequentialMockBackend::new(vec![Err(UpstreamError::ContextWindow(
            "HTTP 400: context_length_exceeded".into(),
        ))]);
        let gateway = ScriptedGateway::new(vec![]);
        let engine = engine(settings(), backend.clone(), gateway.clone());

        let err = engine.run(vec![Message::user("huge")]).await.unwrap_err();
        assert!(matches!(err, RunError::ContextWindow(_)));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn transient_upstream_error_recovers() {
        let backend = SequentialMockBackend::new(vec![
            Err(UpstreamError::Unreachable("HTTP 503: unavailable".into())),
            choice("ok", ""),
        ]);
        let gateway = ScriptedGateway::new(vec![]);
        let engine = engine(settings(), backend.clone(), gateway.clone());

        let result = engine.run(vec![Message::user("q")]).await.unwrap();
        // The failed iteration counts.
        assert_eq!(result.iterations, 2);
        assert_eq!(result.answer, "ok");
    }

    #[tokio::test]
    async fn tool_failure_injected_and_model_adapts() {
        let backend = SequentialMockBackend::new(vec![
            choice("ok", "Action: exec\nAction Input: {\"command\":\"ls\"}"),
            choice("Cannot run; alternate answer.", ""),
        ]);
        let gateway = ScriptedGateway::new(vec![Err(ToolError::Gateway {
            kind: "denied".into(),
            message: "no".into(),
        })]);
        let engine = engine(settings(), backend.clone(), gateway.clone());

        let result = engine.run(vec![Message::user("list files")]).await.unwrap();

        assert_eq!(result.answer, "Cannot run; alternate answer.");
        assert_eq!(result.iterations, 2);
        let tool_msg = result
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert!(tool_msg.content.starts_with("Tool \"exec\" failed:"));
    }

    // -- retry conditions ---------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn zero_choices_does_not_consume_an_iteration() {
        let mut cfg = settings();
        cfg.max_iterations = 1;
        let backend = SequentialMockBackend::new(vec![
            Ok(CompletionResponse::default()),
            choice("answer", ""),
        ]);
        let gateway = ScriptedGateway::new(vec![]);
        let engine = engine(cfg, backend.clone(), gateway.clone());

        let result = engine.run(vec![Message::user("q")]).await.unwrap();
        // Two upstream calls, but the zero-choice round re-entered the same
        // iteration.
        assert_eq!(backend.request_count(), 2);
        assert_eq!(result.iterations, 1);
        assert_eq!(result.answer, "answer");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_reasoning_and_content_consumes_an_iteration() {
        let backend = SequentialMockBackend::new(vec![choice("", ""), choice("late answer", "")]);
        let gateway = ScriptedGateway::new(vec![]);
        let engine = engine(settings(), backend.clone(), gateway.clone());

        let result = engine.run(vec![Message::user("q")]).await.unwrap();
        assert_eq!(result.answer, "late answer");
        assert_eq!(result.iterations, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_timeout_when_upstream_hangs() {
        struct HangingBackend;

        #[async_trait]
        impl CompletionBackend for HangingBackend {
            async fn complete(
                &self,
                _request: CompletionRequest,
            ) -> Result<CompletionResponse, UpstreamError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(CompletionResponse::default())
            }
        }

        let mut cfg = settings();
        cfg.run_timeout = Duration::from_secs(1);
        let gateway = ScriptedGateway::new(vec![]);
        let router = ToolRouter::new(gateway, HashMap::new(), 3);
        let engine = Engine::new(cfg, Arc::new(HangingBackend), router, None);

        let err = engine.run(vec![Message::user("q")]).await.unwrap_err();
        assert!(matches!(err, RunError::RunTimeout));
    }

    #[tokio::test]
    async fn protocol_error_is_terminal() {
        let backend = SequentialMockBackend::new(vec![Err(UpstreamError::Protocol(
            "failed to parse completion response".into(),
        ))]);
        let gateway = ScriptedGateway::new(vec![]);
        let engine = engine(settings(), backend.clone(), gateway.clone());

        let err = engine.run(vec![Message::user("q")]).await.unwrap_err();
        assert!(matches!(err, RunError::Internal(_)));
    }

    // -- prompt injection and parse source ----------------------------------

    #[tokio::test]
    async fn system_prompt_concatenated_into_first_user_turn() {
        let mut cfg = settings();
        cfg.system_prompt = "Be terse.".into();
        let backend = SequentialMockBackend::new(vec![choice("hi", "")]);
        let gateway = ScriptedGateway::new(vec![]);
        let engine = engine(cfg, backend.clone(), gateway.clone());

        let result = engine
            .run(vec![
                Message::assistant("earlier turn"),
                Message::user("question"),
            ])
            .await
            .unwrap();

        // No dedicated system role message anywhere.
        assert!(result.messages.iter().all(|m| m.role != Role::System));
        assert_eq!(result.messages[0].content, "earlier turn");
        assert_eq!(result.messages[1].content, "Be terse.\n\nquestion");
    }

    #[tokio::test]
    async fn system_prompt_becomes_synthetic_user_turn_when_no_user_message() {
        let mut cfg = settings();
        cfg.system_prompt = "Be terse.".into();
        let backend = SequentialMockBackend::new(vec![choice("hi", "")]);
        let gateway = ScriptedGateway::new(vec![]);
        let engine = engine(cfg, backend.clone(), gateway.clone());

        let result = engine
            .run(vec![Message::assistant("only assistant")])
            .await
            .unwrap();

        assert_eq!(result.messages[0].role, Role::User);
        assert_eq!(result.messages[0].content, "Be terse.");
    }

    #[tokio::test]
    async fn content_source_field_skips_reasoning() {
        let mut cfg = settings();
        cfg.source_field = "content".into();
        // Reasoning carries an action, but the configured source is content.
        let backend = SequentialMockBackend::new(vec![choice("plain answer", SEARCH_REASONING)]);
        let gateway = ScriptedGateway::new(vec![]);
        let engine = engine(cfg, backend.clone(), gateway.clone());

        let result = engine.run(vec![Message::user("q")]).await.unwrap();
        assert_eq!(result.answer, "plain answer");
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn guided_json_schema_sent_only_under_guided_strategy() {
        let mut cfg = settings();
        cfg.parser_strategy = "guided_json".into();
        cfg.guided_json_schema = Some(serde_json::json!({"type": "object"}));
        let backend = SequentialMockBackend::new(vec![choice(
            "done",
            r#"{"reasoning": "", "tool_calls": [], "done": true}"#,
        )]);
        let gateway = ScriptedGateway::new(vec![]);
        let engine = engine(cfg, backend.clone(), gateway.clone());

        let result = engine.run(vec![Message::user("q")]).await.unwrap();
        assert_eq!(result.answer, "done");
        assert!(backend.last_request().guided_json.is_some());
    }

    #[tokio::test]
    async fn schema_not_sent_under_other_strategies() {
        let mut cfg = settings();
        cfg.guided_json_schema = Some(serde_json::json!({"type": "object"}));
        let backend = SequentialMockBackend::new(vec![choice("hi", "")]);
        let gateway = ScriptedGateway::new(vec![]);
        let engine = engine(cfg, backend.clone(), gateway.clone());

        engine.run(vec![Message::user("q")]).await.unwrap();
        assert!(backend.last_request().guided_json.is_none());
    }

    // -- transcript ordering -------------------------------------------------

    #[tokio::test]
    async fn tool_results_follow_their_assistant_message_in_order() {
        let reasoning = "Action: web_search\nAction Input: {\"query\":\"a\"}\nAction: read\nAction Input: {\"path\":\"/f\"}";
        let backend = SequentialMockBackend::new(vec![
            choice("working", reasoning),
            choice("final", ""),
        ]);
        let gateway = ScriptedGateway::new(vec![Ok("\"s\"".into()), Ok("\"r\"".into())]);
        let engine = engine(settings(), backend.clone(), gateway.clone());

        let result = engine.run(vec![Message::user("q")]).await.unwrap();

        let roles: Vec<Role> = result.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [Role::User, Role::Assistant, Role::Tool, Role::Tool, Role::Assistant]
        );
        assert!(result.messages[2].content.contains("web_search"));
        assert!(result.messages[3].content.contains("read"));
    }

    #[tokio::test]
    async fn tool_failure_is_recorded_in_error_log() {
        let dir = tempfile::tempdir().unwrap();
        let error_log = Arc::new(ErrorLogger::new(dir.path(), "YYYY-MM-DD-errors.md"));

        let backend = SequentialMockBackend::new(vec![
            choice("ok", "Action: exec\nAction Input: {\"command\":\"ls\"}"),
            choice("fine", ""),
        ]);
        let gateway = ScriptedGateway::new(vec![Err(ToolError::Gateway {
            kind: "denied".into(),
            message: "no".into(),
        })]);
        let router = ToolRouter::new(gateway, HashMap::new(), 3);
        let engine = Engine::new(settings(), backend, router, Some(error_log));

        engine.run(vec![Message::user("q")]).await.unwrap();

        let date = chrono_date();
        let content =
            std::fs::read_to_string(dir.path().join(format!("{date}-errors.md"))).unwrap();
        assert!(content.contains("| Tool: exec |"));
        assert!(content.contains("| Iter: 1 |"));
        assert!(content.contains("denied"));
    }

    fn chrono_date() -> String {
        chrono::Utc::now().format("%Y-%m-%d").to_string()
    }

    #[tokio::test]
    async fn run_ids_are_hex_and_unique() {
        let ids: Vec<String> = (0..32).map(|_| generate_run_id()).collect();
        for id in &ids {
            assert_eq!(id.len(), 16);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
        let unique: std::collections::HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }
}
