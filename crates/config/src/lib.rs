//! Configuration loading, validation, and management for Drover.
//!
//! Loads configuration from a TOML file with environment variable overrides.
//! Validates all settings at startup; the resulting [`AppConfig`] is treated
//! as read-only for the lifetime of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Agentic loop and upstream connection settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Response parsing strategy settings
    #[serde(default)]
    pub parser: ParserConfig,

    /// HTTP server listen settings
    #[serde(default)]
    pub http_server: HttpServerConfig,

    /// Structured logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Tool gateway client settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("executor", &self.executor)
            .field("parser", &self.parser)
            .field("http_server", &self.http_server)
            .field("logging", &self.logging)
            .field("tools", &self.tools)
            .finish()
    }
}

/// Agentic loop and upstream connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Base URL of the completion endpoint (required).
    #[serde(default)]
    pub completion_url: String,

    /// Model name passed through to the completion endpoint.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens the model may generate per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-call HTTP timeout for the completion endpoint.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,

    /// Maximum think → act → observe iterations per run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Retry budget per tool invocation.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Overall wall-clock deadline for one run.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,

    /// Model context window size in tokens.
    #[serde(default = "default_context_window")]
    pub context_window_limit: usize,

    /// Tokens reserved for the model's own output.
    #[serde(default = "default_context_buffer")]
    pub context_buffer_tokens: usize,

    /// Fraction of the window at which old messages are dropped.
    #[serde(default = "default_compact_threshold")]
    pub context_compact_threshold: f64,

    /// Fraction of the window at which tool results are shortened.
    #[serde(default = "default_trunc_threshold")]
    pub context_trunc_threshold: f64,

    /// Base URL of the tool gateway (required).
    #[serde(default)]
    pub gateway_url: String,

    /// Bearer token forwarded to the tool gateway (required).
    #[serde(default)]
    pub gateway_token: String,

    /// Session key included in every gateway invocation.
    #[serde(default = "default_session_key")]
    pub session_key: String,
}

fn default_model() -> String {
    "gpt-oss".into()
}
fn default_temperature() -> f32 {
    0.25
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_call_timeout() -> u64 {
    60
}
fn default_max_iterations() -> u32 {
    5
}
fn default_max_retries() -> u32 {
    3
}
fn default_run_timeout() -> u64 {
    300
}
fn default_context_window() -> usize {
    32768
}
fn default_context_buffer() -> usize {
    2000
}
fn default_compact_threshold() -> f64 {
    0.8
}
fn default_trunc_threshold() -> f64 {
    0.6
}
fn default_session_key() -> String {
    "main".into()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            completion_url: String::new(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            call_timeout_seconds: default_call_timeout(),
            max_iterations: default_max_iterations(),
            max_retries: default_max_retries(),
            run_timeout_seconds: default_run_timeout(),
            context_window_limit: default_context_window(),
            context_buffer_tokens: default_context_buffer(),
            context_compact_threshold: default_compact_threshold(),
            context_trunc_threshold: default_trunc_threshold(),
            gateway_url: String::new(),
            gateway_token: String::new(),
            session_key: default_session_key(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &str) -> &'static str {
    if s.is_empty() { "None" } else { "[REDACTED]" }
}

impl std::fmt::Debug for ExecutorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorConfig")
            .field("completion_url", &self.completion_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("call_timeout_seconds", &self.call_timeout_seconds)
            .field("max_iterations", &self.max_iterations)
            .field("max_retries", &self.max_retries)
            .field("run_timeout_seconds", &self.run_timeout_seconds)
            .field("context_window_limit", &self.context_window_limit)
            .field("context_buffer_tokens", &self.context_buffer_tokens)
            .field("context_compact_threshold", &self.context_compact_threshold)
            .field("context_trunc_threshold", &self.context_trunc_threshold)
            .field("gateway_url", &self.gateway_url)
            .field("gateway_token", &redact(&self.gateway_token))
            .field("session_key", &self.session_key)
            .finish()
    }
}

/// Response parsing strategy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Primary parse strategy: "guided_json", "react", "markers", or "fuzzy".
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Secondary strategy tried when the primary returns nothing.
    /// Empty string disables the fallback.
    #[serde(default = "default_fallback_strategy")]
    pub fallback_strategy: String,

    /// Which response field to parse: "reasoning" or "content".
    #[serde(default = "default_source_field")]
    pub source_field: String,

    /// Field used when the primary source field is empty.
    #[serde(default = "default_fallback_field")]
    pub fallback_field: String,

    /// Path to the system prompt file. Empty → no system prompt.
    #[serde(default)]
    pub system_prompt_path: String,

    /// Path to the guided-JSON schema file. Empty → no schema.
    #[serde(default)]
    pub guided_json_schema_path: String,
}

fn default_strategy() -> String {
    "react".into()
}
fn default_fallback_strategy() -> String {
    "fuzzy".into()
}
fn default_source_field() -> String {
    "reasoning".into()
}
fn default_fallback_field() -> String {
    "content".into()
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            fallback_strategy: default_fallback_strategy(),
            source_field: default_source_field(),
            fallback_field: default_fallback_field(),
            system_prompt_path: String::new(),
            guided_json_schema_path: String::new(),
        }
    }
}

/// HTTP server listen settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

fn default_port() -> u16 {
    8001
}
fn default_bind() -> String {
    "127.0.0.1".into()
}
fn default_shutdown_timeout() -> u64 {
    5
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

/// Structured logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// "debug", "info", "warn", or "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "json" or "text".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// "stdout", "stderr", or a file path.
    #[serde(default = "default_log_output")]
    pub output: String,

    /// Directory for daily error-log files. Empty disables the error log.
    #[serde(default)]
    pub error_log_dir: String,

    /// Error-log filename template containing "YYYY-MM-DD".
    #[serde(default)]
    pub error_log_filename: String,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "json".into()
}
fn default_log_output() -> String {
    "stdout".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            output: default_log_output(),
            error_log_dir: String::new(),
            error_log_filename: String::new(),
        }
    }
}

/// Tool gateway client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// HTTP timeout for each gateway invocation.
    #[serde(default = "default_tool_timeout")]
    pub default_timeout_seconds: u64,

    /// Per-tool result caps in characters. Zero or missing → 3000.
    #[serde(default)]
    pub result_limits: HashMap<String, i64>,
}

fn default_tool_timeout() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: default_tool_timeout(),
            result_limits: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, apply environment overrides,
    /// and validate the result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Overwrite specific fields from environment variables. Highest
    /// priority, so secrets never have to live in the config file.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DROVER_COMPLETION_URL") {
            self.executor.completion_url = v;
        }
        if let Ok(v) = std::env::var("DROVER_GATEWAY_URL") {
            self.executor.gateway_url = v;
        }
        if let Ok(v) = std::env::var("DROVER_GATEWAY_TOKEN") {
            self.executor.gateway_token = v;
        }
        if let Ok(v) = std::env::var("DROVER_PORT") {
            if let Ok(port) = v.parse() {
                self.http_server.port = port;
            }
        }
        if let Ok(v) = std::env::var("DROVER_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    /// Validate required fields and value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.completion_url.is_empty() {
            return Err(ConfigError::Validation(
                "executor.completion_url is required".into(),
            ));
        }
        if self.executor.gateway_url.is_empty() {
            return Err(ConfigError::Validation(
                "executor.gateway_url is required".into(),
            ));
        }
        if self.executor.gateway_token.is_empty() {
            return Err(ConfigError::Validation(
                "executor.gateway_token is required (set DROVER_GATEWAY_TOKEN)".into(),
            ));
        }
        if self.executor.max_iterations < 1 {
            return Err(ConfigError::Validation(format!(
                "executor.max_iterations must be >= 1, got {}",
                self.executor.max_iterations
            )));
        }
        if self.executor.run_timeout_seconds < 1 {
            return Err(ConfigError::Validation(format!(
                "executor.run_timeout_seconds must be >= 1, got {}",
                self.executor.run_timeout_seconds
            )));
        }
        for (name, value) in [
            (
                "executor.context_compact_threshold",
                self.executor.context_compact_threshold,
            ),
            (
                "executor.context_trunc_threshold",
                self.executor.context_trunc_threshold,
            ),
        ] {
            if value <= 0.0 || value >= 1.0 {
                return Err(ConfigError::Validation(format!(
                    "{name} must be in (0, 1), got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Read the system prompt file. Empty path → empty prompt.
    pub fn system_prompt(&self) -> Result<String, ConfigError> {
        if self.parser.system_prompt_path.is_empty() {
            return Ok(String::new());
        }
        std::fs::read_to_string(&self.parser.system_prompt_path).map_err(|e| ConfigError::Read {
            path: PathBuf::from(&self.parser.system_prompt_path),
            reason: e.to_string(),
        })
    }

    /// Read and parse the guided-JSON schema file. Empty path → None.
    pub fn guided_json_schema(&self) -> Result<Option<serde_json::Value>, ConfigError> {
        if self.parser.guided_json_schema_path.is_empty() {
            return Ok(None);
        }
        let path = PathBuf::from(&self.parser.guided_json_schema_path);
        let data = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let schema = serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
            path,
            reason: e.to_string(),
        })?;
        Ok(Some(schema))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            parser: ParserConfig::default(),
            http_server: HttpServerConfig::default(),
            logging: LoggingConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("configuration validation failed: {0}")]
    Validation(String),
}
