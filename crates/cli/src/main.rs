//! Drover entry point: load configuration, wire up the agentic engine,
//! start the OpenAI-compatible HTTP server, and serve until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use drover_agent::{Engine, EngineSettings};
use drover_config::AppConfig;
use drover_gateway::AppState;
use drover_providers::CompletionClient;
use drover_telemetry::ErrorLogger;
use drover_tools::{GatewayClient, ToolRouter};

#[derive(Parser)]
#[command(name = "drover", about = "OpenAI-compatible agentic executor", version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config/drover.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("fatal: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)?;

    drover_telemetry::init_tracing(
        &config.logging.level,
        &config.logging.format,
        &config.logging.output,
    )?;

    info!(
        config = %cli.config.display(),
        completion_url = %config.executor.completion_url,
        gateway_url = %config.executor.gateway_url,
        parser_strategy = %config.parser.strategy,
        max_iterations = config.executor.max_iterations,
        "configuration loaded"
    );

    let error_log = if !config.logging.error_log_dir.is_empty()
        && !config.logging.error_log_filename.is_empty()
    {
        Some(Arc::new(ErrorLogger::new(
            &config.logging.error_log_dir,
            &config.logging.error_log_filename,
        )))
    } else {
        None
    };

    let backend = Arc::new(CompletionClient::new(
        &config.executor.completion_url,
        Duration::from_secs(config.executor.call_timeout_seconds),
    ));

    let gateway = Arc::new(GatewayClient::new(
        &config.executor.gateway_url,
        &config.executor.gateway_token,
        &config.executor.session_key,
        Duration::from_secs(config.tools.default_timeout_seconds),
    ));
    let router = ToolRouter::new(
        gateway,
        config.tools.result_limits.clone(),
        config.executor.max_retries,
    );

    let settings = EngineSettings {
        model: config.executor.model.clone(),
        temperature: config.executor.temperature,
        max_tokens: config.executor.max_tokens,
        max_iterations: config.executor.max_iterations,
        run_timeout: Duration::from_secs(config.executor.run_timeout_seconds),
        context_window_limit: config.executor.context_window_limit,
        context_compact_threshold: config.executor.context_compact_threshold,
        context_trunc_threshold: config.executor.context_trunc_threshold,
        parser_strategy: config.parser.strategy.clone(),
        parser_fallback: config.parser.fallback_strategy.clone(),
        source_field: config.parser.source_field.clone(),
        fallback_field: config.parser.fallback_field.clone(),
        system_prompt: config.system_prompt()?,
        guided_json_schema: config.guided_json_schema()?,
    };

    let engine = Arc::new(Engine::new(settings, backend, router, error_log));

    let state = Arc::new(AppState {
        runner: engine,
        model: config.executor.model.clone(),
    });

    drover_gateway::serve(&config.http_server.bind, config.http_server.port, state).await?;

    info!("shutdown complete");
    Ok(())
}
