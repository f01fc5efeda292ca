//! Structured logging construction for Drover.
//!
//! [`init_tracing`] builds the global tracing subscriber from three config
//! strings so callers can drive it from the config file without importing
//! tracing-subscriber themselves. [`ErrorLogger`] appends human-readable
//! error records to a daily markdown file.

pub mod error_log;

pub use error_log::ErrorLogger;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Telemetry setup errors.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("unknown log level {0:?}: must be one of debug, info, warn, error")]
    UnknownLevel(String),

    #[error("unknown log format {0:?}: must be json or text")]
    UnknownFormat(String),

    #[error("opening log file {path}: {reason}")]
    OpenFile { path: String, reason: String },

    #[error("writing error log: {0}")]
    Write(String),

    #[error("tracing subscriber already initialised")]
    AlreadyInitialised,
}

/// Resolve a config level string to the directive passed to [`EnvFilter`].
fn resolve_level(level: &str) -> Result<&'static str, TelemetryError> {
    match level.trim().to_lowercase().as_str() {
        "debug" => Ok("debug"),
        "info" | "" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(TelemetryError::UnknownLevel(other.to_string())),
    }
}

/// Resolve the output writer: "stdout" (default), "stderr", or a file path
/// opened in append+create mode so restarts accumulate logs.
fn resolve_writer(output: &str) -> Result<BoxMakeWriter, TelemetryError> {
    match output.trim().to_lowercase().as_str() {
        "stdout" | "" => Ok(BoxMakeWriter::new(std::io::stdout)),
        "stderr" => Ok(BoxMakeWriter::new(std::io::stderr)),
        _ => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(output)
                .map_err(|e| TelemetryError::OpenFile {
                    path: output.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(BoxMakeWriter::new(std::sync::Mutex::new(file)))
        }
    }
}

/// Install the global tracing subscriber.
///
/// `level`:  "debug", "info", "warn", or "error" (case-insensitive).
/// `format`: "json" (default) or "text".
/// `output`: "stdout" (default), "stderr", or a file path.
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init_tracing(level: &str, format: &str, output: &str) -> Result<(), TelemetryError> {
    let level = resolve_level(level)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let writer = resolve_writer(output)?;

    let result = match format.trim().to_lowercase().as_str() {
        "json" | "" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(false)
            .try_init(),
        "text" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(false)
            .try_init(),
        other => return Err(TelemetryError::UnknownFormat(other.to_string())),
    };

    result.map_err(|_| TelemetryError::AlreadyInitialised)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_levels_resolve() {
        assert_eq!(resolve_level("debug").unwrap(), "debug");
        assert_eq!(resolve_level("INFO").unwrap(), "info");
        assert_eq!(resolve_level("").unwrap(), "info");
        assert_eq!(resolve_level("warning").unwrap(), "warn");
        assert_eq!(resolve_level("error").unwrap(), "error");
    }

    #[test]
    fn unknown_level_rejected() {
        let err = resolve_level("verbose").unwrap_err();
        assert!(err.to_string().contains("verbose"));
    }

    #[test]
    fn unknown_format_rejected() {
        let err = init_tracing("info", "yaml", "stdout").unwrap_err();
        assert!(matches!(err, TelemetryError::UnknownFormat(_)));
    }

    #[test]
    fn stdout_and_stderr_writers_resolve() {
        assert!(resolve_writer("stdout").is_ok());
        assert!(resolve_writer("STDERR").is_ok());
        assert!(resolve_writer("").is_ok());
    }
}
