//! Daily error-log file writer.
//!
//! Appends one human-readable record per tool failure to a file whose name is
//! derived from a template by substituting the current UTC date, creating one
//! file per calendar day.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::TelemetryError;

/// Appends structured error records to a daily markdown file.
///
/// The filename template must contain the literal substring `YYYY-MM-DD`,
/// replaced at write time with the current UTC date. No filesystem I/O is
/// performed until [`log`](Self::log) is called; the directory and file are
/// created lazily. All methods are safe for concurrent use.
pub struct ErrorLogger {
    dir: PathBuf,
    filename: String,
    mu: Mutex<()>,
}

impl ErrorLogger {
    /// `dir` is the directory for the daily log files (created on first
    /// use); `filename` is a template containing "YYYY-MM-DD", e.g.
    /// `"YYYY-MM-DD-errors.md"`.
    pub fn new(dir: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            filename: filename.into(),
            mu: Mutex::new(()),
        }
    }

    /// Append one record to today's file:
    ///
    /// ```text
    /// [HH:MM:SS] RunID: <id> | Iter: <n> | Tool: <name> | Error: <err> | Fix: <fix>
    /// ```
    pub fn log(
        &self,
        run_id: &str,
        iteration: u32,
        tool: &str,
        error: &str,
        fix: &str,
    ) -> Result<(), TelemetryError> {
        let now = chrono::Utc::now();
        let date = now.format("%Y-%m-%d").to_string();
        let time = now.format("%H:%M:%S").to_string();

        let filename = self.filename.replace("YYYY-MM-DD", &date);
        let path = self.dir.join(filename);

        let line = format!(
            "[{time}] RunID: {run_id} | Iter: {iteration} | Tool: {tool} | Error: {error} | Fix: {fix}\n"
        );

        let _guard = self.mu.lock().expect("error log mutex poisoned");

        let mut dir_builder = std::fs::DirBuilder::new();
        dir_builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            dir_builder.mode(0o755);
        }
        dir_builder
            .create(&self.dir)
            .map_err(|e| TelemetryError::Write(format!("creating {}: {e}", self.dir.display())))?;

        let mut options = std::fs::OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        let mut file = options
            .open(&path)
            .map_err(|e| TelemetryError::Write(format!("opening {}: {e}", path.display())))?;

        file.write_all(line.as_bytes())
            .map_err(|e| TelemetryError::Write(format!("writing {}: {e}", path.display())))
    }
}
