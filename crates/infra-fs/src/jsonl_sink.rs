// JSON-lines implementation of DiagnosticsSink

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use speedtest_telemetry_core::domain::DiagnosticEvent;
use speedtest_telemetry_core::error::{AppError, Result};
use speedtest_telemetry_core::port::time_provider::SystemTimeProvider;
use speedtest_telemetry_core::port::{DiagnosticsSink, TimeProvider};

/// Appends one key-sorted JSON object per event to the diagnostics log.
/// With echo enabled the same line is also written to stdout.
pub struct JsonlDiagnosticsSink {
    path: PathBuf,
    echo_stdout: bool,
    time_provider: Arc<dyn TimeProvider>,
}

impl JsonlDiagnosticsSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            echo_stdout: true,
            time_provider: Arc::new(SystemTimeProvider),
        }
    }

    pub fn with_echo(mut self, echo_stdout: bool) -> Self {
        self.echo_stdout = echo_stdout;
        self
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sink_error(&self, e: impl std::fmt::Display) -> AppError {
        AppError::Sink(format!("{}: {}", self.path.display(), e))
    }

    async fn append_line(&self, line: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.sink_error(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.sink_error(e))?;

        file.write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| self.sink_error(e))?;
        file.flush().await.map_err(|e| self.sink_error(e))
    }
}

#[async_trait]
impl DiagnosticsSink for JsonlDiagnosticsSink {
    async fn emit(&self, mut event: DiagnosticEvent) -> Result<()> {
        event.stamp_if_missing(|| self.time_provider.now_iso());
        let line = event.to_json_line()?;

        self.append_line(&line).await?;

        if self.echo_stdout {
            // A closed stdout only loses the echo; the file line is already written
            if let Err(e) = writeln!(std::io::stdout().lock(), "{}", line) {
                debug!(error = %e, "Diagnostic echo to stdout failed");
            }
        }
        Ok(())
    }
}
