// Measurement executor
// Runs the external speedtest command and classifies its outcome.
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::{CaptureConfig, ReasonCode};
use crate::port::CommandRunner;

/// How a stderr rule inspects the text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StderrMatcher {
    /// Case-sensitive substring
    Contains(&'static str),
    /// Case-insensitive substring (needle must be lowercase)
    ContainsIgnoreCase(&'static str),
    /// Nothing was written to stderr
    Empty,
}

impl StderrMatcher {
    pub fn matches(&self, stderr: &str) -> bool {
        match self {
            StderrMatcher::Contains(needle) => stderr.contains(needle),
            StderrMatcher::ContainsIgnoreCase(needle) => stderr.to_lowercase().contains(needle),
            StderrMatcher::Empty => stderr.is_empty(),
        }
    }
}

/// Stderr classification rules, tried in order; first match wins
///
/// This table is a contract with the measurement tool's message text.
/// Anything unmatched is `SPEEDTEST_ERROR`.
pub const STDERR_RULES: &[(StderrMatcher, ReasonCode)] = &[
    (
        StderrMatcher::Contains("NotFoundException"),
        ReasonCode::SpeedtestIfaceNotFound,
    ),
    (
        StderrMatcher::Contains("Network unreachable"),
        ReasonCode::SpeedtestNetUnreach,
    ),
    (
        StderrMatcher::ContainsIgnoreCase("timeout"),
        ReasonCode::SpeedtestTimeout,
    ),
    (
        StderrMatcher::ContainsIgnoreCase("permission denied"),
        ReasonCode::SpeedtestPermission,
    ),
    (StderrMatcher::Empty, ReasonCode::SpeedtestUnknown),
];

/// Map measurement stderr to a reason code
pub fn classify_stderr(stderr: &str) -> ReasonCode {
    STDERR_RULES
        .iter()
        .find(|(matcher, _)| matcher.matches(stderr))
        .map(|(_, reason)| *reason)
        .unwrap_or(ReasonCode::SpeedtestError)
}

/// Classified result of one measurement command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeasurementOutcome {
    /// Non-zero exit
    Failed {
        reason: ReasonCode,
        exit_code: i32,
        stderr: String,
    },
    /// Zero exit but nothing on stdout
    Empty,
    /// Zero exit with output, still to be validated
    Output(String),
}

/// Measurement executor
pub struct MeasurementExecutor {
    runner: Arc<dyn CommandRunner>,
    command_line: String,
    timeout: Duration,
}

impl MeasurementExecutor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        command_line: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            command_line: command_line.into(),
            timeout,
        }
    }

    pub fn from_config(runner: Arc<dyn CommandRunner>, config: &CaptureConfig) -> Self {
        Self::new(runner, config.speedtest_cmd.clone(), config.cmd_timeout)
    }

    /// Run the measurement command once
    pub async fn execute(&self) -> MeasurementOutcome {
        info!(command = %self.command_line, "Running measurement command");
        let output = self.runner.run(&self.command_line, self.timeout).await;

        if !output.success() {
            let reason = classify_stderr(&output.stderr);
            warn!(
                exit_code = output.exit_code,
                reason = %reason,
                "Measurement command failed"
            );
            return MeasurementOutcome::Failed {
                reason,
                exit_code: output.exit_code,
                stderr: output.stderr,
            };
        }

        if output.stdout.is_empty() {
            return MeasurementOutcome::Empty;
        }

        MeasurementOutcome::Output(output.stdout)
    }
}
