// Subprocess runner implementation
// reason: tokio for async process management with a hard deadline
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use speedtest_telemetry_core::port::command_runner::{
    CommandOutput, CommandRunner, PARSE_FAILURE_EXIT_CODE, SPAWN_FAILURE_EXIT_CODE,
    TIMEOUT_EXIT_CODE,
};

/// Subprocess runner
///
/// Spawns the program directly from an argv (no shell), captures both
/// streams and kills the child when the deadline passes.
#[derive(Debug, Default, Clone)]
pub struct SubprocessRunner;

impl SubprocessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Spawn child process and wait for output
    async fn spawn_and_wait(
        &self,
        program: &str,
        args: &[String],
        deadline: Duration,
    ) -> Result<std::process::Output, CommandOutput> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CommandOutput::failed(
                    SPAWN_FAILURE_EXIT_CODE,
                    format!("failed to launch {}: {}", program, e),
                )
            })?;

        // Dropping the wait future on timeout drops the child, which kills it
        match timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(CommandOutput::failed(
                SPAWN_FAILURE_EXIT_CODE,
                format!("failed to collect output of {}: {}", program, e),
            )),
            Err(_) => Err(CommandOutput::failed(
                TIMEOUT_EXIT_CODE,
                format!("timeout: command exceeded {}ms deadline", deadline.as_millis()),
            )),
        }
    }

    /// Build command output from process output
    fn build_result(&self, output: std::process::Output) -> CommandOutput {
        CommandOutput::new(
            exit_code(output.status),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        )
    }
}

/// Numeric exit code, `128 + signal` for signal deaths (shell convention)
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

#[async_trait]
impl CommandRunner for SubprocessRunner {
    async fn run_argv(&self, argv: &[String], deadline: Duration) -> CommandOutput {
        let Some((program, args)) = argv.split_first() else {
            return CommandOutput::failed(PARSE_FAILURE_EXIT_CODE, "empty command");
        };

        let started = Instant::now();
        debug!(
            program = %program,
            args = ?args,
            timeout_secs = deadline.as_secs(),
            "Starting subprocess"
        );

        let result = match self.spawn_and_wait(program, args, deadline).await {
            Ok(output) => self.build_result(output),
            Err(synthetic) => {
                warn!(
                    program = %program,
                    exit_code = synthetic.exit_code,
                    stderr = %synthetic.stderr,
                    "Subprocess did not complete"
                );
                synthetic
            }
        };

        debug!(
            program = %program,
            exit_code = result.exit_code,
            duration_ms = started.elapsed().as_millis() as u64,
            "Subprocess finished"
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEADLINE: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_run_success_trims_output() {
        let output = SubprocessRunner::new().run("echo hello", DEADLINE).await;

        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.stderr, "");
    }

    #[tokio::test]
    async fn test_quoted_argument_stays_one_word() {
        let output = SubprocessRunner::new()
            .run("printf '%s|' 'a b' \"c d\"", DEADLINE)
            .await;

        assert_eq!(output.stdout, "a b|c d|");
    }

    #[tokio::test]
    async fn test_no_shell_interpretation() {
        let output = SubprocessRunner::new()
            .run("echo $HOME && echo pwned", DEADLINE)
            .await;

        assert_eq!(output.stdout, "$HOME && echo pwned");
    }

    #[tokio::test]
    async fn test_nonzero_exit_code() {
        let output = SubprocessRunner::new().run("false", DEADLINE).await;
        assert_ne!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn test_missing_binary_is_synthetic_failure() {
        let output = SubprocessRunner::new()
            .run("/nonexistent/speedtest-telemetry --format=csv", DEADLINE)
            .await;

        assert_eq!(output.exit_code, SPAWN_FAILURE_EXIT_CODE);
        assert!(output.stderr.contains("failed to launch"));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let started = Instant::now();
        let output = SubprocessRunner::new()
            .run("sleep 10", Duration::from_millis(200))
            .await;

        assert_eq!(output.exit_code, TIMEOUT_EXIT_CODE);
        assert!(output.stderr.contains("timeout"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_empty_argv() {
        let output = SubprocessRunner::new().run_argv(&[], DEADLINE).await;
        assert_eq!(output.exit_code, PARSE_FAILURE_EXIT_CODE);
    }
}
