// Command Runner Port
// Abstraction for invoking external commands (link/address/route queries,
// gateway probe, measurement tool) without ever going through a shell.
use async_trait::async_trait;
use std::time::Duration;

/// Exit code reported when the command line cannot be split into words
pub const PARSE_FAILURE_EXIT_CODE: i32 = 2;

/// Exit code reported when the process hit its deadline and was killed
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the process could not be launched at all
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Result triple of one command invocation
///
/// Both streams are trimmed of trailing whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into().trim_end().to_string(),
            stderr: stderr.into().trim_end().to_string(),
        }
    }

    /// Successful run with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::new(0, stdout, "")
    }

    /// Failed run with the given exit code and stderr
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::new(exit_code, "", stderr)
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Split a command line into argv using POSIX shell-word rules
///
/// Quotes and backslashes are honoured; nothing is expanded. Returns `None`
/// for unbalanced quoting or an empty line.
pub fn split_command_line(command_line: &str) -> Option<Vec<String>> {
    shlex::split(command_line).filter(|argv| !argv.is_empty())
}

/// Command runner trait
///
/// Implementations:
/// - SubprocessRunner: spawns a child process with a deadline
/// - mocks::FakeCommandRunner: scripted outputs plus a call log
///
/// Never returns an error: launch failures and timeouts come back as a
/// synthetic non-zero exit code with a description in `stderr`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Execute an already-split argument vector
    async fn run_argv(&self, argv: &[String], timeout: Duration) -> CommandOutput;

    /// Split a command line with shell-word rules and execute it
    async fn run(&self, command_line: &str, timeout: Duration) -> CommandOutput {
        match split_command_line(command_line) {
            Some(argv) => self.run_argv(&argv, timeout).await,
            None => CommandOutput::failed(
                PARSE_FAILURE_EXIT_CODE,
                format!("invalid command line: {:?}", command_line),
            ),
        }
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Scripted command runner
    ///
    /// Responses are matched by prefix against the space-joined argv; the
    /// first registered prefix that matches wins. Unmatched commands fail
    /// like a missing binary.
    #[derive(Default)]
    pub struct FakeCommandRunner {
        responses: Arc<Mutex<Vec<(String, CommandOutput)>>>,
        calls: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl FakeCommandRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register the output for commands starting with `prefix`
        pub fn on(self, prefix: impl Into<String>, output: CommandOutput) -> Self {
            self.responses.lock().unwrap().push((prefix.into(), output));
            self
        }

        /// Every argv received, in call order
        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        /// Calls joined into single strings
        pub fn call_lines(&self) -> Vec<String> {
            self.calls().iter().map(|argv| argv.join(" ")).collect()
        }

        /// Whether any call started with `prefix`
        pub fn was_called(&self, prefix: &str) -> bool {
            self.call_lines().iter().any(|line| line.starts_with(prefix))
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeCommandRunner {
        async fn run_argv(&self, argv: &[String], _timeout: Duration) -> CommandOutput {
            self.calls.lock().unwrap().push(argv.to_vec());

            let line = argv.join(" ");
            self.responses
                .lock()
                .unwrap()
                .iter()
                .find(|(prefix, _)| line.starts_with(prefix.as_str()))
                .map(|(_, output)| output.clone())
                .unwrap_or_else(|| {
                    CommandOutput::failed(
                        SPAWN_FAILURE_EXIT_CODE,
                        format!("fake: no scripted response for {:?}", line),
                    )
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::FakeCommandRunner;
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn test_split_respects_quotes() {
        let argv = split_command_line(r#"speedtest --server "My Server" --format='csv'"#).unwrap();
        assert_eq!(argv, vec!["speedtest", "--server", "My Server", "--format=csv"]);
    }

    #[test]
    fn test_split_does_not_expand() {
        let argv = split_command_line("echo $HOME; rm -rf / | cat").unwrap();
        assert_eq!(argv, vec!["echo", "$HOME;", "rm", "-rf", "/", "|", "cat"]);
    }

    #[test]
    fn test_split_rejects_unbalanced_and_empty() {
        assert!(split_command_line("speedtest \"unterminated").is_none());
        assert!(split_command_line("   ").is_none());
    }

    #[test]
    fn test_output_trims_trailing_whitespace() {
        let output = CommandOutput::new(0, "line\n\n", "warn  \n");
        assert_eq!(output.stdout, "line");
        assert_eq!(output.stderr, "warn");
        assert!(output.success());
    }

    #[tokio::test]
    async fn test_run_splits_before_dispatch() {
        let runner = FakeCommandRunner::new().on("speedtest --format=csv", CommandOutput::ok("x"));

        let output = runner.run("speedtest '--format=csv'", TIMEOUT).await;

        assert_eq!(output.stdout, "x");
        assert_eq!(runner.calls(), vec![vec!["speedtest", "--format=csv"]]);
    }

    #[tokio::test]
    async fn test_run_reports_parse_failure_without_dispatch() {
        let runner = FakeCommandRunner::new();

        let output = runner.run("speedtest 'oops", TIMEOUT).await;

        assert_eq!(output.exit_code, PARSE_FAILURE_EXIT_CODE);
        assert!(output.stderr.contains("invalid command line"));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fake_unmatched_command_fails() {
        let runner = FakeCommandRunner::new();
        let output = runner
            .run_argv(&["ping".to_string(), "-c".to_string()], TIMEOUT)
            .await;
        assert_eq!(output.exit_code, SPAWN_FAILURE_EXIT_CODE);
        assert!(runner.was_called("ping"));
    }
}
