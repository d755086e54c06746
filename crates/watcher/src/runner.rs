//! External test runner invocation.
//!
//! [`CommandRunner`] spawns the configured program once per retry, scoped to
//! a single test title, and maps its exit status to a [`TestOutcome`]. No
//! timeout is applied; the runner enforces its own.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Maximum stdout or stderr size captured per stream (1 MiB).
const MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

/// Placeholder in runner arguments replaced by the test title.
pub const TITLE_PLACEHOLDER: &str = "{title}";

/// How a test execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed,
}

/// The runner could not produce a pass or fail verdict.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to start test runner: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed waiting for test runner: {0}")]
    Wait(#[source] std::io::Error),

    /// Exit code other than 0 or 1; `None` when killed by a signal.
    #[error("test runner exited unexpectedly (code {code:?})")]
    UnexpectedExit { code: Option<i32> },
}

/// Executes one test by title.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    async fn execute(&self, test_title: &str) -> Result<TestOutcome, ExecutionError>;
}

/// Runs `program args...` with every `{title}` in `args` substituted.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            workdir: None,
        }
    }

    pub fn with_workdir(mut self, workdir: Option<PathBuf>) -> Self {
        self.workdir = workdir;
        self
    }

    fn command(&self, test_title: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(
            self.args
                .iter()
                .map(|arg| arg.replace(TITLE_PLACEHOLDER, test_title)),
        );
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl TestExecutor for CommandRunner {
    async fn execute(&self, test_title: &str) -> Result<TestOutcome, ExecutionError> {
        let mut cmd = self.command(test_title);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(ExecutionError::Spawn)?;

        // Pipes must be drained while waiting or a full pipe stalls the child.
        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        let status = child.wait().await.map_err(ExecutionError::Wait)?;

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        tracing::debug!(
            test_title,
            stdout = %String::from_utf8_lossy(&stdout),
            stderr = %String::from_utf8_lossy(&stderr),
            "Test runner output",
        );

        outcome_from_status(status)
    }
}

fn outcome_from_status(status: ExitStatus) -> Result<TestOutcome, ExecutionError> {
    match status.code() {
        Some(0) => Ok(TestOutcome::Passed),
        Some(1) => Ok(TestOutcome::Failed),
        code => Err(ExecutionError::UnexpectedExit { code }),
    }
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn sh(script: &str) -> CommandRunner {
        CommandRunner::new("sh", vec!["-c".into(), script.into()])
    }

    #[tokio::test]
    async fn exit_zero_is_passed() {
        assert_matches!(sh("exit 0").execute("t").await, Ok(TestOutcome::Passed));
    }

    #[tokio::test]
    async fn exit_one_is_failed() {
        assert_matches!(sh("echo boom >&2; exit 1").execute("t").await, Ok(TestOutcome::Failed));
    }

    #[tokio::test]
    async fn other_codes_are_unexpected() {
        assert_matches!(
            sh("exit 3").execute("t").await,
            Err(ExecutionError::UnexpectedExit { code: Some(3) })
        );
    }

    #[tokio::test]
    async fn signal_death_is_unexpected() {
        assert_matches!(
            sh("kill -9 $$").execute("t").await,
            Err(ExecutionError::UnexpectedExit { code: None })
        );
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let runner = CommandRunner::new("/nonexistent/pulseboard-runner", vec![]);
        assert_matches!(runner.execute("t").await, Err(ExecutionError::Spawn(_)));
    }

    #[tokio::test]
    async fn title_is_substituted_into_arguments() {
        // Passes only when the substituted argument equals the title.
        let runner = CommandRunner::new(
            "sh",
            vec![
                "-c".into(),
                r#"[ "$1" = "--grep=cart total" ]"#.into(),
                "runner".into(),
                "--grep={title}".into(),
            ],
        );
        assert_matches!(runner.execute("cart total").await, Ok(TestOutcome::Passed));
        assert_matches!(runner.execute("other").await, Ok(TestOutcome::Failed));
    }
}
