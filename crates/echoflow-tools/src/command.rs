//! Tool command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ToolError, ToolResult};

/// Builder for an external tool invocation.
///
/// Tools are executed directly, never through a shell, so arguments are
/// passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Human-readable tool name used in logs and errors
    name: String,
    /// Program to execute
    program: String,
    /// Arguments, in order
    args: Vec<String>,
    /// Kill the tool if it runs longer than this
    timeout: Option<Duration>,
}

impl ToolCommand {
    /// Create a new command for `program`.
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Build a command from a command line such as
    /// `python3 video_preprocess.py`.
    ///
    /// Words are split with POSIX shell quoting rules, so a program path
    /// containing spaces can be quoted. Nothing is expanded.
    pub fn parse(name: impl Into<String>, command_line: &str) -> ToolResult<Self> {
        let words = shell_words::split(command_line)
            .map_err(|e| ToolError::InvalidCommand(format!("{command_line}: {e}")))?;
        let mut words = words.into_iter();
        let program = words
            .next()
            .ok_or_else(|| ToolError::InvalidCommand(command_line.to_string()))?;
        Ok(Self::new(name, program).args(words))
    }

    /// Add one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add a path argument.
    pub fn path_arg(self, path: impl AsRef<Path>) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The full command line, for logging.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a successful tool run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl ToolOutput {
    /// Output with the given stdout and a zero exit code.
    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: Some(0),
            ..Default::default()
        }
    }
}

/// Something that can execute a [`ToolCommand`].
///
/// The orchestrator only talks to tools through this trait.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run the command to completion.
    ///
    /// Returns `ToolError::Failed` on a non-zero exit, with stderr captured.
    async fn run(&self, cmd: &ToolCommand) -> ToolResult<ToolOutput>;
}

/// Runner for tool commands with timeout and cancellation.
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl ToolRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self { cancel_rx: None }
    }

    /// Set cancellation signal. Sending `true` kills every tool still running.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }
}

#[async_trait]
impl ProcessRunner for ToolRunner {
    async fn run(&self, cmd: &ToolCommand) -> ToolResult<ToolOutput> {
        which::which(cmd.program()).map_err(|_| ToolError::NotFound(cmd.program().to_string()))?;

        debug!(tool = %cmd.name(), "Running: {}", cmd.display());
        let started = Instant::now();

        // kill_on_drop: abandoning the wait below (timeout, cancel, or the
        // request future being dropped) takes the child down with it.
        let child = Command::new(cmd.program())
            .args(cmd.get_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::spawn(cmd.name(), e))?;

        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = sleep_for(cmd.get_timeout()) => {
                let seconds = cmd.get_timeout().map(|t| t.as_secs()).unwrap_or_default();
                warn!(tool = %cmd.name(), "Timed out after {} seconds, killing process", seconds);
                return Err(ToolError::Timeout {
                    tool: cmd.name().to_string(),
                    seconds,
                });
            }
            _ = cancelled(self.cancel_rx.clone()) => {
                info!(tool = %cmd.name(), "Cancelled, killing process");
                return Err(ToolError::Cancelled(cmd.name().to_string()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(ToolError::failed(
                cmd.name(),
                output.status.code(),
                stdout,
                stderr,
            ));
        }

        Ok(ToolOutput {
            stdout,
            stderr,
            exit_code: output.status.code(),
            duration: started.elapsed(),
        })
    }
}

async fn sleep_for(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

/// Resolves once the cancel flag flips to `true`; never if there is no
/// channel or the sender is gone.
async fn cancelled(cancel_rx: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = cancel_rx else {
        return std::future::pending().await;
    };

    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

/// Check that a tool's program is available.
pub fn check_tool(program: &str) -> ToolResult<PathBuf> {
    which::which(program).map_err(|_| ToolError::NotFound(program.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("test-tool", "sh").arg("-c").arg(script)
    }

    #[test]
    fn test_command_builder() {
        let cmd = ToolCommand::parse("preprocess", "python3  video_preprocess.py")
            .unwrap()
            .path_arg("/data/Videos/3_5_9_7_2.mp4")
            .arg("FileList.csv");

        assert_eq!(cmd.program(), "python3");
        assert_eq!(
            cmd.get_args(),
            &["video_preprocess.py", "/data/Videos/3_5_9_7_2.mp4", "FileList.csv"]
        );
        assert_eq!(
            cmd.display(),
            "python3 video_preprocess.py /data/Videos/3_5_9_7_2.mp4 FileList.csv"
        );
    }

    #[test]
    fn test_parse_rejects_empty_command() {
        assert!(matches!(
            ToolCommand::parse("x", "   "),
            Err(ToolError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_parse_quoted_program_path() {
        let cmd = ToolCommand::parse(
            "positions",
            r#""/opt/echo tools/bin/python3" 'get three positions.py' --fast"#,
        )
        .unwrap();

        assert_eq!(cmd.program(), "/opt/echo tools/bin/python3");
        assert_eq!(cmd.get_args(), &["get three positions.py", "--fast"]);
    }

    #[test]
    fn test_parse_rejects_unbalanced_quote() {
        assert!(matches!(
            ToolCommand::parse("x", r#"python3 "unterminated.py"#),
            Err(ToolError::InvalidCommand(_))
        ));
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let output = ToolRunner::new()
            .run(&sh("printf '{\"2\": [1, 2]}'"))
            .await
            .unwrap();

        assert_eq!(output.stdout, "{\"2\": [1, 2]}");
        assert_eq!(output.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_non_zero_exit_keeps_stderr() {
        let err = ToolRunner::new()
            .run(&sh("echo 'model weights missing' >&2; exit 3"))
            .await
            .unwrap_err();

        match err {
            ToolError::Failed {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr, "model weights missing\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = ToolRunner::new()
            .run(&ToolCommand::new("ghost", "definitely-not-a-real-tool-xyz"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = format!("sleep 2; touch {}", marker.display());

        let started = Instant::now();
        let err = ToolRunner::new()
            .run(&sh(&script).timeout(Duration::from_millis(200)))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(2));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!marker.exists(), "killed tool must not finish its work");
    }

    #[tokio::test]
    async fn test_cancel_kills_process() {
        let (tx, rx) = watch::channel(false);
        let runner = ToolRunner::new().with_cancel(rx);

        let handle = tokio::spawn(async move { runner.run(&sh("sleep 5")).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, ToolError::Cancelled(_)));
    }

    #[test]
    fn test_check_tool() {
        assert!(check_tool("sh").is_ok());
        assert!(check_tool("definitely-not-a-real-tool-xyz").is_err());
    }
}
