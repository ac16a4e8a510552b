//! Error types for tool invocations.

use thiserror::Error;

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors that can occur while running an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0} not found in PATH")]
    NotFound(String),

    #[error("Invalid tool command: {0:?}")]
    InvalidCommand(String),

    #[error("Failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with status {}", exit_status_text(.exit_code))]
    Failed {
        tool: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("{tool} timed out after {seconds} seconds")]
    Timeout { tool: String, seconds: u64 },

    #[error("{0} cancelled")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_status_text(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

impl ToolError {
    /// Create a spawn failure error.
    pub fn spawn(tool: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            tool: tool.into(),
            source,
        }
    }

    /// Create a non-zero exit error.
    pub fn failed(
        tool: impl Into<String>,
        exit_code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::Failed {
            tool: tool.into(),
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// The tool's diagnostic stream, when one was captured.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ToolError::Failed { stderr, .. } => Some(stderr.as_str()),
            _ => None,
        }
    }

    /// Diagnostic detail suitable for surfacing to a client.
    ///
    /// Captured stderr is returned verbatim; errors without a process
    /// diagnostic stream fall back to their display text.
    pub fn diagnostic(&self) -> String {
        match self.stderr() {
            Some(stderr) => stderr.to_string(),
            None => self.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ToolError::Timeout { .. })
    }
}
