//! Wrapper for the external ML command-line tools.
//!
//! This crate provides:
//! - A command builder for tool invocations (program + argument vector)
//! - A runner that captures stdout/stderr, enforces a timeout and kills
//!   the child on expiry or cancellation
//! - The `ProcessRunner` seam used by the pipeline orchestrator
//! - Tool availability checks and create-new file writes

pub mod command;
pub mod error;
pub mod fs_utils;

pub use command::{check_tool, ProcessRunner, ToolCommand, ToolOutput, ToolRunner};
pub use error::{ToolError, ToolResult};
pub use fs_utils::{ensure_dir, write_new_file, WriteOutcome};
