//! External tool invocation with a deadline.
//!
//! Every packaging, repository and version-control tool is run through
//! [`run`] so that a hung process surfaces as an error instead of blocking
//! the pipeline forever.

use std::process::{ExitStatus, Output};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

/// Lines of stderr kept in [`ToolError::Failed`].
const STDERR_TAIL_LINES: usize = 20;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("{program} failed ({status}):\n{stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

impl ToolError {
    /// Exit code of a failed invocation, if the process exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { status, .. } => status.code(),
            _ => None,
        }
    }
}

/// Run `cmd` to completion, capturing its output, and kill it if it
/// outlives `timeout`. The exit status is not checked.
///
/// # Errors
///
/// Returns [`ToolError::Spawn`] if the process cannot be started and
/// [`ToolError::Timeout`] if the deadline passes.
pub async fn output(cmd: &mut Command, timeout: Duration) -> Result<Output, ToolError> {
    let program = program_name(cmd);
    tracing::debug!("Running {:?}", cmd.as_std());

    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(ToolError::Spawn { program, source }),
        Err(_) => Err(ToolError::Timeout { program, timeout }),
    }
}

/// Like [`output`], but a non-zero exit is an error.
///
/// # Errors
///
/// Additionally returns [`ToolError::Failed`] with the tail of stderr when
/// the process exits unsuccessfully.
pub async fn run(cmd: &mut Command, timeout: Duration) -> Result<Output, ToolError> {
    let program = program_name(cmd);
    let output = output(cmd, timeout).await?;
    if !output.status.success() {
        return Err(ToolError::Failed {
            program,
            status: output.status,
            stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL_LINES),
        });
    }
    Ok(output)
}

fn program_name(cmd: &Command) -> String {
    cmd.as_std().get_program().to_string_lossy().into_owned()
}

/// Last `n` lines of `text`.
fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
