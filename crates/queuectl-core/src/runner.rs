//! Command execution seam.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

/// Executes one job's command.
///
/// The core only cares about success/failure, not output. The error string
/// is recorded on the job as `last_error`. Tests substitute their own
/// implementations.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<(), String>;
}

/// Runs the command through `sh -c`, discarding stdout/stderr.
///
/// A command that cannot even be launched is reported the same way as one
/// that exits non-zero.
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> Result<(), String> {
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| format!("failed to launch command: {e}"))?;

        if status.success() {
            Ok(())
        } else {
            Err(format!("command exited with {status}"))
        }
    }
}
