// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::process::{
    EnvironmentDriver, EnvironmentError, ProcessError, ProcessExecutor, ProcessOutput,
};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Runs command lines through `sh -c`. The child is killed if the timeout
/// elapses.
#[derive(Debug, Default, Clone)]
pub struct ShellExecutor;

#[async_trait]
impl ProcessExecutor for ShellExecutor {
    async fn execute(
        &self,
        command_line: &str,
        working_dir: Option<&Path>,
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        debug!(command = command_line, "Spawning shell command");
        let child = command
            .spawn()
            .map_err(|e| ProcessError::Spawn(e.to_string()))?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ProcessError::Timeout(timeout))?
            .map_err(|e| ProcessError::Spawn(e.to_string()))?;

        Ok(ProcessOutput {
            // killed by signal
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Drives a compose project rooted at a working directory.
pub struct ComposeDriver {
    executor: Arc<dyn ProcessExecutor>,
    compose_command: String,
    timeout: Duration,
}

impl ComposeDriver {
    pub fn new(executor: Arc<dyn ProcessExecutor>, compose_command: String, timeout: Duration) -> Self {
        Self {
            executor,
            compose_command,
            timeout,
        }
    }

    async fn run(&self, dir: &Path, args: &str) -> Result<ProcessOutput, EnvironmentError> {
        let command_line = format!("{} {}", self.compose_command, args);
        let output = self.executor.execute(&command_line, Some(dir), self.timeout).await?;
        if !output.success() {
            return Err(EnvironmentError::NonZeroExit {
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl EnvironmentDriver for ComposeDriver {
    async fn up(&self, dir: &Path) -> Result<ProcessOutput, EnvironmentError> {
        info!(dir = %dir.display(), "Bringing environment up");
        self.run(dir, "up -d").await
    }

    async fn down(&self, dir: &Path) -> Result<ProcessOutput, EnvironmentError> {
        info!(dir = %dir.display(), "Tearing environment down");
        self.run(dir, "down -v --remove-orphans").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shell_captures_output_and_exit_code() {
        let out = ShellExecutor
            .execute("echo hello; echo oops 1>&2; exit 3", None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_shell_timeout() {
        let err = ShellExecutor
            .execute("sleep 5", None, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_compose_non_zero_exit_is_error() {
        let dir = tempfile::tempdir().unwrap();
        // `false` stands in for a compose binary that fails
        let driver = ComposeDriver::new(Arc::new(ShellExecutor), "false".to_string(), Duration::from_secs(5));
        let err = driver.up(dir.path()).await.unwrap_err();
        assert!(matches!(err, EnvironmentError::NonZeroExit { exit_code: 1, .. }));
    }
}
