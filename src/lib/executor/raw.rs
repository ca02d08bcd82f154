use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command as Process;
use tokio_util::sync::CancellationToken;

use super::types::{CommandError, ExecutionTask, TaskExecutionResult, TaskExecutor};

const DEFAULT_SHELL: &str = "/bin/sh";

/// Runs commands as local shell processes, one after the other.
///
/// Output is not captured. The task's environment variables are passed to
/// every process.
#[derive(Debug, Clone)]
pub struct RawTaskExecutor {
    shell: String,
    command_timeout: Option<Duration>,
}

impl RawTaskExecutor {
    pub fn new(command_timeout: Option<Duration>) -> Self {
        RawTaskExecutor {
            shell: DEFAULT_SHELL.to_string(),
            command_timeout,
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    async fn run_command(
        &self,
        command: &str,
        env_vars: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<i32, CommandError> {
        let mut child = Process::new(&self.shell)
            .arg("-c")
            .arg(command)
            .envs(env_vars)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(CommandError::Spawn)?;

        let status = tokio::select! {
            status = wait_bounded(&mut child, self.command_timeout) => status?,
            _ = cancel.cancelled() => return Err(CommandError::Cancelled),
        };

        status.code().ok_or(CommandError::Terminated)
    }
}

async fn wait_bounded(
    child: &mut tokio::process::Child,
    limit: Option<Duration>,
) -> Result<std::process::ExitStatus, CommandError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, child.wait())
            .await
            .map_err(|_| CommandError::Timeout(limit))?
            .map_err(CommandError::Wait),
        None => child.wait().await.map_err(CommandError::Wait),
    }
}

impl Default for RawTaskExecutor {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl TaskExecutor for RawTaskExecutor {
    fn kind(&self) -> &'static str {
        "raw"
    }

    async fn execute(&self, mut task: ExecutionTask) -> TaskExecutionResult {
        tracing::info!(task_id = %task.task_id, commands = task.commands.len(), "Executing task");

        let env_vars = task.spec.env_vars().clone();
        for (cmd_index, command) in task.commands.iter_mut().enumerate() {
            if task.cancel.is_cancelled() {
                tracing::warn!(task_id = %task.task_id, cmd_index, "Task cancelled, skipping command");
                command.fail();
                continue;
            }

            command.start();
            match self
                .run_command(&command.command, &env_vars, &task.cancel)
                .await
            {
                Ok(exit_code) => {
                    command.complete(exit_code);
                    tracing::debug!(
                        task_id = %task.task_id,
                        cmd_index,
                        cmd = %command.command,
                        exit_code,
                        "Command finished"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        task_id = %task.task_id,
                        cmd_index,
                        cmd = %command.command,
                        error = %e,
                        "Command failed"
                    );
                    command.fail();
                }
            }
        }

        TaskExecutionResult::from_commands(task.commands)
    }
}
