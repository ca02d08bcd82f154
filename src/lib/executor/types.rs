use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::queue::QueuedTask;
use crate::tasks::types::{Command, CommandState, JobId, TaskId, TaskSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionOutcome {
    Success,
    Failure,
}

/// Outcome of running a task. `exit_codes[i]` belongs to `commands[i]`;
/// `None` means the exit code could not be determined.
#[derive(Debug, Clone)]
pub struct TaskExecutionResult {
    pub outcome: ExecutionOutcome,
    pub exit_codes: Vec<Option<i32>>,
    pub commands: Vec<Command>,
}

impl TaskExecutionResult {
    /// Builds the result from the final command states. The outcome is a
    /// success only if every command ran to completion; exit statuses are
    /// reported, not judged.
    pub fn from_commands(commands: Vec<Command>) -> Self {
        let outcome = if commands.iter().all(Command::succeeded) {
            ExecutionOutcome::Success
        } else {
            ExecutionOutcome::Failure
        };
        let exit_codes = commands.iter().map(|c| c.exit_code).collect();
        TaskExecutionResult {
            outcome,
            exit_codes,
            commands,
        }
    }

    /// A failure where no command could run: every unfinished command is
    /// FAILED with an undetermined exit code.
    pub fn failed(mut commands: Vec<Command>) -> Self {
        for command in &mut commands {
            if matches!(command.state, CommandState::Pending | CommandState::Running) {
                command.fail();
            }
        }
        let exit_codes = commands.iter().map(|c| c.exit_code).collect();
        TaskExecutionResult {
            outcome: ExecutionOutcome::Failure,
            exit_codes,
            commands,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ExecutionOutcome::Success
    }
}

/// Everything an executor needs to run one task. The command list is the
/// executor's to mutate; it comes back in the result.
#[derive(Debug, Clone)]
pub struct ExecutionTask {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub spec: Arc<TaskSpec>,
    pub commands: Vec<Command>,
    pub cancel: CancellationToken,
}

impl ExecutionTask {
    pub fn from_queued(queued: &QueuedTask) -> Self {
        ExecutionTask {
            task_id: queued.task_id,
            job_id: queued.job_id,
            spec: Arc::clone(&queued.spec),
            commands: queued.pending_commands(),
            cancel: queued.cancel.clone(),
        }
    }
}

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Short name of the executor variant, e.g. `raw` or `docker`.
    fn kind(&self) -> &'static str;

    /// Runs every command of `task` in order. Never fails as a whole: errors
    /// are reported through command states and the outcome.
    async fn execute(&self, task: ExecutionTask) -> TaskExecutionResult;

    fn metadata(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Why a single command produced no exit code.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to spawn command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to wait for command: {0}")]
    Wait(#[source] std::io::Error),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("command terminated by a signal")]
    Terminated,

    #[error("task was cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(code: i32) -> Command {
        let mut c = Command::new("x");
        c.start();
        c.complete(code);
        c
    }

    #[test]
    fn all_finished_commands_make_a_success() {
        let result = TaskExecutionResult::from_commands(vec![finished(0), finished(0)]);
        assert!(result.is_success());
        assert_eq!(result.exit_codes, vec![Some(0), Some(0)]);
    }

    #[test]
    fn non_zero_exit_codes_are_still_a_success() {
        let result = TaskExecutionResult::from_commands(vec![finished(0), finished(3)]);
        assert!(result.is_success());
        assert_eq!(result.exit_codes, vec![Some(0), Some(3)]);
    }

    #[test]
    fn any_failed_command_makes_a_failure() {
        let mut undetermined = Command::new("x");
        undetermined.start();
        undetermined.fail();

        let result =
            TaskExecutionResult::from_commands(vec![finished(0), undetermined, finished(0)]);
        assert_eq!(result.outcome, ExecutionOutcome::Failure);
        assert_eq!(result.exit_codes, vec![Some(0), None, Some(0)]);
    }

    #[test]
    fn failed_result_marks_every_command_undetermined() {
        let result = TaskExecutionResult::failed(vec![Command::new("a"), Command::new("b")]);
        assert_eq!(result.outcome, ExecutionOutcome::Failure);
        assert_eq!(result.exit_codes, vec![None, None]);
        assert!(result.commands.iter().all(|c| c.state == CommandState::Failed));
    }
}
