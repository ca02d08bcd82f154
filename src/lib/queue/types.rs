use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::tasks::types::{Command, JobId, Task, TaskId, TaskSpec, TaskState};

/// What the queue keeps about a task waiting for a resource.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub spec: Arc<TaskSpec>,
    pub cancel: CancellationToken,
}

impl QueuedTask {
    pub fn from_task(task: &Task) -> Self {
        QueuedTask {
            task_id: task.id,
            job_id: task.job_id,
            spec: Arc::new(task.spec.clone()),
            cancel: task.cancel.clone(),
        }
    }

    /// Fresh command list for execution, every command PENDING.
    pub fn pending_commands(&self) -> Vec<Command> {
        self.spec.commands().iter().map(Command::new).collect()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("task {0} is already queued")]
    AlreadyQueued(TaskId),

    #[error("task {task_id} is in terminal state {state}")]
    Terminal { task_id: TaskId, state: TaskState },

    #[error("task {task_id} cannot be queued from state {state}")]
    NotReady { task_id: TaskId, state: TaskState },
}
