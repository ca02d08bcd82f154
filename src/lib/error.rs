use thiserror::Error;

use crate::docker::types::ContainerError;
use crate::queue::QueueError;
use crate::resource::types::PoolError;
use crate::tasks::types::{JobId, TaskId, TaskState};

#[derive(Error, Debug)]
pub enum ArrebolError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskState,
        to: TaskState,
    },

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ArrebolError>;
