use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::executor::types::TaskExecutionResult;
use crate::queue::QueuedTask;
use crate::resource::pool::ResourcePool;
use crate::tasks::types::{JobId, TaskId};

/// A (task, resource) pairing chosen by a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub task_id: TaskId,
    pub resource_id: String,
}

/// Decides which queued task runs next and where.
///
/// `select` runs while the scheduler holds the queue lock and must not
/// block. It only proposes; leasing is done by the scheduler.
pub trait SchedulerPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn select(&self, queue: &VecDeque<QueuedTask>, pool: &dyn ResourcePool) -> Option<Allocation>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    #[default]
    Fifo,
    SkipAhead,
}

impl PolicyKind {
    pub fn build(self) -> Box<dyn SchedulerPolicy> {
        match self {
            PolicyKind::Fifo => Box::new(super::policy::FifoSchedulerPolicy),
            PolicyKind::SkipAhead => Box::new(super::policy::SkipAheadSchedulerPolicy),
        }
    }
}

/// Sent by an execution worker when its task is done. `result` is `Err` when
/// the worker itself died.
#[derive(Debug)]
pub struct Completion {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub resource_id: String,
    pub result: Result<TaskExecutionResult, String>,
}
