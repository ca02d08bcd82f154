use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use uuid::Uuid;

use super::types::{QueueError, QueuedTask};
use crate::tasks::types::{Task, TaskId, TaskState};

/// FIFO holding area for tasks that are ready to run but have no resource yet.
///
/// Producers (job submission) and the scheduler loop share it; every
/// operation runs under one short, non-async critical section. The queue has
/// no capacity bound.
#[derive(Debug)]
pub struct TaskQueue {
    id: String,
    name: String,
    tasks: Mutex<VecDeque<QueuedTask>>,
    changed: Notify,
}

impl TaskQueue {
    pub fn new(name: &str) -> Self {
        TaskQueue {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            tasks: Mutex::new(VecDeque::new()),
            changed: Notify::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueues `task` at the tail and moves it to QUEUED.
    pub fn add_task(&self, task: &mut Task) -> Result<(), QueueError> {
        match task.state {
            TaskState::Ready => {}
            TaskState::Queued => return Err(QueueError::AlreadyQueued(task.id)),
            state if state.is_terminal() => {
                return Err(QueueError::Terminal {
                    task_id: task.id,
                    state,
                });
            }
            state => {
                return Err(QueueError::NotReady {
                    task_id: task.id,
                    state,
                });
            }
        }

        let mut tasks = self.lock();
        if tasks.iter().any(|queued| queued.task_id == task.id) {
            return Err(QueueError::AlreadyQueued(task.id));
        }
        task.state = TaskState::Queued;
        tasks.push_back(QueuedTask::from_task(task));
        drop(tasks);

        tracing::debug!(queue = %self.name, task_id = %task.id, "Task queued");
        self.changed.notify_one();
        Ok(())
    }

    /// Removes and returns the head task.
    pub fn next_task(&self) -> Option<QueuedTask> {
        self.lock().pop_front()
    }

    pub fn peek(&self) -> Option<QueuedTask> {
        self.lock().front().cloned()
    }

    /// Runs `f` over the queued tasks, head first, while holding the queue
    /// lock. The closure must not block.
    pub fn with_tasks<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut VecDeque<QueuedTask>) -> R,
    {
        f(&mut self.lock())
    }

    /// Takes a specific task out of the queue, wherever it sits.
    pub fn remove(&self, task_id: &TaskId) -> Option<QueuedTask> {
        let mut tasks = self.lock();
        let position = tasks.iter().position(|queued| &queued.task_id == task_id)?;
        tasks.remove(position)
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.lock().iter().any(|queued| &queued.task_id == task_id)
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.lock().iter().map(|queued| queued.task_id).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Resolves once a task has been added since the last wakeup.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new("defaultQueue")
    }
}
