use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{ArrebolError, Result};
use crate::executor::types::{ExecutionOutcome, TaskExecutionResult};
use crate::queue::TaskQueue;
use crate::tasks::types::{Job, JobId, JobRequest, JobState, Task, TaskId, TaskState};

#[derive(Debug, Default)]
struct JobTable {
    jobs: HashMap<JobId, Job>,
    task_index: HashMap<TaskId, JobId>,
}

impl JobTable {
    fn job_mut_for_task(&mut self, task_id: TaskId) -> Result<&mut Job> {
        let job_id = self
            .task_index
            .get(&task_id)
            .ok_or(ArrebolError::TaskNotFound(task_id))?;
        self.jobs
            .get_mut(job_id)
            .ok_or(ArrebolError::JobNotFound(*job_id))
    }

    /// Runs `f` on the task, then refreshes the owning job's state.
    fn update_task<F, R>(&mut self, task_id: TaskId, f: F) -> Result<R>
    where
        F: FnOnce(&mut Task) -> Result<R>,
    {
        let job = self.job_mut_for_task(task_id)?;
        let task = job
            .tasks
            .get_mut(&task_id)
            .ok_or(ArrebolError::TaskNotFound(task_id))?;
        let out = f(task)?;
        job.refresh_state();
        Ok(out)
    }
}

/// Owner of every job known to this process.
///
/// Submission enqueues into the shared [`TaskQueue`]; the scheduler reports
/// task progress back through `mark_running`, `complete_task` and
/// `fail_task`. The table lock is taken before the queue lock, never the
/// other way round.
#[derive(Debug)]
pub struct JobRegistry {
    table: RwLock<JobTable>,
    queue: Arc<TaskQueue>,
}

impl JobRegistry {
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        JobRegistry {
            table: RwLock::new(JobTable::default()),
            queue,
        }
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub async fn submit(&self, request: JobRequest) -> Result<JobId> {
        let job = Job::from_request(request)?;
        self.submit_job(job).await
    }

    /// Registers `job` as READY and enqueues its tasks in submission order.
    pub async fn submit_job(&self, mut job: Job) -> Result<JobId> {
        if job.state != JobState::Created {
            return Err(ArrebolError::InvalidSubmission(format!(
                "job {} was already submitted",
                job.id
            )));
        }
        job.state = JobState::Ready;

        let job_id = job.id;
        let mut table = self.table.write().await;
        if table.jobs.contains_key(&job_id) {
            return Err(ArrebolError::InvalidSubmission(format!(
                "job {job_id} was already submitted"
            )));
        }
        for task_id in &job.task_order {
            table.task_index.insert(*task_id, job_id);
        }
        let job = table.jobs.entry(job_id).or_insert(job);

        for task_id in job.task_order.clone() {
            if let Some(task) = job.tasks.get_mut(&task_id) {
                self.queue.add_task(task)?;
            }
        }
        job.updated_at = chrono::Utc::now();

        tracing::info!(job_id = %job_id, tasks = job.task_order.len(), "Job submitted");
        Ok(job_id)
    }

    /// Cancels every unfinished task of the job.
    ///
    /// Tasks still waiting in the queue are taken out and FAILED. Tasks
    /// already handed to an executor have their cancellation token fired and
    /// end FAILED once the executor notices. Cancelling a finished job does
    /// nothing.
    pub async fn cancel_job(&self, job_id: JobId) -> Result<()> {
        let mut table = self.table.write().await;
        let job = table
            .jobs
            .get_mut(&job_id)
            .ok_or(ArrebolError::JobNotFound(job_id))?;

        let mut removed = 0;
        for task_id in job.task_order.clone() {
            let Some(task) = job.tasks.get_mut(&task_id) else {
                continue;
            };
            if task.state.is_terminal() {
                continue;
            }

            task.cancel.cancel();
            if self.queue.remove(&task_id).is_some() || task.state == TaskState::Ready {
                task.fail_unfinished_commands();
                task.transition(TaskState::Failed)?;
                removed += 1;
            }
        }
        job.refresh_state();

        tracing::info!(job_id = %job_id, removed, state = ?job.state, "Job cancelled");
        Ok(())
    }

    pub async fn query_task_state(&self, task_id: TaskId) -> Result<TaskState> {
        let table = self.table.read().await;
        let job_id = table
            .task_index
            .get(&task_id)
            .ok_or(ArrebolError::TaskNotFound(task_id))?;
        table
            .jobs
            .get(job_id)
            .and_then(|job| job.tasks.get(&task_id))
            .map(|task| task.state)
            .ok_or(ArrebolError::TaskNotFound(task_id))
    }

    pub async fn job(&self, job_id: JobId) -> Result<Job> {
        self.table
            .read()
            .await
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(ArrebolError::JobNotFound(job_id))
    }

    /// Copy of every job, detached from the live table.
    pub async fn jobs(&self) -> Vec<Job> {
        self.table.read().await.jobs.values().cloned().collect()
    }

    /// QUEUED -> RUNNING, on dispatch.
    pub async fn mark_running(&self, task_id: TaskId) -> Result<()> {
        self.table
            .write()
            .await
            .update_task(task_id, |task| task.transition(TaskState::Running))
    }

    /// Records an executor's result: command states and exit codes, then
    /// FINISHED or FAILED for the task.
    pub async fn complete_task(
        &self,
        task_id: TaskId,
        result: TaskExecutionResult,
    ) -> Result<TaskState> {
        self.table.write().await.update_task(task_id, |task| {
            if result.commands.len() != task.commands.len() {
                return Err(ArrebolError::Internal(format!(
                    "executor reported {} commands for a task of {}",
                    result.commands.len(),
                    task.commands.len()
                )));
            }
            task.commands = result.commands;
            let state = if result.outcome == ExecutionOutcome::Success {
                TaskState::Finished
            } else {
                TaskState::Failed
            };
            task.transition(state)?;
            Ok(state)
        })
    }

    /// Forces the task to FAILED. Already-terminal tasks are left alone.
    pub async fn fail_task(&self, task_id: TaskId) -> Result<TaskState> {
        self.table.write().await.update_task(task_id, |task| {
            if !task.state.is_terminal() {
                task.fail_unfinished_commands();
                task.transition(TaskState::Failed)?;
            }
            Ok(task.state)
        })
    }
}
