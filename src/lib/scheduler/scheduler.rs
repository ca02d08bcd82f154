use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::types::{Completion, SchedulerPolicy};
use crate::executor::types::ExecutionTask;
use crate::manager::registry::JobRegistry;
use crate::queue::{QueuedTask, TaskQueue};
use crate::resource::pool::ResourcePool;
use crate::resource::types::{LeasedResource, PoolError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one scheduling attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// Nothing queued, or nothing matchable right now.
    Idle,
    Dispatched,
    /// A task was picked but could not be started; it has been failed.
    Failed,
}

enum Wakeup {
    Shutdown,
    Completed(Completion),
    Tick,
}

/// The control loop pairing queued tasks with idle resources.
///
/// Execution happens on spawned workers; the loop only dispatches and, when
/// a worker reports back, reconciles the task and releases its resource.
pub struct Scheduler {
    queue: Arc<TaskQueue>,
    pool: Arc<dyn ResourcePool>,
    registry: Arc<JobRegistry>,
    policy: Box<dyn SchedulerPolicy>,
    poll_interval: Duration,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    in_flight: usize,
}

impl Scheduler {
    pub fn new(
        queue: Arc<TaskQueue>,
        pool: Arc<dyn ResourcePool>,
        registry: Arc<JobRegistry>,
        policy: Box<dyn SchedulerPolicy>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Scheduler {
            queue,
            pool,
            registry,
            policy,
            poll_interval: DEFAULT_POLL_INTERVAL,
            completions_tx,
            completions_rx,
            in_flight: 0,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Runs until `shutdown` is cancelled. Workers still executing at that
    /// point are left to finish on their own.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(
            policy = self.policy.name(),
            pool_id = self.pool.id(),
            pool_size = self.pool.size(),
            "Scheduler started"
        );

        loop {
            while let Ok(completion) = self.completions_rx.try_recv() {
                self.reconcile(completion).await;
            }

            if shutdown.is_cancelled() {
                break;
            }

            if self.schedule_once().await != Cycle::Idle {
                continue;
            }

            let wakeup = tokio::select! {
                _ = shutdown.cancelled() => Wakeup::Shutdown,
                Some(completion) = self.completions_rx.recv() => Wakeup::Completed(completion),
                _ = self.queue.changed() => Wakeup::Tick,
                _ = tokio::time::sleep(self.poll_interval) => Wakeup::Tick,
            };

            match wakeup {
                Wakeup::Shutdown => break,
                Wakeup::Completed(completion) => self.reconcile(completion).await,
                Wakeup::Tick => {}
            }
        }

        tracing::info!(in_flight = self.in_flight, "Scheduler stopped");
    }

    /// One pass of select, lease, dequeue and dispatch.
    pub async fn schedule_once(&mut self) -> Cycle {
        let picked = self.queue.with_tasks(|tasks| {
            let allocation = self.policy.select(tasks, self.pool.as_ref())?;
            let position = tasks
                .iter()
                .position(|queued| queued.task_id == allocation.task_id)?;
            let queued = tasks.remove(position)?;
            let lease = self.pool.lease(&allocation.resource_id, queued.task_id);
            Some((queued, lease))
        });

        match picked {
            None => Cycle::Idle,
            Some((queued, Ok(lease))) => self.dispatch(queued, lease).await,
            Some((queued, Err(e))) => {
                tracing::error!(task_id = %queued.task_id, error = %e, "Failed to lease resource");
                self.fail(&queued, None).await;
                Cycle::Failed
            }
        }
    }

    async fn dispatch(&mut self, queued: QueuedTask, lease: LeasedResource) -> Cycle {
        if let Err(e) = self.registry.mark_running(queued.task_id).await {
            tracing::error!(task_id = %queued.task_id, error = %e, "Failed to start task");
            self.fail(&queued, Some(&lease.resource_id)).await;
            return Cycle::Failed;
        }

        tracing::info!(
            task_id = %queued.task_id,
            job_id = %queued.job_id,
            resource_id = %lease.resource_id,
            executor = lease.executor.kind(),
            "Task dispatched"
        );

        let task = ExecutionTask::from_queued(&queued);
        let executor = Arc::clone(&lease.executor);
        let worker = tokio::spawn(async move { executor.execute(task).await });

        let completions = self.completions_tx.clone();
        let (task_id, job_id, resource_id) = (queued.task_id, queued.job_id, lease.resource_id);
        tokio::spawn(async move {
            let result = worker.await.map_err(|e| e.to_string());
            let completion = Completion {
                task_id,
                job_id,
                resource_id,
                result,
            };
            if completions.send(completion).is_err() {
                tracing::warn!(task_id = %task_id, "Scheduler gone, dropping task completion");
            }
        });

        self.in_flight += 1;
        Cycle::Dispatched
    }

    /// Applies a worker's result to the registry and frees its resource.
    async fn reconcile(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let Completion {
            task_id,
            job_id,
            resource_id,
            result,
        } = completion;

        let reconciled = match result {
            Ok(result) => self.registry.complete_task(task_id, result).await,
            Err(reason) => {
                tracing::error!(task_id = %task_id, %reason, "Execution worker died");
                self.registry.fail_task(task_id).await
            }
        };

        match reconciled {
            Ok(state) => {
                tracing::info!(task_id = %task_id, job_id = %job_id, %state, "Task completed");
            }
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "Failed to reconcile task");
                if let Err(e) = self.registry.fail_task(task_id).await {
                    tracing::error!(task_id = %task_id, error = %e, "Failed to mark task FAILED");
                }
            }
        }

        self.release(&resource_id);
    }

    async fn fail(&self, queued: &QueuedTask, resource_id: Option<&str>) {
        if let Err(e) = self.registry.fail_task(queued.task_id).await {
            tracing::error!(task_id = %queued.task_id, error = %e, "Failed to mark task FAILED");
        }
        if let Some(resource_id) = resource_id {
            self.release(resource_id);
        }
    }

    fn release(&self, resource_id: &str) {
        match self.pool.release(resource_id) {
            Ok(_) => {}
            Err(e @ PoolError::NotLeased(_)) => {
                tracing::warn!(resource_id, error = %e, "Resource was already released");
            }
            Err(e) => tracing::error!(resource_id, error = %e, "Failed to release resource"),
        }
    }
}
