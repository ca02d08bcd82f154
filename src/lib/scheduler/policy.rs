use std::collections::VecDeque;

use super::types::{Allocation, SchedulerPolicy};
use crate::queue::QueuedTask;
use crate::resource::pool::ResourcePool;

/// Strict queue order. Only the head task is considered; when it cannot be
/// matched nothing is dispatched, even if a later task could be.
#[derive(Debug, Clone, Copy, Default)]
pub struct FifoSchedulerPolicy;

impl SchedulerPolicy for FifoSchedulerPolicy {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn select(&self, queue: &VecDeque<QueuedTask>, pool: &dyn ResourcePool) -> Option<Allocation> {
        let head = queue.front()?;
        let resource = pool.find_available(head.spec.requirements())?;
        Some(Allocation {
            task_id: head.task_id,
            resource_id: resource.id,
        })
    }
}

/// Dispatches the first task, in queue order, that some idle resource can
/// take. Later tasks may overtake an unmatchable head.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipAheadSchedulerPolicy;

impl SchedulerPolicy for SkipAheadSchedulerPolicy {
    fn name(&self) -> &'static str {
        "skip-ahead"
    }

    fn select(&self, queue: &VecDeque<QueuedTask>, pool: &dyn ResourcePool) -> Option<Allocation> {
        queue.iter().find_map(|queued| {
            pool.find_available(queued.spec.requirements())
                .map(|resource| Allocation {
                    task_id: queued.task_id,
                    resource_id: resource.id,
                })
        })
    }
}
