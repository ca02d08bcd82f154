use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::types::TaskExecutor;
use crate::tasks::requirements::{Requirement, Requirements};
use crate::tasks::types::TaskId;

pub type PoolId = u32;

/// What a constrained resource offers. Empty `images` accepts any image and
/// an absent limit accepts any amount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub max_memory_mb: Option<u64>,
    #[serde(default)]
    pub max_cpu_weight: Option<u64>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Unconstrained worker, accepts every requirement set.
    MatchAny,
    Described(ResourceDescriptor),
}

impl Capability {
    pub fn matches(&self, requirements: &Requirements) -> bool {
        match self {
            Capability::MatchAny => true,
            Capability::Described(descriptor) => requirements
                .items()
                .iter()
                .all(|requirement| descriptor.satisfies(requirement)),
        }
    }
}

impl ResourceDescriptor {
    fn satisfies(&self, requirement: &Requirement) -> bool {
        match requirement {
            Requirement::Image(image) => {
                self.images.is_empty() || self.images.iter().any(|i| i == image)
            }
            Requirement::Memory(mb) => self.max_memory_mb.is_none_or(|max| *mb <= max),
            Requirement::CpuWeight(weight) => {
                self.max_cpu_weight.is_none_or(|max| *weight <= max)
            }
            Requirement::Attribute { key, value } => self.attributes.get(key) == Some(value),
        }
    }
}

/// An execution slot. Holds the executor that runs leased tasks and the id of
/// the task currently holding the lease.
pub struct Resource {
    id: String,
    pool_id: PoolId,
    capability: Capability,
    leased_to: Option<TaskId>,
    executor: Arc<dyn TaskExecutor>,
}

impl Resource {
    pub fn new(
        id: impl Into<String>,
        pool_id: PoolId,
        capability: Capability,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Resource {
            id: id.into(),
            pool_id,
            capability,
            leased_to: None,
            executor,
        }
    }

    pub fn match_any(id: impl Into<String>, pool_id: PoolId, executor: Arc<dyn TaskExecutor>) -> Self {
        Self::new(id, pool_id, Capability::MatchAny, executor)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn matches(&self, requirements: &Requirements) -> bool {
        self.capability.matches(requirements)
    }

    pub fn is_leased(&self) -> bool {
        self.leased_to.is_some()
    }

    pub fn leased_to(&self) -> Option<TaskId> {
        self.leased_to
    }

    pub fn lease(&mut self, task_id: TaskId) -> Result<(), PoolError> {
        if let Some(holder) = self.leased_to {
            return Err(PoolError::AlreadyLeased {
                resource_id: self.id.clone(),
                task_id: holder,
            });
        }
        self.leased_to = Some(task_id);
        Ok(())
    }

    /// Drops the lease, returning the task that held it.
    pub fn release(&mut self) -> Option<TaskId> {
        self.leased_to.take()
    }

    pub fn executor(&self) -> Arc<dyn TaskExecutor> {
        Arc::clone(&self.executor)
    }

    pub fn status(&self) -> ResourceStatus {
        ResourceStatus {
            id: self.id.clone(),
            pool_id: self.pool_id,
            capability: self.capability.clone(),
            executor: self.executor.kind().to_string(),
            leased_to: self.leased_to,
        }
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("pool_id", &self.pool_id)
            .field("capability", &self.capability)
            .field("leased_to", &self.leased_to)
            .field("executor", &self.executor.kind())
            .finish()
    }
}

/// Read-only view of a resource, for introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub id: String,
    pub pool_id: PoolId,
    pub capability: Capability,
    pub executor: String,
    pub leased_to: Option<TaskId>,
}

/// A resource bound to one task; handed to the execution worker.
#[derive(Clone)]
pub struct LeasedResource {
    pub resource_id: String,
    pub task_id: TaskId,
    pub executor: Arc<dyn TaskExecutor>,
}

impl std::fmt::Debug for LeasedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeasedResource")
            .field("resource_id", &self.resource_id)
            .field("task_id", &self.task_id)
            .field("executor", &self.executor.kind())
            .finish()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("resource {0} does not exist in this pool")]
    UnknownResource(String),

    #[error("resource {resource_id} is already leased to task {task_id}")]
    AlreadyLeased { resource_id: String, task_id: TaskId },

    #[error("resource {0} is not leased")]
    NotLeased(String),
}
