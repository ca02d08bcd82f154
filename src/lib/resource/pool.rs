use std::sync::{Mutex, MutexGuard, PoisonError};

use super::types::{LeasedResource, PoolError, PoolId, Resource, ResourceStatus};
use crate::tasks::requirements::Requirements;
use crate::tasks::types::TaskId;

/// A collection of execution slots.
///
/// `lease` is compare-and-lease: it re-checks idleness under the pool lock,
/// so two schedulers that saw the same idle resource in `find_available`
/// cannot both lease it.
pub trait ResourcePool: Send + Sync {
    fn id(&self) -> PoolId;

    /// First idle resource, in pool order, whose capability matches.
    fn find_available(&self, requirements: &Requirements) -> Option<ResourceStatus>;

    fn lease(&self, resource_id: &str, task_id: TaskId) -> Result<LeasedResource, PoolError>;

    fn release(&self, resource_id: &str) -> Result<TaskId, PoolError>;

    fn size(&self) -> usize;

    fn all(&self) -> Vec<ResourceStatus>;

    fn leased_count(&self) -> usize {
        self.all().iter().filter(|r| r.leased_to.is_some()).count()
    }
}

/// Fixed-size, fixed-membership pool. Resources keep their insertion order,
/// which makes first-fit deterministic.
#[derive(Debug)]
pub struct StaticPool {
    id: PoolId,
    resources: Mutex<Vec<Resource>>,
}

impl StaticPool {
    pub fn new(id: PoolId, resources: Vec<Resource>) -> Self {
        tracing::info!(pool_id = id, size = resources.len(), "Static pool created");
        StaticPool {
            id,
            resources: Mutex::new(resources),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Resource>> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResourcePool for StaticPool {
    fn id(&self) -> PoolId {
        self.id
    }

    fn find_available(&self, requirements: &Requirements) -> Option<ResourceStatus> {
        self.lock()
            .iter()
            .find(|r| !r.is_leased() && r.matches(requirements))
            .map(Resource::status)
    }

    fn lease(&self, resource_id: &str, task_id: TaskId) -> Result<LeasedResource, PoolError> {
        let mut resources = self.lock();
        let resource = resources
            .iter_mut()
            .find(|r| r.id() == resource_id)
            .ok_or_else(|| PoolError::UnknownResource(resource_id.to_string()))?;
        resource.lease(task_id)?;

        tracing::debug!(pool_id = self.id, resource_id, task_id = %task_id, "Resource leased");
        Ok(LeasedResource {
            resource_id: resource_id.to_string(),
            task_id,
            executor: resource.executor(),
        })
    }

    fn release(&self, resource_id: &str) -> Result<TaskId, PoolError> {
        let mut resources = self.lock();
        let resource = resources
            .iter_mut()
            .find(|r| r.id() == resource_id)
            .ok_or_else(|| PoolError::UnknownResource(resource_id.to_string()))?;
        let task_id = resource
            .release()
            .ok_or_else(|| PoolError::NotLeased(resource_id.to_string()))?;

        tracing::debug!(pool_id = self.id, resource_id, task_id = %task_id, "Resource released");
        Ok(task_id)
    }

    fn size(&self) -> usize {
        self.lock().len()
    }

    fn all(&self) -> Vec<ResourceStatus> {
        self.lock().iter().map(Resource::status).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::executor::RawTaskExecutor;
    use crate::resource::types::{Capability, ResourceDescriptor};

    fn zone_resource(id: &str, zone: &str) -> Resource {
        let descriptor = ResourceDescriptor {
            attributes: HashMap::from([("zone".to_string(), zone.to_string())]),
            ..Default::default()
        };
        Resource::new(
            id,
            1,
            Capability::Described(descriptor),
            Arc::new(RawTaskExecutor::default()),
        )
    }

    fn requires_zone(zone: &str) -> Requirements {
        Requirements::parse(&HashMap::from([("zone".to_string(), zone.to_string())])).unwrap()
    }

    fn match_any_pool(size: usize) -> StaticPool {
        let resources = (0..size)
            .map(|i| {
                Resource::match_any(
                    format!("resourceId-{i}"),
                    1,
                    Arc::new(RawTaskExecutor::default()),
                )
            })
            .collect();
        StaticPool::new(1, resources)
    }

    #[test]
    fn find_available_is_first_fit_in_insertion_order() {
        let pool = match_any_pool(3);
        let found = pool.find_available(&Requirements::default()).unwrap();
        assert_eq!(found.id, "resourceId-0");

        pool.lease("resourceId-0", Uuid::new_v4()).unwrap();
        let found = pool.find_available(&Requirements::default()).unwrap();
        assert_eq!(found.id, "resourceId-1");
    }

    #[test]
    fn find_available_skips_non_matching_resources() {
        let pool = StaticPool::new(
            1,
            vec![zone_resource("a", "east"), zone_resource("b", "west")],
        );

        assert_eq!(pool.find_available(&requires_zone("west")).unwrap().id, "b");
        assert!(pool.find_available(&requires_zone("north")).is_none());
    }

    #[test]
    fn lease_is_exclusive() {
        let pool = match_any_pool(1);
        let first = Uuid::new_v4();
        pool.lease("resourceId-0", first).unwrap();

        let err = pool.lease("resourceId-0", Uuid::new_v4()).unwrap_err();
        assert_eq!(
            err,
            PoolError::AlreadyLeased {
                resource_id: "resourceId-0".to_string(),
                task_id: first,
            }
        );
        assert!(pool.find_available(&Requirements::default()).is_none());
        assert_eq!(pool.leased_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_leases_never_share_a_resource() {
        const SLOTS: usize = 3;
        const CONTENDERS: usize = 16;

        let pool = Arc::new(match_any_pool(SLOTS));
        let barrier = Arc::new(tokio::sync::Barrier::new(CONTENDERS));

        let handles: Vec<_> = (0..CONTENDERS)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    let task_id = Uuid::new_v4();
                    barrier.wait().await;
                    while let Some(idle) = pool.find_available(&Requirements::default()) {
                        match pool.lease(&idle.id, task_id) {
                            Ok(lease) => return Some((lease.resource_id, task_id)),
                            Err(PoolError::AlreadyLeased { .. }) => tokio::task::yield_now().await,
                            Err(e) => panic!("unexpected lease error: {e}"),
                        }
                    }
                    None
                })
            })
            .collect();

        let mut winners = Vec::new();
        for handle in handles {
            if let Some(won) = handle.await.unwrap() {
                winners.push(won);
            }
        }

        assert_eq!(winners.len(), SLOTS);
        let mut resource_ids: Vec<_> = winners.iter().map(|(id, _)| id.clone()).collect();
        resource_ids.sort();
        resource_ids.dedup();
        assert_eq!(resource_ids.len(), SLOTS);

        for status in pool.all() {
            let holder = status.leased_to.unwrap();
            assert!(winners.contains(&(status.id.clone(), holder)));
        }
        assert_eq!(pool.leased_count(), SLOTS);
    }

    #[test]
    fn release_returns_resource_to_the_pool() {
        let pool = match_any_pool(1);
        let task_id = Uuid::new_v4();
        pool.lease("resourceId-0", task_id).unwrap();

        assert_eq!(pool.release("resourceId-0"), Ok(task_id));
        assert!(pool.find_available(&Requirements::default()).is_some());
        assert_eq!(
            pool.release("resourceId-0"),
            Err(PoolError::NotLeased("resourceId-0".to_string()))
        );
    }

    #[test]
    fn unknown_resource_is_an_error() {
        let pool = match_any_pool(1);
        assert!(matches!(
            pool.lease("nope", Uuid::new_v4()),
            Err(PoolError::UnknownResource(_))
        ));
    }

    #[test]
    fn introspection_reports_every_resource() {
        let pool = match_any_pool(5);
        assert_eq!(pool.size(), 5);
        let all = pool.all();
        assert_eq!(all.len(), 5);
        assert!(all.iter().all(|r| r.pool_id == 1 && r.leased_to.is_none()));
        assert_eq!(all[4].executor, "raw");
    }

    #[test]
    fn described_capability_checks_limits_and_images() {
        let descriptor = ResourceDescriptor {
            images: vec!["ubuntu".to_string()],
            max_memory_mb: Some(1024),
            max_cpu_weight: Some(2),
            attributes: HashMap::new(),
        };
        let capability = Capability::Described(descriptor);
        let req = |pairs: &[(&str, &str)]| {
            Requirements::parse(
                &pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
            .unwrap()
        };

        assert!(capability.matches(&req(&[("image", "ubuntu")])));
        assert!(!capability.matches(&req(&[("image", "alpine")])));
        assert!(capability.matches(&req(&[("DockerRequirements", "memory==512&&vcpu==2")])));
        assert!(!capability.matches(&req(&[("DockerRequirements", "memory==2048")])));
        assert!(!capability.matches(&req(&[("DockerRequirements", "vcpu==3")])));
        assert!(Capability::MatchAny.matches(&req(&[("image", "alpine"), ("zone", "x")])));
    }
}
