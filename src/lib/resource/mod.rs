pub mod pool;
pub mod types;

pub use pool::{ResourcePool, StaticPool};
pub use types::{Capability, LeasedResource, PoolError, PoolId, Resource, ResourceDescriptor, ResourceStatus};
