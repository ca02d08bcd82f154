pub mod policy;
pub mod scheduler;
pub mod types;

pub use policy::{FifoSchedulerPolicy, SkipAheadSchedulerPolicy};
pub use scheduler::Scheduler;
pub use types::{Allocation, Completion, PolicyKind, SchedulerPolicy};
