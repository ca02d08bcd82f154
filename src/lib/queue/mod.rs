pub mod queue;
pub mod types;

pub use queue::TaskQueue;
pub use types::{QueueError, QueuedTask};
