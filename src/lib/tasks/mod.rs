pub mod requirements;
pub mod state;
pub mod types;

pub use requirements::{ContainerRequirements, Requirement, Requirements};
pub use types::{
    Command, CommandState, Job, JobId, JobRequest, JobState, Task, TaskId, TaskSpec,
    TaskSpecRequest, TaskState,
};
