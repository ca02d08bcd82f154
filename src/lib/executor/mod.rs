//! Task executors.
//!
//! An executor runs every command of one task, in order, against the
//! resource it belongs to:
//!
//! - [`RawTaskExecutor`]: spawns `sh -c <command>` on the local host
//! - [`crate::docker::DockerTaskExecutor`]: runs each command as an exec
//!   instance inside a container created for the task
//!
//! A failing command never aborts the rest of the task; it only turns the
//! task outcome into [`ExecutionOutcome::Failure`].

pub mod raw;
pub mod types;

pub use raw::RawTaskExecutor;
pub use types::{CommandError, ExecutionOutcome, ExecutionTask, TaskExecutionResult, TaskExecutor};
