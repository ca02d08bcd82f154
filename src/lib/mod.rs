//! Arrebol: a task-execution scheduler for cloud workloads.
//!
//! Jobs are submitted to the [`manager::JobRegistry`], their tasks wait in the
//! [`queue::TaskQueue`] and the [`scheduler::Scheduler`] loop pairs them with
//! idle resources from a [`resource::ResourcePool`]. Each resource runs its
//! task through a [`executor::TaskExecutor`]: a local shell process or a
//! Docker container driven over the Engine API.

pub mod config;
pub mod docker;
pub mod error;
pub mod executor;
pub mod manager;
pub mod queue;
pub mod resource;
pub mod scheduler;
pub mod tasks;

pub use error::{ArrebolError, Result};
