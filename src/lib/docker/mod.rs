//! Docker-backed execution.
//!
//! [`DockerTaskExecutor`] drives one container per task through the
//! [`ContainerRuntime`] port: pull, create, start, one exec instance per
//! command, then stop and remove. [`BollardRuntime`] implements the port over
//! the Docker Engine API.

pub mod client;
pub mod container;
pub mod executor;
pub mod types;

pub use client::BollardRuntime;
pub use container::DockerContainer;
pub use executor::{DockerExecutorOptions, DockerTaskExecutor};
pub use types::{ContainerError, ContainerRuntime, ContainerSpecification, ContainerState, ExecStatus};
