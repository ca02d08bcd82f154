use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tasks::requirements::ContainerRequirements;

/// Everything needed to create the container a task runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpecification {
    pub name: String,
    pub image: String,
    pub env_vars: HashMap<String, String>,
    pub requirements: ContainerRequirements,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerState {
    NotStarted,
    Started,
}

/// State of an exec instance as reported by the runtime. `exit_code` stays
/// `None` while the instance is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecStatus {
    pub id: String,
    pub running: bool,
    pub exit_code: Option<i64>,
}

/// Remote container runtime, one call per Engine API request.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Where the runtime is reached, for introspection.
    fn address(&self) -> String;

    async fn pull_image(&self, image: &str) -> Result<(), ContainerError>;

    /// Creates the container and returns its id.
    async fn create_container(&self, spec: &ContainerSpecification) -> Result<String, ContainerError>;

    async fn start_container(&self, name: &str) -> Result<(), ContainerError>;

    /// Creates an exec instance running `command` through a shell inside the
    /// container and returns its id.
    async fn create_exec(&self, container: &str, command: &str) -> Result<String, ContainerError>;

    async fn start_exec(&self, exec_id: &str) -> Result<(), ContainerError>;

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecStatus, ContainerError>;

    async fn stop_container(&self, name: &str) -> Result<(), ContainerError>;

    async fn remove_container(&self, name: &str) -> Result<(), ContainerError>;
}

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("container {0} is already started")]
    AlreadyStarted(String),

    #[error("container {0} is not started")]
    NotStarted(String),

    #[error("failed to pull image {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("failed to create container {name}: {reason}")]
    Create { name: String, reason: String },

    #[error("failed to start container {name}: {reason}")]
    Start { name: String, reason: String },

    #[error("exec of '{command}' failed: {reason}")]
    Exec { command: String, reason: String },

    #[error("exec {exec_id} still running after {timeout:?}")]
    ExecTimeout { exec_id: String, timeout: Duration },

    #[error("failed to tear down container {name}: {reason}")]
    Teardown { name: String, reason: String },

    #[error("invalid container requirement {key}={value}")]
    InvalidRequirement { key: String, value: String },

    #[error("container runtime error: {0}")]
    Runtime(String),

    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
}
