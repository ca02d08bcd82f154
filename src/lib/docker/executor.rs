use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::container::DockerContainer;
use super::types::{ContainerRuntime, ContainerSpecification};
use crate::executor::types::{ExecutionTask, TaskExecutionResult, TaskExecutor};

pub const DEFAULT_IMAGE: &str = "ubuntu";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct DockerExecutorOptions {
    /// Image used when the task does not name one.
    pub default_image: String,
    /// Delay between exec status polls.
    pub poll_interval: Duration,
    /// Upper bound on how long one exec instance may run. Unbounded when
    /// `None`.
    pub exec_timeout: Option<Duration>,
}

impl Default for DockerExecutorOptions {
    fn default() -> Self {
        DockerExecutorOptions {
            default_image: DEFAULT_IMAGE.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            exec_timeout: None,
        }
    }
}

/// Runs every task in a fresh container named after the resource.
pub struct DockerTaskExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    options: DockerExecutorOptions,
    container: Mutex<DockerContainer>,
}

impl DockerTaskExecutor {
    pub fn new(
        container_name: impl Into<String>,
        runtime: Arc<dyn ContainerRuntime>,
        options: DockerExecutorOptions,
    ) -> Self {
        let container = DockerContainer::new(container_name, Arc::clone(&runtime));
        DockerTaskExecutor {
            runtime,
            options,
            container: Mutex::new(container),
        }
    }

    fn container_spec(&self, name: &str, task: &ExecutionTask) -> ContainerSpecification {
        let requirements = task.spec.requirements();
        ContainerSpecification {
            name: name.to_string(),
            image: requirements
                .image()
                .unwrap_or(&self.options.default_image)
                .to_string(),
            env_vars: task.spec.env_vars().clone(),
            requirements: requirements.container().clone(),
        }
    }
}

#[async_trait]
impl TaskExecutor for DockerTaskExecutor {
    fn kind(&self) -> &'static str {
        "docker"
    }

    async fn execute(&self, mut task: ExecutionTask) -> TaskExecutionResult {
        let mut container = self.container.lock().await;
        let spec = self.container_spec(container.name(), &task);
        tracing::info!(
            task_id = %task.task_id,
            container = %spec.name,
            image = %spec.image,
            commands = task.commands.len(),
            "Executing task in container"
        );

        if let Err(e) = container.start(&spec).await {
            tracing::error!(task_id = %task.task_id, container = %spec.name, error = %e, "Container provisioning failed");
            return TaskExecutionResult::failed(task.commands);
        }

        for (cmd_index, command) in task.commands.iter_mut().enumerate() {
            if task.cancel.is_cancelled() {
                tracing::warn!(task_id = %task.task_id, cmd_index, "Task cancelled, skipping command");
                command.fail();
                continue;
            }

            command.start();
            match container
                .exec(
                    &command.command,
                    self.options.poll_interval,
                    self.options.exec_timeout,
                )
                .await
            {
                Ok(Some(exit_code)) => {
                    command.complete(exit_code);
                    tracing::debug!(task_id = %task.task_id, cmd_index, exit_code, "Exec finished");
                }
                Ok(None) => {
                    tracing::warn!(task_id = %task.task_id, cmd_index, "Exec finished without an exit code");
                    command.fail();
                }
                Err(e) => {
                    tracing::error!(
                        task_id = %task.task_id,
                        cmd_index,
                        cmd = %command.command,
                        error = %e,
                        "Exec failed"
                    );
                    command.fail();
                }
            }
        }

        let result = TaskExecutionResult::from_commands(task.commands);
        if let Err(e) = container.stop().await {
            tracing::warn!(task_id = %task.task_id, container = %spec.name, error = %e, "Container teardown failed");
        }
        result
    }

    fn metadata(&self) -> HashMap<String, String> {
        HashMap::from([
            ("docker_address".to_string(), self.runtime.address()),
            ("default_image".to_string(), self.options.default_image.clone()),
        ])
    }
}
