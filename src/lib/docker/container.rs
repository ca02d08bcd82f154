use std::sync::Arc;
use std::time::Duration;

use super::types::{
    ContainerError, ContainerRuntime, ContainerSpecification, ContainerState, ExecStatus,
};

/// The container bound to one resource.
///
/// NOT_STARTED -> STARTED -> NOT_STARTED. Starting a started container and
/// stopping one that is not started are both errors.
pub struct DockerContainer {
    name: String,
    state: ContainerState,
    runtime: Arc<dyn ContainerRuntime>,
}

impl DockerContainer {
    pub fn new(name: impl Into<String>, runtime: Arc<dyn ContainerRuntime>) -> Self {
        DockerContainer {
            name: name.into(),
            state: ContainerState::NotStarted,
            runtime,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// Pulls the image, then creates and starts the container. The container
    /// only counts as started once all three calls succeeded.
    pub async fn start(&mut self, spec: &ContainerSpecification) -> Result<(), ContainerError> {
        if self.state == ContainerState::Started {
            return Err(ContainerError::AlreadyStarted(self.name.clone()));
        }

        self.runtime
            .pull_image(&spec.image)
            .await
            .map_err(|e| ContainerError::ImagePull {
                image: spec.image.clone(),
                reason: e.to_string(),
            })?;

        self.runtime
            .create_container(spec)
            .await
            .map_err(|e| ContainerError::Create {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;

        if let Err(e) = self.runtime.start_container(&self.name).await {
            if let Err(remove_err) = self.runtime.remove_container(&self.name).await {
                tracing::warn!(container = %self.name, error = %remove_err, "Failed to remove unstarted container");
            }
            return Err(ContainerError::Start {
                name: self.name.clone(),
                reason: e.to_string(),
            });
        }

        self.state = ContainerState::Started;
        tracing::info!(container = %self.name, image = %spec.image, "Container started");
        Ok(())
    }

    /// Runs `command` in a new exec instance and waits for it to stop
    /// running. Returns the exit code, or `None` when the runtime reports
    /// none.
    pub async fn exec(
        &self,
        command: &str,
        poll_interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<Option<i32>, ContainerError> {
        if self.state != ContainerState::Started {
            return Err(ContainerError::NotStarted(self.name.clone()));
        }

        let exec_error = |e: ContainerError| ContainerError::Exec {
            command: command.to_string(),
            reason: e.to_string(),
        };

        let exec_id = self
            .runtime
            .create_exec(&self.name, command)
            .await
            .map_err(exec_error)?;
        tracing::debug!(container = %self.name, %exec_id, cmd = command, "Exec created");
        self.runtime.start_exec(&exec_id).await.map_err(exec_error)?;

        let status = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.wait_exec(&exec_id, poll_interval))
                .await
                .map_err(|_| ContainerError::ExecTimeout {
                    exec_id: exec_id.clone(),
                    timeout: limit,
                })?,
            None => self.wait_exec(&exec_id, poll_interval).await,
        }
        .map_err(exec_error)?;

        Ok(status.exit_code.and_then(|code| i32::try_from(code).ok()))
    }

    async fn wait_exec(
        &self,
        exec_id: &str,
        poll_interval: Duration,
    ) -> Result<ExecStatus, ContainerError> {
        loop {
            let status = self.runtime.inspect_exec(exec_id).await?;
            if !status.running {
                return Ok(status);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Stops and removes the container. Removal is attempted even when the
    /// stop call fails; the container is NOT_STARTED afterwards either way.
    pub async fn stop(&mut self) -> Result<(), ContainerError> {
        if self.state != ContainerState::Started {
            return Err(ContainerError::NotStarted(self.name.clone()));
        }
        self.state = ContainerState::NotStarted;

        let stopped = self.runtime.stop_container(&self.name).await;
        let removed = self.runtime.remove_container(&self.name).await;

        match stopped.and(removed) {
            Ok(()) => {
                tracing::info!(container = %self.name, "Container stopped and removed");
                Ok(())
            }
            Err(e) => Err(ContainerError::Teardown {
                name: self.name.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for DockerContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerContainer")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}
