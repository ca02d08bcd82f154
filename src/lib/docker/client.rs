use async_trait::async_trait;
use bollard::{
    API_DEFAULT_VERSION, Docker,
    container::{
        Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
        StopContainerOptions,
    },
    exec::{CreateExecOptions, StartExecOptions, StartExecResults},
    image::CreateImageOptions,
    secret::HostConfig,
};
use futures_util::stream::StreamExt;

use super::types::{ContainerError, ContainerRuntime, ContainerSpecification, ExecStatus};
use crate::tasks::requirements::{ContainerRequirements, DOCKER_CPU_WEIGHT_KEY, DOCKER_MEMORY_KEY};

const DEFAULT_SOCKET: &str = "unix:///var/run/docker.sock";
const CONNECT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_TAG: &str = "latest";
const SHELL: &str = "/bin/bash";
const BYTES_PER_MB: i64 = 1024 * 1024;

/// [`ContainerRuntime`] over the Docker Engine API, reached through a unix
/// socket.
#[derive(Debug, Clone)]
pub struct BollardRuntime {
    client: Docker,
    address: String,
}

impl BollardRuntime {
    /// Connects to `address`, or to the platform's default socket when
    /// `None`. The connection is lazy: no request is made here.
    pub fn connect(address: Option<&str>) -> Result<Self, ContainerError> {
        let client = match address {
            Some(address) => {
                Docker::connect_with_unix(address, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
            None => Docker::connect_with_unix_defaults()?,
        };

        Ok(BollardRuntime {
            client,
            address: address.unwrap_or(DEFAULT_SOCKET).to_string(),
        })
    }
}

/// Splits `image` into name and tag, defaulting the tag to `latest`.
fn split_image(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, DEFAULT_TAG),
    }
}

fn host_config(requirements: &ContainerRequirements) -> Result<HostConfig, ContainerError> {
    let parse = |key: &str, value: &str| {
        value
            .parse::<i64>()
            .map_err(|_| ContainerError::InvalidRequirement {
                key: key.to_string(),
                value: value.to_string(),
            })
    };

    let memory = requirements
        .memory
        .as_deref()
        .map(|mb| {
            parse(DOCKER_MEMORY_KEY, mb)?
                .checked_mul(BYTES_PER_MB)
                .ok_or_else(|| ContainerError::InvalidRequirement {
                    key: DOCKER_MEMORY_KEY.to_string(),
                    value: mb.to_string(),
                })
        })
        .transpose()?;
    let cpu_shares = requirements
        .cpu_weight
        .as_deref()
        .map(|weight| parse(DOCKER_CPU_WEIGHT_KEY, weight))
        .transpose()?;

    Ok(HostConfig {
        memory,
        cpu_shares,
        ..Default::default()
    })
}

#[async_trait]
impl ContainerRuntime for BollardRuntime {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn pull_image(&self, image: &str) -> Result<(), ContainerError> {
        let (name, tag) = split_image(image);
        tracing::info!(image = name, tag, "Pulling image");

        let mut stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: name.to_string(),
                tag: tag.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(msg) = stream.next().await {
            let info = msg?;
            if let Some(status) = info.status {
                tracing::trace!(image = name, %status, "Pull progress");
            }
        }

        tracing::info!(image = name, tag, "Image pulled");
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpecification) -> Result<String, ContainerError> {
        let env = spec
            .env_vars
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();

        let container_config = Config {
            image: Some(spec.image.clone()),
            env: Some(env),
            tty: Some(true),
            open_stdin: Some(true),
            host_config: Some(host_config(&spec.requirements)?),
            ..Default::default()
        };

        let options = Some(CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        });

        let response = self.client.create_container(options, container_config).await?;
        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, %warning, "Container created with warning");
        }
        tracing::debug!(container = %spec.name, id = %response.id, "Container created");
        Ok(response.id)
    }

    async fn start_container(&self, name: &str) -> Result<(), ContainerError> {
        self.client
            .start_container(name, None::<StartContainerOptions<String>>)
            .await?;
        tracing::debug!(container = name, "Container started");
        Ok(())
    }

    async fn create_exec(&self, container: &str, command: &str) -> Result<String, ContainerError> {
        let options = CreateExecOptions {
            cmd: Some(vec![
                SHELL.to_string(),
                "-c".to_string(),
                command.to_string(),
            ]),
            tty: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let created = self.client.create_exec(container, options).await?;
        Ok(created.id)
    }

    async fn start_exec(&self, exec_id: &str) -> Result<(), ContainerError> {
        let options = StartExecOptions {
            detach: false,
            tty: false,
            ..Default::default()
        };

        // Output is not kept, but the stream must be drained for the exec to
        // run to completion.
        if let StartExecResults::Attached { mut output, .. } =
            self.client.start_exec(exec_id, Some(options)).await?
        {
            while let Some(chunk) = output.next().await {
                let chunk = chunk?;
                tracing::trace!(exec_id, output = %chunk, "Exec output");
            }
        }
        Ok(())
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecStatus, ContainerError> {
        let inspected = self.client.inspect_exec(exec_id).await?;
        Ok(ExecStatus {
            id: inspected.id.unwrap_or_else(|| exec_id.to_string()),
            running: inspected.running.unwrap_or(false),
            exit_code: inspected.exit_code,
        })
    }

    async fn stop_container(&self, name: &str) -> Result<(), ContainerError> {
        self.client
            .stop_container(name, None::<StopContainerOptions>)
            .await?;
        tracing::debug!(container = name, "Container stopped");
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<(), ContainerError> {
        self.client
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await?;
        tracing::debug!(container = name, "Container removed");
        Ok(())
    }
}
