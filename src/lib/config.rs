use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::docker::executor::{DEFAULT_IMAGE, DockerExecutorOptions};
use crate::error::{ArrebolError, Result};
use crate::resource::types::PoolId;
use crate::scheduler::types::PolicyKind;

/// Which executor the pool's resources run tasks with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    #[default]
    Raw,
    Docker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub id: PoolId,
    /// Number of match-any resources the pool is seeded with.
    pub size: usize,
    pub executor: ExecutorKind,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            id: 1,
            size: 5,
            executor: ExecutorKind::Raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Engine socket, e.g. `unix:///var/run/docker.sock`. The platform
    /// default when unset.
    pub address: Option<String>,
    pub default_image: String,
    pub exec_poll_interval_ms: u64,
    pub exec_timeout_ms: Option<u64>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        DockerConfig {
            address: None,
            default_image: DEFAULT_IMAGE.to_string(),
            exec_poll_interval_ms: 500,
            exec_timeout_ms: None,
        }
    }
}

impl DockerConfig {
    pub fn executor_options(&self) -> DockerExecutorOptions {
        DockerExecutorOptions {
            default_image: self.default_image.clone(),
            poll_interval: Duration::from_millis(self.exec_poll_interval_ms),
            exec_timeout: self.exec_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_ms: u64,
    pub policy: PolicyKind,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            poll_interval_ms: 1000,
            policy: PolicyKind::Fifo,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Per-command limit for the raw executor. Unbounded when unset.
    pub command_timeout_ms: Option<u64>,
}

impl ExecutorConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot file. Snapshots are only logged when unset.
    pub path: Option<PathBuf>,
    pub commit_period_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            path: None,
            commit_period_secs: 20,
        }
    }
}

impl StoreConfig {
    pub fn commit_period(&self) -> Duration {
        Duration::from_secs(self.commit_period_secs)
    }
}

/// Service configuration, read from TOML. Every section and field is
/// optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub pool: PoolConfig,
    pub docker: DockerConfig,
    pub scheduler: SchedulerConfig,
    pub executor: ExecutorConfig,
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "127.0.0.1:8080".to_string(),
            pool: PoolConfig::default(),
            docker: DockerConfig::default(),
            scheduler: SchedulerConfig::default(),
            executor: ExecutorConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(raw).map_err(|e| ArrebolError::Config(e.message().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ArrebolError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool.size == 0 {
            return Err(ArrebolError::Config("pool.size must be at least 1".to_string()));
        }
        if self.scheduler.poll_interval_ms == 0 {
            return Err(ArrebolError::Config(
                "scheduler.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.docker.exec_poll_interval_ms == 0 {
            return Err(ArrebolError::Config(
                "docker.exec_poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.docker.default_image.trim().is_empty() {
            return Err(ArrebolError::Config(
                "docker.default_image may not be empty".to_string(),
            ));
        }
        if self.store.commit_period_secs == 0 {
            return Err(ArrebolError::Config(
                "store.commit_period_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml("").unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.pool.size, 5);
        assert_eq!(config.pool.executor, ExecutorKind::Raw);
        assert_eq!(config.docker.default_image, "ubuntu");
        assert_eq!(config.scheduler.policy, PolicyKind::Fifo);
        assert_eq!(config.store.commit_period(), Duration::from_secs(20));
        assert_eq!(config.executor.command_timeout(), None);
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml(
            r#"
            listen_addr = "0.0.0.0:9000"

            [pool]
            size = 2
            executor = "docker"

            [docker]
            default_image = "alpine"
            exec_timeout_ms = 30000

            [scheduler]
            policy = "skip-ahead"

            [store]
            path = "/tmp/arrebol/jobs.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.pool.size, 2);
        assert_eq!(config.pool.id, 1);
        assert_eq!(config.pool.executor, ExecutorKind::Docker);
        assert_eq!(config.scheduler.policy, PolicyKind::SkipAhead);
        assert_eq!(config.scheduler.poll_interval(), Duration::from_secs(1));

        let options = config.docker.executor_options();
        assert_eq!(options.default_image, "alpine");
        assert_eq!(options.exec_timeout, Some(Duration::from_secs(30)));
        assert_eq!(options.poll_interval, Duration::from_millis(500));
        assert_eq!(config.store.path, Some(PathBuf::from("/tmp/arrebol/jobs.json")));
    }

    #[rstest]
    #[case("[pool]\nsize = 0")]
    #[case("[scheduler]\npoll_interval_ms = 0")]
    #[case("[docker]\nexec_poll_interval_ms = 0")]
    #[case("[docker]\ndefault_image = \"  \"")]
    #[case("[store]\ncommit_period_secs = 0")]
    #[case("[pool]\nexecutor = \"vm\"")]
    fn invalid_configs_are_rejected(#[case] raw: &str) {
        assert!(matches!(Config::from_toml(raw), Err(ArrebolError::Config(_))));
    }
}
