use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::registry::JobRegistry;
use crate::error::{ArrebolError, Result};
use crate::tasks::types::Job;

pub const DEFAULT_COMMIT_PERIOD: Duration = Duration::from_secs(20);

/// Destination of periodic job snapshots.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save(&self, jobs: &[Job]) -> Result<()>;
}

/// Writes the snapshot as one JSON array. The file is replaced atomically,
/// so readers see either the previous snapshot or the new one.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Vec<Job>> {
        let bytes = tokio::fs::read(&self.path).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ArrebolError::Persistence(format!("invalid snapshot {}: {e}", self.path.display()))
        })
    }
}

#[async_trait]
impl JobStore for JsonFileStore {
    async fn save(&self, jobs: &[Job]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(jobs)
            .map_err(|e| ArrebolError::Persistence(format!("failed to encode jobs: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), jobs = jobs.len(), "Snapshot written");
        Ok(())
    }
}

/// Store that only reports what it would have saved.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStore;

#[async_trait]
impl JobStore for LogStore {
    async fn save(&self, jobs: &[Job]) -> Result<()> {
        tracing::info!(jobs = jobs.len(), "Job snapshot");
        Ok(())
    }
}

/// Hands a copy of every job to `store` once per `period`, the first time
/// one period after start. Save failures are logged and otherwise ignored.
pub async fn run_snapshots(
    registry: Arc<JobRegistry>,
    store: Arc<dyn JobStore>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(period = ?period, "Snapshot loop started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => snapshot(&registry, store.as_ref()).await,
        }
    }

    snapshot(&registry, store.as_ref()).await;
    tracing::info!("Snapshot loop stopped");
}

async fn snapshot(registry: &JobRegistry, store: &dyn JobStore) {
    let jobs = registry.jobs().await;
    if let Err(e) = store.save(&jobs).await {
        tracing::warn!(error = %e, "Failed to save job snapshot");
    }
}
