use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use arrebol::config::{Config, ExecutorKind};
use arrebol::docker::{BollardRuntime, ContainerRuntime, DockerTaskExecutor};
use arrebol::executor::{RawTaskExecutor, TaskExecutor};
use arrebol::manager::{JobRegistry, JobServer, JobStore, JsonFileStore, LogStore, run_snapshots};
use arrebol::queue::TaskQueue;
use arrebol::resource::{Resource, ResourcePool, StaticPool};
use arrebol::scheduler::{PolicyKind, Scheduler};

#[derive(Parser, Debug)]
#[command(name = "arrebol", about = "Task-execution scheduler", version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "ARREBOL_CONFIG")]
    config: Option<PathBuf>,

    /// Address the job API listens on
    #[arg(long)]
    listen_addr: Option<String>,

    /// Number of resources in the pool
    #[arg(long)]
    pool_size: Option<usize>,

    #[arg(long, value_enum)]
    executor: Option<ExecutorKind>,

    #[arg(long, value_enum)]
    policy: Option<PolicyKind>,

    /// Docker Engine socket
    #[arg(long, env = "ARREBOL_DOCKER_ADDRESS")]
    docker_address: Option<String>,

    /// Job snapshot file
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn into_config(self) -> arrebol::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(listen_addr) = self.listen_addr {
            config.listen_addr = listen_addr;
        }
        if let Some(size) = self.pool_size {
            config.pool.size = size;
        }
        if let Some(executor) = self.executor {
            config.pool.executor = executor;
        }
        if let Some(policy) = self.policy {
            config.scheduler.policy = policy;
        }
        if let Some(address) = self.docker_address {
            config.docker.address = Some(address);
        }
        if let Some(path) = self.store_path {
            config.store.path = Some(path);
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Seeds the pool with match-any resources named `resourceId-<n>`.
fn build_pool(config: &Config) -> arrebol::Result<StaticPool> {
    let runtime: Option<Arc<dyn ContainerRuntime>> = match config.pool.executor {
        ExecutorKind::Docker => Some(Arc::new(BollardRuntime::connect(
            config.docker.address.as_deref(),
        )?)),
        ExecutorKind::Raw => None,
    };

    let resources = (0..config.pool.size)
        .map(|i| {
            let id = format!("resourceId-{i}");
            let executor: Arc<dyn TaskExecutor> = match &runtime {
                Some(runtime) => Arc::new(DockerTaskExecutor::new(
                    id.clone(),
                    Arc::clone(runtime),
                    config.docker.executor_options(),
                )),
                None => Arc::new(RawTaskExecutor::new(config.executor.command_timeout())),
            };
            Resource::match_any(id, config.pool.id, executor)
        })
        .collect();

    Ok(StaticPool::new(config.pool.id, resources))
}

/// Cancels `shutdown` once `signal` fires. A signal listener that cannot be
/// installed leaves the service running.
async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c, running without a signal handler");
        return;
    }
    tracing::info!("Shutdown requested");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.json_logs);
    let config = args.into_config()?;
    tracing::info!(?config, "Starting arrebol");

    let queue = Arc::new(TaskQueue::default());
    let pool: Arc<dyn ResourcePool> = Arc::new(build_pool(&config)?);
    let registry = Arc::new(JobRegistry::new(Arc::clone(&queue)));
    let store: Arc<dyn JobStore> = match &config.store.path {
        Some(path) => Arc::new(JsonFileStore::new(path)),
        None => Arc::new(LogStore),
    };

    let shutdown = CancellationToken::new();

    let scheduler = Scheduler::new(
        Arc::clone(&queue),
        Arc::clone(&pool),
        Arc::clone(&registry),
        config.scheduler.policy.build(),
    )
    .with_poll_interval(config.scheduler.poll_interval());
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

    let snapshot_handle = tokio::spawn(run_snapshots(
        Arc::clone(&registry),
        store,
        config.store.commit_period(),
        shutdown.clone(),
    ));

    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), shutdown.clone()));

    let server = JobServer::new(registry, pool);
    let served = server.start_server(&config.listen_addr, shutdown.clone()).await;
    shutdown.cancel();

    let _ = tokio::join!(scheduler_handle, snapshot_handle);
    served?;
    Ok(())
}
