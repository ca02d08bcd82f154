#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use arrebol::docker::{ContainerError, ContainerRuntime, ContainerSpecification, ExecStatus};
use arrebol::executor::{ExecutionTask, TaskExecutionResult, TaskExecutor};
use arrebol::manager::JobRegistry;
use arrebol::tasks::{Job, JobId, JobRequest, TaskId, TaskSpecRequest};

/// Executor that runs nothing. It records dispatch order and how many tasks
/// it was running at once.
///
/// Commands are interpreted: `exit N` finishes with code N, `lost` fails
/// with no exit code, `panic` panics the worker, anything else exits 0.
#[derive(Default)]
pub struct RecordingExecutor {
    pub started: Mutex<Vec<TaskId>>,
    running: AtomicUsize,
    pub max_running: AtomicUsize,
    delay: Duration,
}

impl RecordingExecutor {
    pub fn with_delay(delay: Duration) -> Self {
        RecordingExecutor {
            delay,
            ..Default::default()
        }
    }

    pub fn started(&self) -> Vec<TaskId> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskExecutor for RecordingExecutor {
    fn kind(&self) -> &'static str {
        "recording"
    }

    async fn execute(&self, mut task: ExecutionTask) -> TaskExecutionResult {
        self.started.lock().unwrap().push(task.task_id);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        for command in &mut task.commands {
            command.start();
            match command.command.as_str() {
                "panic" => panic!("worker blew up"),
                "lost" => command.fail(),
                other => match other.strip_prefix("exit ") {
                    Some(code) => command.complete(code.trim().parse().unwrap_or(1)),
                    None => command.complete(0),
                },
            }
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        TaskExecutionResult::from_commands(task.commands)
    }
}

/// In-memory container runtime. Every call is appended to `calls`.
///
/// Exec exit codes come from the command: `exit N` gives N, `no-code` gives
/// none, anything else 0.
#[derive(Default)]
pub struct FakeRuntime {
    pub calls: Mutex<Vec<String>>,
    pub created: Mutex<Vec<ContainerSpecification>>,
    pub fail_pull: bool,
    pub fail_start: bool,
    pub fail_remove: bool,
    /// Command whose exec creation fails.
    pub fail_exec_of: Option<String>,
    /// How many inspections report an exec as still running.
    pub running_polls: usize,
    pub execs: Mutex<HashMap<String, (String, usize)>>,
    pub next_exec: AtomicUsize,
}

impl FakeRuntime {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn address(&self) -> String {
        "fake://docker".to_string()
    }

    async fn pull_image(&self, image: &str) -> Result<(), ContainerError> {
        self.record(format!("pull {image}"));
        if self.fail_pull {
            return Err(ContainerError::Runtime("manifest unknown".to_string()));
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpecification) -> Result<String, ContainerError> {
        self.record(format!("create {}", spec.name));
        self.created.lock().unwrap().push(spec.clone());
        Ok(format!("id-{}", spec.name))
    }

    async fn start_container(&self, name: &str) -> Result<(), ContainerError> {
        self.record(format!("start {name}"));
        if self.fail_start {
            return Err(ContainerError::Runtime("cannot start".to_string()));
        }
        Ok(())
    }

    async fn create_exec(&self, container: &str, command: &str) -> Result<String, ContainerError> {
        self.record(format!("exec_create {container} {command}"));
        if self.fail_exec_of.as_deref() == Some(command) {
            return Err(ContainerError::Runtime("exec refused".to_string()));
        }
        let id = format!("exec-{}", self.next_exec.fetch_add(1, Ordering::SeqCst));
        self.execs
            .lock()
            .unwrap()
            .insert(id.clone(), (command.to_string(), 0));
        Ok(id)
    }

    async fn start_exec(&self, exec_id: &str) -> Result<(), ContainerError> {
        self.record(format!("exec_start {exec_id}"));
        Ok(())
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecStatus, ContainerError> {
        self.record(format!("exec_inspect {exec_id}"));
        let mut execs = self.execs.lock().unwrap();
        let (command, polls) = execs
            .get_mut(exec_id)
            .ok_or_else(|| ContainerError::Runtime(format!("no such exec {exec_id}")))?;

        *polls += 1;
        if *polls <= self.running_polls {
            return Ok(ExecStatus {
                id: exec_id.to_string(),
                running: true,
                exit_code: None,
            });
        }

        let exit_code = match command.strip_prefix("exit ") {
            Some(code) => code.trim().parse().ok(),
            None if command == "no-code" => None,
            None => Some(0),
        };
        Ok(ExecStatus {
            id: exec_id.to_string(),
            running: false,
            exit_code,
        })
    }

    async fn stop_container(&self, name: &str) -> Result<(), ContainerError> {
        self.record(format!("stop {name}"));
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<(), ContainerError> {
        self.record(format!("remove {name}"));
        if self.fail_remove {
            return Err(ContainerError::Runtime("device busy".to_string()));
        }
        Ok(())
    }
}

pub fn task_request(commands: &[&str]) -> TaskSpecRequest {
    TaskSpecRequest {
        commands: commands.iter().map(|c| c.to_string()).collect(),
        ..Default::default()
    }
}

pub fn task_request_with(requirements: &[(&str, &str)], commands: &[&str]) -> TaskSpecRequest {
    TaskSpecRequest {
        requirements: requirements
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        ..task_request(commands)
    }
}

pub fn job_request(tasks: Vec<TaskSpecRequest>) -> JobRequest {
    JobRequest { label: None, tasks }
}

/// Polls the registry until the job satisfies `done`, failing the test after
/// five seconds.
pub async fn wait_for_job<F>(registry: &JobRegistry, job_id: JobId, done: F) -> Job
where
    F: Fn(&Job) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = registry.job(job_id).await.unwrap();
        if done(&job) {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} never reached the expected state, last state {:?}",
            job.state
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
