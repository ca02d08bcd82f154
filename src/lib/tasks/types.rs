use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::requirements::Requirements;
use crate::error::{ArrebolError, Result};

pub type JobId = Uuid;
pub type TaskId = Uuid;

/// Upper bound on the number of commands a single task may carry.
pub const MAX_COMMANDS_PER_TASK: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    Ready,
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Ready,
    Queued,
    Running,
    Finished,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandState {
    Pending,
    Running,
    Finished,
    Failed,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Ready => write!(f, "READY"),
            TaskState::Queued => write!(f, "QUEUED"),
            TaskState::Running => write!(f, "RUNNING"),
            TaskState::Finished => write!(f, "FINISHED"),
            TaskState::Failed => write!(f, "FAILED"),
        }
    }
}

/// A single shell instruction of a task.
///
/// `exit_code` stays `None` (undetermined) until the command actually ran to
/// completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub command: String,
    pub state: CommandState,
    pub exit_code: Option<i32>,
}

impl Command {
    pub fn new(command: impl Into<String>) -> Self {
        Command {
            command: command.into(),
            state: CommandState::Pending,
            exit_code: None,
        }
    }

    /// PENDING -> RUNNING.
    pub fn start(&mut self) {
        self.advance(CommandState::Running);
    }

    /// Records a command that ran to completion. Any exit status, zero or
    /// not, ends the command FINISHED with its code kept.
    pub fn complete(&mut self, exit_code: i32) {
        if self.advance(CommandState::Finished) {
            self.exit_code = Some(exit_code);
        }
    }

    /// Marks the command FAILED with an undetermined exit code.
    pub fn fail(&mut self) {
        if self.advance(CommandState::Failed) {
            self.exit_code = None;
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == CommandState::Finished
    }

    fn advance(&mut self, dst: CommandState) -> bool {
        if super::state::valid_command_transition(&self.state, &dst) {
            self.state = dst;
            return true;
        }
        tracing::warn!(
            command = %self.command,
            from = ?self.state,
            to = ?dst,
            "Ignoring invalid command state transition"
        );
        false
    }
}

/// Task specification as received from a submitter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSpecRequest {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub requirements: HashMap<String, String>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    pub commands: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Immutable, validated description of what a task needs and runs.
///
/// The requirement map is parsed once here; matching and container creation
/// work on the structured [`Requirements`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TaskSpecRequest")]
pub struct TaskSpec {
    label: Option<String>,
    requirements: HashMap<String, String>,
    env_vars: HashMap<String, String>,
    commands: Vec<String>,
    metadata: HashMap<String, String>,
    #[serde(skip)]
    parsed: Requirements,
}

impl TaskSpec {
    pub fn new(request: TaskSpecRequest) -> Result<Self> {
        if request.commands.is_empty() {
            return Err(ArrebolError::InvalidSubmission(
                "a task needs at least one command".to_string(),
            ));
        }
        if request.commands.len() > MAX_COMMANDS_PER_TASK {
            return Err(ArrebolError::InvalidSubmission(format!(
                "a task may not carry more than {} commands, got {}",
                MAX_COMMANDS_PER_TASK,
                request.commands.len()
            )));
        }
        let parsed = Requirements::parse(&request.requirements)?;

        Ok(TaskSpec {
            label: request.label,
            requirements: request.requirements,
            env_vars: request.env_vars,
            commands: request.commands,
            metadata: request.metadata,
            parsed,
        })
    }

    /// Convenience constructor for a spec with only commands.
    pub fn with_commands<I, S>(commands: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(TaskSpecRequest {
            commands: commands.into_iter().map(Into::into).collect(),
            ..Default::default()
        })
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn raw_requirements(&self) -> &HashMap<String, String> {
        &self.requirements
    }

    pub fn requirements(&self) -> &Requirements {
        &self.parsed
    }

    pub fn env_vars(&self) -> &HashMap<String, String> {
        &self.env_vars
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}

impl TryFrom<TaskSpecRequest> for TaskSpec {
    type Error = ArrebolError;

    fn try_from(request: TaskSpecRequest) -> Result<Self> {
        TaskSpec::new(request)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,
    pub spec: TaskSpec,
    pub state: TaskState,
    pub commands: Vec<Command>,
    #[serde(skip)]
    pub cancel: CancellationToken,
}

impl Task {
    pub fn new(job_id: JobId, spec: TaskSpec) -> Self {
        let commands = spec.commands().iter().map(Command::new).collect();
        Task {
            id: Uuid::new_v4(),
            job_id,
            spec,
            state: TaskState::Ready,
            commands,
            cancel: CancellationToken::new(),
        }
    }

    /// Moves the task to `dst`, refusing transitions the state machine does
    /// not allow.
    pub fn transition(&mut self, dst: TaskState) -> Result<()> {
        if !super::state::valid_task_transition(&self.state, &dst) {
            return Err(ArrebolError::InvalidTransition {
                task_id: self.id,
                from: self.state,
                to: dst,
            });
        }
        self.state = dst;
        Ok(())
    }

    /// Fails every command that has not reached a terminal state.
    pub fn fail_unfinished_commands(&mut self) {
        for command in &mut self.commands {
            if matches!(command.state, CommandState::Pending | CommandState::Running) {
                command.fail();
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub label: Option<String>,
    pub tasks: Vec<TaskSpecRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub label: Option<String>,
    pub state: JobState,
    pub tasks: HashMap<TaskId, Task>,
    /// Submission order of `tasks`, used when enqueueing.
    pub task_order: Vec<TaskId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(label: Option<String>, specs: Vec<TaskSpec>) -> Result<Self> {
        if specs.is_empty() {
            return Err(ArrebolError::InvalidSubmission(
                "a job needs at least one task".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let mut tasks = HashMap::with_capacity(specs.len());
        let mut task_order = Vec::with_capacity(specs.len());
        for spec in specs {
            let task = Task::new(id, spec);
            task_order.push(task.id);
            tasks.insert(task.id, task);
        }

        let now = Utc::now();
        Ok(Job {
            id,
            label,
            state: JobState::Created,
            tasks,
            task_order,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn from_request(request: JobRequest) -> Result<Self> {
        let specs = request
            .tasks
            .into_iter()
            .map(TaskSpec::new)
            .collect::<Result<Vec<_>>>()?;
        Job::new(request.label, specs)
    }

    /// Tasks in submission order.
    pub fn ordered_tasks(&self) -> impl Iterator<Item = &Task> {
        self.task_order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Recomputes the job state from its tasks.
    pub fn refresh_state(&mut self) {
        let state = super::state::aggregate_job_state(self.tasks.values().map(|t| t.state));
        if state != self.state {
            tracing::debug!(job_id = %self.id, from = ?self.state, to = ?state, "Job state changed");
            self.state = state;
        }
        self.updated_at = Utc::now();
    }
}
