use super::types::{CommandState, JobState, TaskState};

pub fn valid_task_transition(src: &TaskState, dst: &TaskState) -> bool {
    match src {
        TaskState::Ready => matches!(dst, TaskState::Queued | TaskState::Failed),
        TaskState::Queued => matches!(dst, TaskState::Running | TaskState::Failed),
        TaskState::Running => matches!(dst, TaskState::Finished | TaskState::Failed),
        TaskState::Finished | TaskState::Failed => false,
    }
}

pub fn valid_command_transition(src: &CommandState, dst: &CommandState) -> bool {
    match src {
        // a command whose resource never came up fails without running
        CommandState::Pending => matches!(dst, CommandState::Running | CommandState::Failed),
        CommandState::Running => matches!(dst, CommandState::Finished | CommandState::Failed),
        CommandState::Finished | CommandState::Failed => false,
    }
}

/// Derives a job's state from the states of its tasks.
///
/// Until every task is terminal the job is RUNNING as soon as one task has
/// been dispatched, READY otherwise. Once all are terminal it is FAILED if
/// any task failed and FINISHED otherwise.
pub fn aggregate_job_state<I>(task_states: I) -> JobState
where
    I: IntoIterator<Item = TaskState>,
{
    let mut any = false;
    let mut all_terminal = true;
    let mut any_failed = false;
    let mut any_started = false;

    for state in task_states {
        any = true;
        match state {
            TaskState::Ready | TaskState::Queued => all_terminal = false,
            TaskState::Running => {
                all_terminal = false;
                any_started = true;
            }
            TaskState::Finished => any_started = true,
            TaskState::Failed => {
                any_started = true;
                any_failed = true;
            }
        }
    }

    if !any {
        return JobState::Ready;
    }
    if all_terminal {
        if any_failed {
            JobState::Failed
        } else {
            JobState::Finished
        }
    } else if any_started {
        JobState::Running
    } else {
        JobState::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::ready_to_queued(TaskState::Ready, TaskState::Queued, true)]
    #[case::queued_to_running(TaskState::Queued, TaskState::Running, true)]
    #[case::queued_to_failed(TaskState::Queued, TaskState::Failed, true)]
    #[case::running_to_finished(TaskState::Running, TaskState::Finished, true)]
    #[case::running_to_failed(TaskState::Running, TaskState::Failed, true)]
    #[case::ready_to_running(TaskState::Ready, TaskState::Running, false)]
    #[case::running_to_queued(TaskState::Running, TaskState::Queued, false)]
    #[case::finished_to_queued(TaskState::Finished, TaskState::Queued, false)]
    #[case::failed_to_running(TaskState::Failed, TaskState::Running, false)]
    fn task_transitions(#[case] src: TaskState, #[case] dst: TaskState, #[case] valid: bool) {
        assert_eq!(valid_task_transition(&src, &dst), valid);
    }

    #[rstest]
    #[case::pending_to_running(CommandState::Pending, CommandState::Running, true)]
    #[case::pending_to_failed(CommandState::Pending, CommandState::Failed, true)]
    #[case::running_to_finished(CommandState::Running, CommandState::Finished, true)]
    #[case::running_to_failed(CommandState::Running, CommandState::Failed, true)]
    #[case::pending_to_finished(CommandState::Pending, CommandState::Finished, false)]
    #[case::finished_to_running(CommandState::Finished, CommandState::Running, false)]
    #[case::failed_to_finished(CommandState::Failed, CommandState::Finished, false)]
    fn command_transitions(
        #[case] src: CommandState,
        #[case] dst: CommandState,
        #[case] valid: bool,
    ) {
        assert_eq!(valid_command_transition(&src, &dst), valid);
    }

    #[rstest]
    #[case::all_finished(vec![TaskState::Finished, TaskState::Finished], JobState::Finished)]
    #[case::one_failed(vec![TaskState::Finished, TaskState::Failed], JobState::Failed)]
    #[case::running_and_finished(vec![TaskState::Running, TaskState::Finished], JobState::Running)]
    #[case::running_and_failed(vec![TaskState::Running, TaskState::Failed], JobState::Running)]
    #[case::queued_and_finished(vec![TaskState::Queued, TaskState::Finished], JobState::Running)]
    #[case::all_queued(vec![TaskState::Queued, TaskState::Ready], JobState::Ready)]
    #[case::empty(vec![], JobState::Ready)]
    fn job_aggregation(#[case] states: Vec<TaskState>, #[case] expected: JobState) {
        assert_eq!(aggregate_job_state(states), expected);
    }
}
