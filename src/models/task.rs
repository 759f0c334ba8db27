use super::step::{Step, StepError};

/// A named list of steps performing one feature's setup.
#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    pub steps: Vec<Step>,
}

impl Action {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub label: String,
    pub action: Action,
    pub selected: bool,
}

impl Task {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
            selected: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Skipped,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug)]
pub struct StepFailure {
    pub step: String,
    pub error: StepError,
}

#[derive(Debug)]
pub struct TaskOutcome {
    pub label: String,
    pub status: TaskStatus,
    pub failures: Vec<StepFailure>,
}

impl TaskOutcome {
    pub fn new(label: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            label: label.into(),
            status,
            failures: vec![],
        }
    }
}

/// Aggregated result of an execution phase.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<TaskOutcome>,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn any_failed(&self) -> bool {
        self.outcomes
            .iter()
            .any(|outcome| outcome.status == TaskStatus::Failed)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == status)
            .count()
    }

    /// Interrupted runs exit with 130, failed runs with 1.
    pub fn exit_code(&self) -> u8 {
        if self.interrupted {
            130
        } else if self.any_failed() {
            1
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: TaskStatus) -> TaskOutcome {
        TaskOutcome::new("task", status)
    }

    #[test]
    fn exit_code_reflects_failures_and_interrupts() {
        let mut summary = RunSummary {
            outcomes: vec![outcome(TaskStatus::Completed), outcome(TaskStatus::Skipped)],
            interrupted: false,
        };
        assert_eq!(summary.exit_code(), 0);

        summary.outcomes.push(outcome(TaskStatus::Failed));
        assert!(summary.any_failed());
        assert_eq!(summary.exit_code(), 1);

        summary.interrupted = true;
        assert_eq!(summary.exit_code(), 130);
    }

    #[test]
    fn new_tasks_are_unselected() {
        let task = Task::new("Install?", Action::new("noop", vec![]));
        assert!(!task.selected);
        assert_eq!(task.action.name, "noop");
    }
}
