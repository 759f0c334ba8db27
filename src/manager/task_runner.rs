use crossterm::style::Stylize;
use log::{error, info, warn};

use crate::app::prompt::{PromptError, Prompter};
use crate::models::{
    step::StepError,
    task::{RunSummary, StepFailure, Task, TaskOutcome, TaskStatus},
};
use crate::worker::{executor::Executor, signal::CancelToken};

/// Ordered task list awaiting the user's answers.
pub struct TaskRunner {
    tasks: Vec<Task>,
}

/// Tasks with their answers recorded. Only this type can execute, and doing
/// so consumes it, so every task runs at most once and only after selection.
pub struct Selection {
    tasks: Vec<Task>,
}

impl TaskRunner {
    pub fn new(tasks: Vec<Task>) -> Self {
        TaskRunner { tasks }
    }

    pub fn select<P: Prompter + ?Sized>(
        mut self,
        prompter: &mut P,
    ) -> Result<Selection, PromptError> {
        for task in self.tasks.iter_mut() {
            task.selected = prompter.confirm(&task.label)?;
        }
        let selection = Selection { tasks: self.tasks };
        info!(
            "{} of {} tasks selected.",
            selection.selected().count(),
            selection.tasks.len()
        );
        Ok(selection)
    }
}

impl Selection {
    pub fn selected(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|task| task.selected)
    }

    pub fn execute<E: Executor + ?Sized>(
        self,
        executor: &mut E,
        cancel: &CancelToken,
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        for task in self.tasks {
            let outcome = if !task.selected {
                TaskOutcome::new(task.label, TaskStatus::Skipped)
            } else if cancel.is_cancelled() {
                TaskOutcome::new(task.label, TaskStatus::Cancelled)
            } else {
                run_action(&task, executor, cancel)
            };
            summary.outcomes.push(outcome);
        }
        summary.interrupted = cancel.is_cancelled();
        summary
    }
}

fn run_action<E: Executor + ?Sized>(
    task: &Task,
    executor: &mut E,
    cancel: &CancelToken,
) -> TaskOutcome {
    println!("\n{} {}", "==>".cyan().bold(), task.label.as_str().bold());
    info!("Starting action '{}'.", task.action.name);

    let mut outcome = TaskOutcome::new(task.label.as_str(), TaskStatus::Pending);
    for step in &task.action.steps {
        if cancel.is_cancelled() {
            outcome.status = TaskStatus::Cancelled;
            return outcome;
        }
        println!("{} {}", "->".cyan(), step.description);
        match executor.execute(step, cancel) {
            Ok(()) => println!("{} {}", "✓".green(), step.description),
            Err(StepError::Cancelled) => {
                warn!("Action '{}' cancelled during '{}'.", task.action.name, step.description);
                outcome.status = TaskStatus::Cancelled;
                return outcome;
            }
            Err(e) if step.tolerate_failure => {
                warn!("{} failed, continuing: {}", step.description, e);
            }
            Err(e) => {
                error!("{} failed: {}", step.description, e);
                outcome.failures.push(StepFailure {
                    step: step.description.clone(),
                    error: e,
                });
            }
        }
    }

    outcome.status = if outcome.failures.is_empty() {
        TaskStatus::Completed
    } else {
        TaskStatus::Failed
    };
    info!("Action '{}' finished: {:?}", task.action.name, outcome.status);
    outcome
}
