use std::io::Write;

use crossterm::style::Stylize;
use log::error;

use crate::app::prompt::Prompter;
use crate::manager::task_runner::TaskRunner;
use crate::models::task::{RunSummary, Task, TaskStatus};
use crate::worker::{executor::Executor, signal::CancelToken};

pub const EXIT_INPUT_ERROR: u8 = 2;
pub const EXIT_CONFIG_ERROR: u8 = 3;

const COMPLETION_MESSAGE: &str =
    "Done!\n Make sure you git clone your dotfiles, after setting up SSH.";

/// Asks every question, then runs the selected tasks. `arm_interrupt` is
/// called between the two phases so Ctrl-C keeps its default meaning while
/// the user is still answering. The summary goes to `out`. Returns the
/// process exit code.
pub fn run_cli<P, E, W, F>(
    tasks: Vec<Task>,
    prompter: &mut P,
    executor: &mut E,
    out: &mut W,
    cancel: &CancelToken,
    arm_interrupt: F,
) -> u8
where
    P: Prompter + ?Sized,
    E: Executor + ?Sized,
    W: Write + ?Sized,
    F: FnOnce(),
{
    let selection = match TaskRunner::new(tasks).select(prompter) {
        Ok(selection) => selection,
        Err(e) => {
            error!("{}", e);
            eprintln!("{} {}", "Aborted:".red().bold(), e);
            return EXIT_INPUT_ERROR;
        }
    };

    arm_interrupt();
    let summary = selection.execute(executor, cancel);
    if let Err(e) = writeln!(out, "{}", render_summary(&summary)).and_then(|_| out.flush()) {
        error!("Failed to print the summary: {}", e);
    }
    summary.exit_code()
}

pub fn render_summary(summary: &RunSummary) -> String {
    let mut lines = vec![String::new(), "Summary:".bold().to_string()];
    for outcome in &summary.outcomes {
        let marker = match outcome.status {
            TaskStatus::Completed => "✓".green(),
            TaskStatus::Failed => "✗".red(),
            TaskStatus::Cancelled => "!".yellow(),
            TaskStatus::Skipped | TaskStatus::Pending => "-".dark_grey(),
        };
        lines.push(format!("  {} {} ({:?})", marker, outcome.label, outcome.status));
        for failure in &outcome.failures {
            lines.push(format!("      {}: {}", failure.step, failure.error));
        }
    }

    if summary.interrupted {
        let notice = "Interrupted, remaining tasks were not run.".yellow();
        lines.push(format!("\n{}", notice));
    } else if summary.any_failed() {
        lines.push(format!(
            "\n{} of {} selected tasks failed, re-run to retry them.",
            summary.count(TaskStatus::Failed),
            summary.outcomes.len() - summary.count(TaskStatus::Skipped)
        ));
    }
    lines.push(format!("\n\n{}", COMPLETION_MESSAGE));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::task_runner::tests::{
        task, Journal, RecordingExecutor, ScriptedPrompter,
    };

    fn six_tasks() -> Vec<Task> {
        ["deps", "flatpak", "nvm", "dirs", "omz", "nvim"]
            .iter()
            .map(|name| task(name, &[*name]))
            .collect()
    }

    #[test]
    fn only_first_task_runs_when_only_first_is_confirmed() {
        let journal = Journal::default();
        let answers = [true, false, false, false, false, false];
        let mut prompter = ScriptedPrompter::new(&answers, &journal);
        let mut executor = RecordingExecutor::new(&journal);
        let mut out = Vec::new();
        let mut armed = false;

        let code = run_cli(
            six_tasks(),
            &mut prompter,
            &mut executor,
            &mut out,
            &CancelToken::default(),
            || armed = true,
        );

        assert_eq!(code, 0);
        assert!(armed);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("deps (Completed)"));
        assert!(printed.contains("flatpak (Skipped)"));
        assert!(printed.trim_end().ends_with(COMPLETION_MESSAGE));
        let runs: Vec<String> = journal
            .borrow()
            .iter()
            .filter(|entry| entry.starts_with("run "))
            .cloned()
            .collect();
        assert_eq!(runs, vec!["run deps"]);
    }

    #[test]
    fn input_error_exits_without_running_or_arming() {
        let journal = Journal::default();
        let mut prompter = ScriptedPrompter::new(&[true, true], &journal);
        let mut executor = RecordingExecutor::new(&journal);
        let mut out = Vec::new();
        let mut armed = false;

        let code = run_cli(
            six_tasks(),
            &mut prompter,
            &mut executor,
            &mut out,
            &CancelToken::default(),
            || armed = true,
        );

        assert_eq!(code, EXIT_INPUT_ERROR);
        assert!(!armed);
        assert!(out.is_empty());
        assert!(journal.borrow().iter().all(|entry| entry.starts_with("ask ")));
    }

    #[test]
    fn summary_reports_failures_and_completion_message() {
        let journal = Journal::default();
        let tasks = vec![task("Broken", &["fail step"]), task("Fine", &["ok"])];
        let summary = TaskRunner::new(tasks)
            .select(&mut ScriptedPrompter::new(&[true, true], &journal))
            .unwrap()
            .execute(
                &mut RecordingExecutor::new(&journal),
                &CancelToken::default(),
            );

        let text = render_summary(&summary);
        assert!(text.contains("Broken (Failed)"));
        assert!(text.contains("fail step: exited with status 1"));
        assert!(text.contains("Fine (Completed)"));
        assert!(text.contains("1 of 2 selected tasks failed"));
        assert!(text.ends_with(COMPLETION_MESSAGE));
    }
}
