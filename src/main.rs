mod app;
mod manager;
mod models;
mod recipes;
mod worker;

use std::{io, process::ExitCode};

use app::{cli, prompt::ConsolePrompter, settings::Settings};
use log::{debug, error};
use worker::{executor::ShellExecutor, signal};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(cli::EXIT_CONFIG_ERROR);
        }
    };
    debug!("{:?}", settings);

    let tasks = recipes::workstation_tasks(&settings.home);
    let mut prompter = ConsolePrompter::stdio();
    let mut executor = ShellExecutor::new(&settings.shell, settings.step_timeout);
    let cancel = signal::CancelToken::from_interrupt();

    let code = cli::run_cli(
        tasks,
        &mut prompter,
        &mut executor,
        &mut io::stdout(),
        &cancel,
        signal::install_interrupt_handler,
    );
    ExitCode::from(code)
}
