use std::{io, process::ExitStatus};

/// Events forwarded from a running subprocess to the executor thread.
#[derive(Debug)]
pub enum StepMessage {
    Stdout(String),
    Stderr(String),
    Exited(io::Result<ExitStatus>),
}
