use std::io::{self, BufRead, Write};

use log::{error, warn};
use thiserror::Error;

/// Consecutive read failures tolerated before giving up on stdin.
const MAX_READ_ERRORS: usize = 3;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("standard input closed before an answer was given")]
    EndOfInput,
    #[error("failed to read from standard input: {0}")]
    Read(#[source] io::Error),
    #[error("failed to write prompt: {0}")]
    Write(#[source] io::Error),
}

pub trait Prompter {
    fn confirm(&mut self, question: &str) -> Result<bool, PromptError>;
}

/// Maps a raw response to an answer; `None` means ask again.
pub fn parse_answer(response: &str) -> Option<bool> {
    match response.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Asks yes/no questions over a line-oriented reader and writer.
pub struct ConsolePrompter<R, W> {
    input: R,
    output: W,
}

impl ConsolePrompter<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsolePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, question: &str) -> Result<(), PromptError> {
        write!(self.output, "{} [y/n]: ", question)
            .and_then(|_| self.output.flush())
            .map_err(PromptError::Write)
    }
}

impl<R: BufRead, W: Write> Prompter for ConsolePrompter<R, W> {
    fn confirm(&mut self, question: &str) -> Result<bool, PromptError> {
        let mut read_errors = 0;
        loop {
            self.ask(question)?;

            let mut response = String::new();
            match self.input.read_line(&mut response) {
                Ok(0) => {
                    error!("Standard input closed while asking '{}'.", question);
                    return Err(PromptError::EndOfInput);
                }
                Ok(_) => {
                    read_errors = 0;
                    if let Some(answer) = parse_answer(&response) {
                        return Ok(answer);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    read_errors += 1;
                    if read_errors >= MAX_READ_ERRORS {
                        return Err(PromptError::Read(e));
                    }
                    warn!("Error reading answer: {}", e);
                }
            }
        }
    }
}
