use std::{
    fmt, io,
    path::{Path, PathBuf},
    time::Duration,
};

use thiserror::Error;

/// What a step does when executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    /// Run a program directly with the given arguments.
    Exec { program: String, args: Vec<String> },
    /// Run a fragment through the configured shell with `-c`.
    Shell(String),
    /// Create a directory and its parents. Existing directories are fine.
    CreateDir(PathBuf),
    /// Remove everything inside a directory, hidden entries included, leaving
    /// it empty. A missing directory is created.
    ClearDir(PathBuf),
    /// Append `line` to a file unless the file already has that exact line.
    EnsureLine { path: PathBuf, line: String },
    /// Create or replace a file, creating parent directories first.
    WriteFile {
        path: PathBuf,
        contents: String,
        mode: Option<u32>,
    },
}

/// One declarative unit of work inside an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub description: String,
    pub kind: StepKind,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub tolerate_failure: bool,
    pub timeout: Option<Duration>,
}

impl Step {
    fn from_kind(kind: StepKind) -> Self {
        Self {
            description: kind.to_string(),
            kind,
            working_dir: None,
            env: vec![],
            tolerate_failure: false,
            timeout: None,
        }
    }

    pub fn exec<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_kind(StepKind::Exec {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        })
    }

    pub fn shell(script: impl Into<String>) -> Self {
        Self::from_kind(StepKind::Shell(script.into()))
    }

    pub fn create_dir(path: impl Into<PathBuf>) -> Self {
        Self::from_kind(StepKind::CreateDir(path.into()))
    }

    pub fn clear_dir(path: impl Into<PathBuf>) -> Self {
        Self::from_kind(StepKind::ClearDir(path.into()))
    }

    pub fn ensure_line(path: impl Into<PathBuf>, line: impl Into<String>) -> Self {
        Self::from_kind(StepKind::EnsureLine {
            path: path.into(),
            line: line.into(),
        })
    }

    pub fn write_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self::from_kind(StepKind::WriteFile {
            path: path.into(),
            contents: contents.into(),
            mode: None,
        })
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn tolerate_failure(mut self) -> Self {
        self.tolerate_failure = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Only meaningful for `WriteFile` steps.
    pub fn mode(mut self, mode: u32) -> Self {
        if let StepKind::WriteFile { mode: ref mut m, .. } = self.kind {
            *m = Some(mode);
        }
        self
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Exec { program, args } => {
                write!(f, "{}", program)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            StepKind::Shell(script) => {
                let first = script.lines().next().unwrap_or_default();
                if script.lines().nth(1).is_some() {
                    write!(f, "{} ...", first)
                } else {
                    write!(f, "{}", first)
                }
            }
            StepKind::CreateDir(path) => write!(f, "create {}", path.display()),
            StepKind::ClearDir(path) => write!(f, "clear {}", path.display()),
            StepKind::EnsureLine { path, .. } => write!(f, "update {}", path.display()),
            StepKind::WriteFile { path, .. } => write!(f, "write {}", path.display()),
        }
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{}", exit_message(.code, .stderr_tail))]
    Exit {
        code: Option<i32>,
        stderr_tail: Vec<String>,
    },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled by interrupt")]
    Cancelled,
    #[error("{}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to wait for child process: {0}")]
    Wait(#[source] io::Error),
}

impl StepError {
    pub fn filesystem(path: &Path, source: io::Error) -> Self {
        StepError::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn exit_message(code: &Option<i32>, stderr_tail: &[String]) -> String {
    let mut message = match code {
        Some(code) => format!("exited with status {}", code),
        None => "terminated by signal".to_string(),
    };
    if let Some(last) = stderr_tail.last() {
        message.push_str(": ");
        message.push_str(last);
    }
    message
}
