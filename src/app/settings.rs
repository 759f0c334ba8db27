use std::{env, path::PathBuf, time::Duration};

use thiserror::Error;

pub const TIMEOUT_VAR: &str = "SETUP_STEP_TIMEOUT";
pub const SHELL_VAR: &str = "SETUP_SHELL";

const DEFAULT_SHELL: &str = "/bin/bash";
const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the home directory")]
    HomeDirUnavailable,
    #[error("SETUP_STEP_TIMEOUT must be a whole number of seconds, got '{0}'")]
    InvalidTimeout(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub home: PathBuf,
    pub shell: PathBuf,
    /// `None` disables the per-step deadline.
    pub step_timeout: Option<Duration>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeDirUnavailable)?;
        Self::resolve(home, |key| env::var(key).ok())
    }

    fn resolve<F>(home: PathBuf, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let shell = lookup(SHELL_VAR)
            .filter(|shell| !shell.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SHELL));

        let step_timeout = match lookup(TIMEOUT_VAR) {
            None => Some(DEFAULT_STEP_TIMEOUT),
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => return Err(ConfigError::InvalidTimeout(raw)),
            },
        };

        Ok(Settings {
            home,
            shell,
            step_timeout,
        })
    }
}
