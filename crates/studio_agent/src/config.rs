use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::context::DEFAULT_SYSTEM_INSTRUCTIONS;

pub const CONFIG_PATH_ENV_VAR: &str = "STUDIO_AGENT_CONFIG_PATH";
pub const TIMEOUT_ENV_VAR: &str = "STUDIO_AGENT_TIMEOUT_SEC";
pub const SYSTEM_INSTRUCTIONS_ENV_VAR: &str = "STUDIO_AGENT_SYSTEM_INSTRUCTIONS";

pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{origin}: timeout must be a whole number of seconds greater than zero, got '{value}'")]
    InvalidTimeout { origin: String, value: String },
}

impl ConfigError {
    fn invalid_timeout(origin: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidTimeout {
            origin: origin.into(),
            value: value.into(),
        }
    }
}

/// Runtime settings for the turn controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioConfig {
    pub turn_timeout: Duration,
    pub system_instructions: String,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            system_instructions: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    timeout_sec: Option<u64>,
    system_instructions: Option<String>,
}

impl StudioConfig {
    #[must_use]
    pub fn with_turn_timeout(mut self, turn_timeout: Duration) -> Self {
        self.turn_timeout = turn_timeout;
        self
    }

    #[must_use]
    pub fn with_system_instructions(mut self, system_instructions: impl Into<String>) -> Self {
        self.system_instructions = system_instructions.into();
        self
    }

    /// Resolves defaults, then the optional config file, then env overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`StudioConfig::from_env`] with an explicit variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match non_blank(lookup(CONFIG_PATH_ENV_VAR)) {
            Some(path) => Self::load_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(raw) = non_blank(lookup(TIMEOUT_ENV_VAR)) {
            config.turn_timeout = parse_timeout_secs(TIMEOUT_ENV_VAR, &raw)?;
        }
        if let Some(instructions) = non_blank(lookup(SYSTEM_INSTRUCTIONS_ENV_VAR)) {
            config.system_instructions = instructions;
        }

        Ok(config)
    }

    /// Reads a JSON config file layered over the defaults.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::default();
        if let Some(timeout_sec) = file.timeout_sec {
            if timeout_sec == 0 {
                return Err(ConfigError::invalid_timeout(
                    path.display().to_string(),
                    "0",
                ));
            }
            config.turn_timeout = Duration::from_secs(timeout_sec);
        }
        if let Some(instructions) = non_blank(file.system_instructions) {
            config.system_instructions = instructions;
        }

        Ok(config)
    }
}

fn parse_timeout_secs(origin: &str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::invalid_timeout(origin, raw)),
    }
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
