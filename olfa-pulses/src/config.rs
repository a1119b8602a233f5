use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value for {name}: {value}")]
    Env { name: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Settings shared by every pulse delivered in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Odour flow duration used by channels that do not specify one.
    pub default_duration_ms: u64,
    /// How often each pulse of a batch appears in the trial list.
    pub repetitions: usize,
    pub shuffle: bool,
    pub seed: Option<u64>,
    pub inter_trial_interval_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_duration_ms: 2000,
            repetitions: 1,
            shuffle: false,
            seed: None,
            inter_trial_interval_ms: 1000,
        }
    }
}

impl ControllerConfig {
    /// Reads a TOML file, then applies `OLFA_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(ms) = env_millis("OLFA_DEFAULT_DURATION_MS")? {
            self.default_duration_ms = ms;
        }
        if let Some(ms) = env_millis("OLFA_INTER_TRIAL_INTERVAL_MS")? {
            self.inter_trial_interval_ms = ms;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_duration_ms == 0 {
            return Err(ConfigError::Invalid(
                "default_duration_ms must be greater than zero".into(),
            ));
        }
        if self.repetitions == 0 {
            return Err(ConfigError::Invalid("repetitions must be at least 1".into()));
        }
        Ok(())
    }
}

fn env_millis(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { name, value }),
        Err(_) => Ok(None),
    }
}
