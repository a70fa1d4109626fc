//! Application configuration loaded from JSON with environment overrides.
//!
//! # Invariants
//! - `YARDSYNC_DB_PATH` and `YARDSYNC_SYNC_PASSWORD` win over file values.
//! - Missing keys fall back to defaults; unknown keys are rejected.

use crate::logging::LogLevel;
use crate::sync::{Credentials, RetryPolicy, SyncConfig, SyncDirection};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DB_PATH_ENV: &str = "YARDSYNC_DB_PATH";
pub const SYNC_PASSWORD_ENV: &str = "YARDSYNC_SYNC_PASSWORD";
const DEFAULT_DB_FILE: &str = "yardsync.sqlite3";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config JSON: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub db_path: PathBuf,
    /// `None` uses the build-mode default.
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub sync: Option<SyncSection>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE),
            log_level: None,
            log_dir: None,
            sync: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
    pub endpoint: String,
    pub username: String,
    /// Usually supplied through `YARDSYNC_SYNC_PASSWORD` instead.
    pub password: Option<String>,
    pub direction: String,
    pub continuous: bool,
    pub poll_interval_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub batch_size: usize,
    pub conflict_retention_days: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            username: String::new(),
            password: None,
            direction: SyncDirection::Push.as_str().to_string(),
            continuous: true,
            poll_interval_ms: 5_000,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            batch_size: 100,
            conflict_retention_days: 7,
        }
    }
}

impl CoreConfig {
    /// Reads `path`, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(&text)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a config file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Applies overrides looked up through `lookup`; blank values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let present = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(db_path) = present(DB_PATH_ENV) {
            self.db_path = PathBuf::from(db_path.trim());
        }
        if let (Some(sync), Some(password)) = (self.sync.as_mut(), present(SYNC_PASSWORD_ENV)) {
            sync.password = Some(password);
        }
    }

    pub fn log_level(&self) -> Result<LogLevel, ConfigError> {
        match &self.log_level {
            Some(level) => {
                LogLevel::parse(level).map_err(|err| ConfigError::Invalid(err.to_string()))
            }
            None => Ok(LogLevel::for_build()),
        }
    }

    /// Session config for the `sync` section, if one is present.
    ///
    /// Validation of endpoint and credentials happens in `SyncCoordinator::start`.
    pub fn sync_config(&self) -> Result<Option<SyncConfig>, ConfigError> {
        let Some(section) = &self.sync else {
            return Ok(None);
        };
        let direction = SyncDirection::parse(&section.direction).ok_or_else(|| {
            ConfigError::Invalid(format!("unknown sync direction `{}`", section.direction))
        })?;
        let password = section.password.clone().ok_or_else(|| {
            ConfigError::Invalid(format!("sync password missing; set {SYNC_PASSWORD_ENV}"))
        })?;
        Ok(Some(SyncConfig {
            endpoint: section.endpoint.clone(),
            credentials: Credentials::new(section.username.clone(), password),
            direction,
            continuous: section.continuous,
            retry: RetryPolicy {
                initial_backoff: Duration::from_millis(section.initial_backoff_ms),
                max_backoff: Duration::from_millis(section.max_backoff_ms),
            },
            poll_interval: Duration::from_millis(section.poll_interval_ms),
            batch_size: section.batch_size,
            conflict_retention: Duration::from_secs(
                section.conflict_retention_days.saturating_mul(24 * 60 * 60),
            ),
        }))
    }
}
