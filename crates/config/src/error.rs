//! Config file errors

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// What the config layer was doing with a file when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Read,
    Write,
    CreateDirectory,
    Backup,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::CreateDirectory => write!(f, "create directory"),
            Self::Backup => write!(f, "back up"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot {action} {path}: {source}")]
    Io {
        action: FileAction,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file exists but is not a StoryStream config
    #[error("{path} is not a valid StoryStream config: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot encode config: {0}")]
    Encode(#[from] toml::ser::Error),

    /// Saving was refused because fields are out of range
    #[error("Config has {} invalid field(s): {}", .0.len(), join(.0))]
    Invalid(Vec<ValidationError>),

    #[error("No config directory available: {0}")]
    NoConfigDir(String),
}

impl ConfigError {
    pub(crate) fn io(action: FileAction, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// One out-of-range or missing field, e.g. `player.persist_interval_secs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}
