//! Errors raised while loading, validating and writing tagtrace configuration.
//!
//! File errors carry the path of the layer that failed (global or project
//! `config.toml`, or an explicit `--config` file) so the CLI can point at it.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the configuration layers.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A config layer exists but could not be read
    #[error("cannot read tagtrace config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config layer is not valid TOML or has a mistyped key
    #[error("invalid tagtrace config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Each layer parsed, but their merge does not form a valid config
    #[error("merged tagtrace config is invalid: {0}")]
    Merge(#[source] toml::de::Error),

    #[error("cannot serialize tagtrace config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Writing `config.toml` during `init` or save failed
    #[error("cannot write tagtrace config '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot create config directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No home directory, so there is no global config location
    #[error("no home directory; global tagtrace config is unavailable")]
    NoHomeDir,

    /// A value outside its allowed set, such as an unknown log level
    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// A numeric setting below its lower bound
    #[error("'{key}' is {value}, must be at least {min}")]
    BelowMinimum { key: String, value: u64, min: u64 },

    /// An entry of `scan.exclude_patterns` is not a valid glob
    #[error("scan.exclude_patterns: '{pattern}' is not a valid glob: {source}")]
    ExcludePattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// Two storage files resolve to the same path, so one would overwrite the other
    #[error("storage.{first} and storage.{second} both point to '{path}'")]
    StorageCollision {
        first: &'static str,
        second: &'static str,
        path: PathBuf,
    },
}

impl ConfigError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Fail with [`ConfigError::BelowMinimum`] when `value < min`.
    pub fn check_minimum(key: &str, value: u64, min: u64) -> Result<(), Self> {
        if value < min {
            return Err(Self::BelowMinimum {
                key: key.to_string(),
                value,
                min,
            });
        }
        Ok(())
    }

    /// The dotted config key at fault, for errors tied to one setting.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::InvalidValue { key, .. } | Self::BelowMinimum { key, .. } => Some(key.as_str()),
            Self::ExcludePattern { .. } => Some("scan.exclude_patterns"),
            Self::StorageCollision { second, .. } => Some(*second),
            _ => None,
        }
    }
}
