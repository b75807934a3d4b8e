//! Configuration errors for the agenda application.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while locating, reading or writing `config.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine a configuration directory")]
    NoConfigDir,

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NoConfigDir => "No configuration directory available. Set AGENDA_CONFIG_DIR.",
            ConfigError::Read { .. } => "Configuration could not be read. Check file permissions.",
            ConfigError::Write { .. } => "Failed to save configuration. Check file permissions.",
            ConfigError::Parse { .. } => "Configuration file is malformed. Check your settings.",
            ConfigError::Serialize(_) => "Failed to save configuration.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
        }
    }
}
