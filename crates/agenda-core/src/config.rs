use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Environment variable overriding the configuration root.
pub const CONFIG_DIR_ENV: &str = "AGENDA_CONFIG_DIR";

const CONFIG_FILE: &str = "config.toml";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Root holding `config.toml`, `credentials.json` and the token file.
    /// Resolved at load time, never written to disk.
    #[serde(skip)]
    pub config_dir: PathBuf,

    /// Background calendar sync settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Interactive login settings
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Minutes between background syncs (default: 5)
    #[serde(default = "default_sync_interval")]
    pub interval_minutes: u32,

    /// Upper bound for one fetch, all pages included (default: 30)
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_sync_interval() -> u32 {
    5
}

fn default_fetch_timeout() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_sync_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// How long to wait for the browser redirect (default: 120)
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,

    /// Try to open the consent page in a browser
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

fn default_login_timeout() -> u64 {
    120
}

fn default_open_browser() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_timeout_secs: default_login_timeout(),
            open_browser: default_open_browser(),
        }
    }
}

impl Config {
    /// Load configuration from the default root, creating it if it doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_dir()?)
    }

    /// Load `config.toml` under `config_dir`, writing defaults when absent.
    pub fn load_from(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if !config_path.exists() {
            let config = Self {
                config_dir: config_dir.to_path_buf(),
                ..Self::default()
            };
            config.save()?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;

        let mut config: Config =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: config_path.clone(),
                source,
            })?;
        config.config_dir = config_dir.to_path_buf();

        Ok(config)
    }

    /// Load configuration and reject it on validation errors.
    ///
    /// Warnings are logged and returned alongside the config.
    pub fn load_validated() -> Result<(Self, ValidationResult), ConfigError> {
        Self::load_validated_from(&Self::default_dir()?)
    }

    /// [`Config::load_validated`] for an explicit root.
    pub fn load_validated_from(config_dir: &Path) -> Result<(Self, ValidationResult), ConfigError> {
        let config = Self::load_from(config_dir)?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.sync.interval_minutes == 0 {
            result.add_error("sync.interval_minutes", "Sync interval must be greater than 0");
        } else if self.sync.interval_minutes > 1440 {
            result.add_warning(
                "sync.interval_minutes",
                "Sync interval is more than 24 hours",
            );
        }

        if self.sync.fetch_timeout_secs == 0 {
            result.add_error("sync.fetch_timeout_secs", "Fetch timeout must be greater than 0");
        }

        if self.auth.login_timeout_secs == 0 {
            result.add_error("auth.login_timeout_secs", "Login timeout must be greater than 0");
        } else if self.auth.login_timeout_secs < 30 {
            result.add_warning(
                "auth.login_timeout_secs",
                "Login timeout under 30 seconds leaves little time to consent",
            );
        }

        result
    }

    /// Save configuration to `config.toml` under `config_dir`.
    pub fn save(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.config_dir).map_err(|source| ConfigError::Write {
            path: self.config_dir.clone(),
            source,
        })?;

        let config_path = self.config_dir.join(CONFIG_FILE);
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(&config_path, contents).map_err(|source| ConfigError::Write {
            path: config_path,
            source,
        })
    }

    /// `$AGENDA_CONFIG_DIR`, else the platform config dir joined with `agenda`.
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(PathBuf::from(dir));
        }

        dirs::config_dir()
            .map(|dir| dir.join("agenda"))
            .ok_or(ConfigError::NoConfigDir)
    }
}
