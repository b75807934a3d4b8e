use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{ConfigurationError, PersistenceError};

/// Refresh this long before the stated expiry.
const REFRESH_BUFFER_SECS: i64 = 300;

/// OAuth token as persisted in `google-token.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Access token for API requests
    pub access_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Optional refresh token for token renewal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Absolute expiry
    pub expiry: DateTime<Utc>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Change-detection identity of a token: access token plus expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    access_token: String,
    expiry: DateTime<Utc>,
}

impl Token {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            refresh_token,
            expiry,
        }
    }

    /// Check if the token needs refresh (within 5 minutes of expiry)
    pub fn needs_refresh(&self) -> bool {
        Utc::now() >= self.expiry - Duration::seconds(REFRESH_BUFFER_SECS)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expiry
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            access_token: self.access_token.clone(),
            expiry: self.expiry,
        }
    }
}

pub fn load_token(path: &Path) -> Result<Token, ConfigurationError> {
    let json = fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigurationError::Missing(path.to_path_buf())
        } else {
            ConfigurationError::Unreadable {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    serde_json::from_str(&json).map_err(|source| ConfigurationError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Atomically replace the token file.
///
/// Readers see either the old file or the complete new one. Parent directories
/// are created on demand and the file ends up readable by the owner only.
pub fn save_token(path: &Path, token: &Token) -> Result<(), PersistenceError> {
    let fail = |source: std::io::Error| PersistenceError {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_vec_pretty(token).map_err(|e| fail(e.into()))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(fail)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "token".to_string());
    let temp = TempFile(Some(dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()))));

    write_synced(temp.path(), &json).map_err(fail)?;
    fs::rename(temp.path(), path).map_err(fail)?;
    temp.disarm();

    tracing::debug!("Persisted token to {}", path.display());
    Ok(())
}

fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = create_private(path)?;
    file.write_all(contents)?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}

/// Create a new file that is owner-only from the moment it exists.
fn create_private(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

/// Removes the temp file unless the rename went through.
struct TempFile(Option<PathBuf>);

impl TempFile {
    fn path(&self) -> &Path {
        self.0.as_deref().unwrap_or(Path::new(""))
    }

    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = fs::remove_file(path);
        }
    }
}

/// Remove the token file (sign out). Missing files are fine.
pub fn delete_token(path: &Path) -> Result<(), PersistenceError> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::info!("Deleted token at {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PersistenceError {
            path: path.to_path_buf(),
            source,
        }),
    }
}
