//! Error types for credentials, login and token persistence.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::storage::Token;

/// A credential or token file that cannot be used.
///
/// Fatal to the operation that needed the file; the caller may offer a new login.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("File not found: {0}")]
    Missing(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Client secret file has neither an \"installed\" nor a \"web\" section: {0}")]
    UnsupportedCredentialShape(PathBuf),

    #[error("Invalid OAuth endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Writing the token file failed. Durability is lost, the token itself is fine.
#[derive(Debug, Error)]
#[error("Failed to persist token to {path}: {source}")]
pub struct PersistenceError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Interactive login failures. Always retryable by running the flow again.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authorization denied: {0}")]
    Denied(String),

    #[error("Callback did not contain an authorization code")]
    NoCode,

    #[error("Callback state did not match the authorization request")]
    StateMismatch,

    #[error("No authorization callback within {0:?}")]
    Timeout(Duration),

    #[error("Token exchange failed: {0}")]
    Network(String),

    #[error("Failed to start the loopback listener: {0}")]
    Listener(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Sign-in succeeded but the token could not be written to disk.
    #[error("{source}")]
    Persistence {
        token: Box<Token>,
        #[source]
        source: PersistenceError,
    },
}

impl AuthError {
    /// The token obtained by a login whose only failure was saving it.
    pub fn usable_token(&self) -> Option<&Token> {
        match self {
            AuthError::Persistence { token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::Denied(_) => "Access was denied in the browser.",
            AuthError::NoCode => "Sign-in returned no authorization code. Please try again.",
            AuthError::StateMismatch => "Sign-in response could not be verified. Please try again.",
            AuthError::Timeout(_) => "Sign-in timed out. Please try again.",
            AuthError::Network(_) => "Could not reach Google to finish sign-in.",
            AuthError::Listener(_) => "Could not start the local sign-in listener.",
            AuthError::Configuration(_) => "Google credentials are missing or invalid.",
            AuthError::Persistence { .. } => "Signed in, but the session could not be saved.",
        }
    }
}

/// Failures while producing a usable access token.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token expired and no refresh token is stored")]
    NoRefreshToken,

    #[error("Refresh token rejected: {0}")]
    Revoked(String),

    /// The token endpoint refused the client or request outright.
    #[error("Token endpoint rejected the refresh: {0}")]
    Rejected(String),

    #[error("Token refresh failed: {0}")]
    Network(String),

    /// The token is valid but could not be written to disk.
    #[error("{source}")]
    Persistence {
        token: Box<Token>,
        #[source]
        source: PersistenceError,
    },
}

impl TokenError {
    /// The usable token carried by a persistence failure.
    pub fn usable_token(&self) -> Option<&Token> {
        match self {
            TokenError::Persistence { token, .. } => Some(token),
            _ => None,
        }
    }

    /// Whether the user has to run the login flow again.
    pub fn needs_login(&self) -> bool {
        matches!(
            self,
            TokenError::NoRefreshToken | TokenError::Revoked(_) | TokenError::Rejected(_)
        )
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            TokenError::NoRefreshToken | TokenError::Revoked(_) => {
                "Your Google session has expired. Please sign in again."
            }
            TokenError::Rejected(_) => {
                "Google rejected the stored credentials. Check the OAuth client and sign in again."
            }
            TokenError::Network(_) => "Could not refresh the Google session. Check your connection.",
            TokenError::Persistence { .. } => "The refreshed session could not be saved.",
        }
    }
}
