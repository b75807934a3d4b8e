//! Credential and token file locations, and the auth state derived from them.

use std::path::{Path, PathBuf};

pub const CREDENTIALS_FILE: &str = "credentials.json";
pub const TOKEN_FILE: &str = "google-token.json";

/// Which UI the host should show.
///
/// Always recomputed from the filesystem, so credentials installed by hand are
/// picked up on the next check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No client secret file.
    NotConfigured,
    /// Client secret present, no token yet.
    NeedsLogin,
    Ready,
    /// Reserved. Refresh rejections surface as `TokenError::needs_login` instead.
    Revoked,
}

impl AuthState {
    /// Derive the state from a locator, folding "no config root" into `NotConfigured`.
    pub fn detect(locator: Option<&CredentialLocator>) -> Self {
        match locator {
            Some(locator) => {
                let paths = locator.locate();
                auth_state(&paths.credentials, &paths.token)
            }
            None => AuthState::NotConfigured,
        }
    }

    pub fn is_ready(self) -> bool {
        self == AuthState::Ready
    }

    pub fn status_text(self) -> &'static str {
        match self {
            AuthState::NotConfigured => "Google Calendar not configured (credentials.json missing)",
            AuthState::NeedsLogin => "Not signed in to Google Calendar",
            AuthState::Ready => "Google Calendar connected",
            AuthState::Revoked => "Google access revoked. Please sign in again.",
        }
    }
}

/// Resolved file locations under one configuration root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPaths {
    pub credentials: PathBuf,
    pub token: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CredentialLocator {
    root: PathBuf,
}

impl CredentialLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn locate(&self) -> CredentialPaths {
        CredentialPaths {
            credentials: self.root.join(CREDENTIALS_FILE),
            token: self.root.join(TOKEN_FILE),
        }
    }
}

/// Existence checks only: no parsing, no network, never fails.
pub fn auth_state(credentials: &Path, token: &Path) -> AuthState {
    if !credentials.exists() {
        AuthState::NotConfigured
    } else if !token.exists() {
        AuthState::NeedsLogin
    } else {
        AuthState::Ready
    }
}
