//! Calendar sync error types.

use std::time::Duration;

use agenda_auth::TokenError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The server no longer recognizes the sync cursor (HTTP 410).
    #[error("Sync cursor expired")]
    CursorExpired,

    #[error("Calendar fetch did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Access token rejected")]
    Unauthorized,

    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl SyncError {
    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> String {
        match self {
            Self::CursorExpired => "Calendar changed too much, reloading".to_string(),
            Self::Timeout(_) => "Calendar sync timed out. Check your connection.".to_string(),
            Self::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
            Self::RateLimited(secs) => format!("Too many requests. Please wait {} seconds.", secs),
            Self::Api(msg) => format!("Calendar error: {}", msg),
            Self::Network(_) => "Network error. Check your connection.".to_string(),
            Self::Token(e) => e.user_message().to_string(),
        }
    }

    /// Connectivity failures, including the overall fetch deadline.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// Whether the next scheduled sync may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Token(e) => !e.needs_login(),
            Self::Unauthorized | Self::Api(_) => false,
            _ => true,
        }
    }
}
