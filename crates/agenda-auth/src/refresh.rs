//! Refresh-token grant against the Google token endpoint.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use oauth2::basic::{BasicClient, BasicErrorResponseType, BasicTokenResponse};
use oauth2::reqwest::async_http_client;
use oauth2::{RefreshToken, RequestTokenError, TokenResponse};
use tokio::sync::Mutex;

use crate::credentials::Credential;
use crate::error::{ConfigurationError, TokenError};
use crate::persister::TokenSource;
use crate::storage::Token;

/// Upper bound for one token endpoint round trip.
pub const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Google's default when `expires_in` is omitted.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Hands out the cached token, refreshing it once it is close to expiry.
pub struct RefreshingSource {
    client: BasicClient,
    current: Mutex<Token>,
}

impl RefreshingSource {
    pub fn new(credential: &Credential, token: Token) -> Result<Self, ConfigurationError> {
        Ok(Self {
            client: credential.oauth_client(None)?,
            current: Mutex::new(token),
        })
    }

    #[tracing::instrument(skip_all, level = "info")]
    async fn refresh(&self, stale: &Token) -> Result<Token, TokenError> {
        let refresh_token = stale
            .refresh_token
            .as_ref()
            .ok_or(TokenError::NoRefreshToken)?;

        let refresh_token = RefreshToken::new(refresh_token.clone());
        let request = self
            .client
            .exchange_refresh_token(&refresh_token)
            .request_async(async_http_client);

        let response = tokio::time::timeout(TOKEN_REQUEST_TIMEOUT, request)
            .await
            .map_err(|_| TokenError::Network("token refresh timed out".to_string()))?
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(resp) => {
                    refresh_rejection(resp.error(), resp.to_string())
                }
                other => TokenError::Network(other.to_string()),
            })?;

        let mut token = token_from_response(&response);
        // Google usually omits the refresh token on refresh; keep the one we have.
        if token.refresh_token.is_none() {
            token.refresh_token = stale.refresh_token.clone();
        }

        tracing::info!("Access token refreshed, valid until {}", token.expiry);
        Ok(token)
    }
}

impl TokenSource for RefreshingSource {
    async fn token(&self) -> Result<Token, TokenError> {
        let mut current = self.current.lock().await;
        if current.needs_refresh() {
            *current = self.refresh(&current).await?;
        }
        Ok(current.clone())
    }
}

/// Classify an OAuth error returned by the token endpoint.
///
/// Only `temporarily_unavailable` is worth retrying; anything else needs a new
/// login or fixed client credentials.
fn refresh_rejection(kind: &BasicErrorResponseType, detail: String) -> TokenError {
    match kind {
        BasicErrorResponseType::InvalidGrant => TokenError::Revoked(detail),
        BasicErrorResponseType::Extension(code) if code == "temporarily_unavailable" => {
            TokenError::Network(detail)
        }
        _ => TokenError::Rejected(detail),
    }
}

/// Convert a token endpoint response into a persisted [`Token`].
pub(crate) fn token_from_response(response: &BasicTokenResponse) -> Token {
    Token::new(
        response.access_token().secret().clone(),
        response.refresh_token().map(|t| t.secret().clone()),
        expiry_after(response.expires_in()),
    )
}

/// `now + expires_in`, falling back to the default lifetime when the server
/// sends nothing or a value out of range.
fn expiry_after(expires_in: Option<Duration>) -> DateTime<Utc> {
    let now = Utc::now();
    expires_in
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .and_then(TimeDelta::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or_else(|| now + TimeDelta::seconds(DEFAULT_EXPIRES_IN_SECS))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential(server: &MockServer) -> Credential {
        Credential::new("client-id", "client-secret").with_token_uri(format!("{}/token", server.uri()))
    }

    fn expired(refresh: Option<&str>) -> Token {
        Token::new(
            "stale",
            refresh.map(str::to_string),
            Utc::now() - chrono::Duration::minutes(1),
        )
    }

    #[tokio::test]
    async fn test_valid_token_is_not_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let fresh = Token::new("fresh", None, Utc::now() + chrono::Duration::hours(1));
        let source = RefreshingSource::new(&credential(&server), fresh).unwrap();

        assert_eq!(source.token().await.unwrap().access_token, "fresh");
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=1%2F%2Fkeep"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "renewed",
                "token_type": "Bearer",
                "expires_in": 3599,
                "scope": "https://www.googleapis.com/auth/calendar.events.readonly"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = RefreshingSource::new(&credential(&server), expired(Some("1//keep"))).unwrap();

        let token = source.token().await.unwrap();
        assert_eq!(token.access_token, "renewed");
        assert_eq!(token.refresh_token.as_deref(), Some("1//keep"));
        assert!(!token.needs_refresh());

        // Cached afterwards.
        assert_eq!(source.token().await.unwrap().access_token, "renewed");
    }

    #[tokio::test]
    async fn test_invalid_grant_is_revoked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let source = RefreshingSource::new(&credential(&server), expired(Some("gone"))).unwrap();

        let err = source.token().await.unwrap_err();
        assert!(matches!(err, TokenError::Revoked(_)));
    }

    #[tokio::test]
    async fn test_rejected_client_needs_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "The OAuth client was not found."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = RefreshingSource::new(&credential(&server), expired(Some("1//keep"))).unwrap();

        let err = source.token().await.unwrap_err();
        assert!(matches!(err, TokenError::Rejected(_)));
        assert!(err.needs_login());
    }

    #[tokio::test]
    async fn test_temporarily_unavailable_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "temporarily_unavailable"
            })))
            .mount(&server)
            .await;

        let source = RefreshingSource::new(&credential(&server), expired(Some("1//keep"))).unwrap();

        let err = source.token().await.unwrap_err();
        assert!(matches!(err, TokenError::Network(_)));
        assert!(!err.needs_login());
    }

    #[test]
    fn test_out_of_range_lifetime_falls_back_to_default() {
        let before = Utc::now();

        for secs in [u64::MAX, i64::MAX as u64, 1 << 62] {
            let expiry = expiry_after(Some(Duration::from_secs(secs)));
            let lifetime = (expiry - before).num_seconds();
            assert!((DEFAULT_EXPIRES_IN_SECS - 5..=DEFAULT_EXPIRES_IN_SECS + 5).contains(&lifetime));
        }

        let lifetime = (expiry_after(None) - before).num_seconds();
        assert!((DEFAULT_EXPIRES_IN_SECS - 5..=DEFAULT_EXPIRES_IN_SECS + 5).contains(&lifetime));
    }

    #[test]
    fn test_huge_expires_in_from_server_does_not_panic() {
        let response: BasicTokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "ya29.long",
            "token_type": "Bearer",
            "expires_in": u64::MAX
        }))
        .unwrap();

        let token = token_from_response(&response);
        assert_eq!(token.access_token, "ya29.long");
        assert!(!token.needs_refresh());
    }

    #[tokio::test]
    async fn test_missing_refresh_token() {
        let server = MockServer::start().await;
        let source = RefreshingSource::new(&credential(&server), expired(None)).unwrap();

        assert!(matches!(
            source.token().await.unwrap_err(),
            TokenError::NoRefreshToken
        ));
    }
}
