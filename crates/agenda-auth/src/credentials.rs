//! Google "installed application" client secret.

use std::path::Path;

use oauth2::basic::BasicClient;
use oauth2::{AuthType, AuthUrl, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use serde::Deserialize;

use crate::error::ConfigurationError;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Read-only access to calendar events; the only scope ever requested.
pub const CALENDAR_EVENTS_READONLY_SCOPE: &str =
    "https://www.googleapis.com/auth/calendar.events.readonly";

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<Credential>,
    web: Option<Credential>,
}

/// OAuth client configuration as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct Credential {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl Credential {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Some(client_secret.into()),
            auth_uri: default_auth_uri(),
            token_uri: default_token_uri(),
            redirect_uris: Vec::new(),
        }
    }

    /// Point the token endpoint somewhere else (mock servers, proxies).
    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let json = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigurationError::Missing(path.to_path_buf())
            } else {
                ConfigurationError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        Self::from_json(&json, path)
    }

    fn from_json(json: &str, path: &Path) -> Result<Self, ConfigurationError> {
        let file: ClientSecretFile =
            serde_json::from_str(json).map_err(|source| ConfigurationError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        file.installed
            .or(file.web)
            .ok_or_else(|| ConfigurationError::UnsupportedCredentialShape(path.to_path_buf()))
    }

    /// Build an oauth2 client; `redirect_uri` is only needed for the code exchange.
    pub(crate) fn oauth_client(
        &self,
        redirect_uri: Option<&str>,
    ) -> Result<BasicClient, ConfigurationError> {
        let auth_url = AuthUrl::new(self.auth_uri.clone())
            .map_err(|e| ConfigurationError::InvalidEndpoint(format!("{}: {}", self.auth_uri, e)))?;
        let token_url = TokenUrl::new(self.token_uri.clone())
            .map_err(|e| ConfigurationError::InvalidEndpoint(format!("{}: {}", self.token_uri, e)))?;

        // Google wants client credentials in the form body, not basic auth.
        let mut client = BasicClient::new(
            ClientId::new(self.client_id.clone()),
            self.client_secret.clone().map(ClientSecret::new),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody);

        if let Some(uri) = redirect_uri {
            let redirect = RedirectUrl::new(uri.to_string())
                .map_err(|e| ConfigurationError::InvalidEndpoint(format!("{}: {}", uri, e)))?;
            client = client.set_redirect_uri(redirect);
        }

        Ok(client)
    }
}
