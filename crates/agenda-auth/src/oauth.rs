//! Interactive OAuth2 authorization-code flow with PKCE over a loopback redirect.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RequestTokenError, Scope};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use url::Url;
use warp::http::StatusCode;
use warp::Filter;
use warp::Reply;

use crate::credentials::{Credential, CALENDAR_EVENTS_READONLY_SCOPE};
use crate::error::AuthError;
use crate::refresh::{token_from_response, TOKEN_REQUEST_TIMEOUT};
use crate::storage::{self, Token};

/// How long to wait for the browser to come back.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(120);

/// Time the responder gets to finish its last reply before being aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const SUCCESS_PAGE: &str = "<html><body><h1>Authorization successful!</h1><p>You can close this window and return to agenda.</p></body></html>";
const DENIED_PAGE: &str = "<html><body><h1>Authorization failed</h1><p>Access was not granted. Return to agenda and try again.</p></body></html>";
const NO_CODE_PAGE: &str = "<html><body><h1>Authorization failed</h1><p>No authorization code was received.</p></body></html>";
const ALREADY_HANDLED_PAGE: &str = "<html><body><h1>Already handled</h1><p>This sign-in attempt is already complete.</p></body></html>";

/// Opens the consent URL somewhere the user can see it.
pub type UrlOpener = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// Runs the browser login once per call. Never retries.
pub struct AuthFlow {
    timeout: Duration,
    open_browser: bool,
    opener: UrlOpener,
}

impl Default for AuthFlow {
    fn default() -> Self {
        Self {
            timeout: LOGIN_TIMEOUT,
            open_browser: true,
            opener: Arc::new(open_system_browser),
        }
    }
}

impl AuthFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// When false, the URL is only printed.
    pub fn with_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    pub fn with_opener(
        mut self,
        opener: impl Fn(&str) -> std::io::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.opener = Arc::new(opener);
        self
    }

    /// Authorize in the browser and exchange the returned code for a token.
    #[tracing::instrument(skip_all, level = "info")]
    pub async fn run(&self, credential: &Credential) -> Result<Token, AuthError> {
        let server = CallbackServer::start()?;
        let redirect_uri = server.redirect_uri();
        let client = credential.oauth_client(Some(&redirect_uri))?;

        let (auth_url, csrf_token, verifier) = authorization_url(&client);
        tracing::info!("Waiting for Google authorization on {}", redirect_uri);
        self.present(auth_url.as_str());

        let callback = server.wait(self.timeout).await?;

        if callback.state.as_deref() != Some(csrf_token.secret().as_str()) {
            return Err(AuthError::StateMismatch);
        }

        let token = exchange_code(&client, callback.code, verifier).await?;
        tracing::info!("Google authorization completed");
        Ok(token)
    }

    /// [`AuthFlow::run`], then persist the token atomically at `token_path`.
    ///
    /// A failed write yields [`AuthError::Persistence`], which still carries the
    /// token obtained from Google.
    pub async fn run_and_store(
        &self,
        credential: &Credential,
        token_path: &Path,
    ) -> Result<Token, AuthError> {
        let token = self.run(credential).await?;
        if let Err(source) = storage::save_token(token_path, &token) {
            return Err(AuthError::Persistence {
                token: Box::new(token),
                source,
            });
        }
        Ok(token)
    }

    fn present(&self, url: &str) {
        if self.open_browser {
            match (self.opener)(url) {
                Ok(()) => {
                    tracing::info!("Opened browser for Google sign-in");
                    return;
                }
                Err(e) => tracing::warn!("Could not open a browser: {}", e),
            }
        }

        eprintln!("Open this URL in your browser to authorize agenda:\n\n  {}\n", url);
    }
}

fn authorization_url(client: &BasicClient) -> (Url, CsrfToken, PkceCodeVerifier) {
    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    // prompt=consent makes Google issue a refresh token on repeat logins too.
    let (url, csrf_token) = client
        .authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new(CALENDAR_EVENTS_READONLY_SCOPE.to_string()))
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .set_pkce_challenge(pkce_challenge)
        .url();

    (url, csrf_token, pkce_verifier)
}

#[tracing::instrument(skip_all, level = "info")]
async fn exchange_code(
    client: &BasicClient,
    code: String,
    verifier: PkceCodeVerifier,
) -> Result<Token, AuthError> {
    let request = client
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(verifier)
        .request_async(async_http_client);

    let response = tokio::time::timeout(TOKEN_REQUEST_TIMEOUT, request)
        .await
        .map_err(|_| AuthError::Network("token exchange timed out".to_string()))?
        .map_err(|e| match e {
            RequestTokenError::ServerResponse(resp) => AuthError::Denied(resp.to_string()),
            other => AuthError::Network(other.to_string()),
        })?;

    let token = token_from_response(&response);
    if token.refresh_token.is_none() {
        tracing::warn!("Token endpoint returned no refresh token; re-login will be needed on expiry");
    }
    Ok(token)
}

/// Default opener: the system browser, but only with a graphical display.
fn open_system_browser(url: &str) -> std::io::Result<()> {
    if !has_display() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no graphical display available",
        ));
    }
    webbrowser::open(url)
}

fn has_display() -> bool {
    if cfg!(any(target_os = "linux", target_os = "freebsd", target_os = "openbsd")) {
        ["DISPLAY", "WAYLAND_DISPLAY"]
            .iter()
            .any(|var| std::env::var_os(var).is_some_and(|v| !v.is_empty()))
    } else {
        true
    }
}

/// What the browser brought back.
#[derive(Debug)]
struct Callback {
    code: String,
    state: Option<String>,
}

type CallbackOutcome = Result<Callback, AuthError>;
type CallbackSlot = Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>;

/// Single-use HTTP responder on `127.0.0.1:<ephemeral>`.
///
/// Only the first `/callback` request delivers an outcome. The server task is
/// stopped by [`CallbackServer::wait`] or, failing that, aborted on drop.
struct CallbackServer {
    addr: SocketAddr,
    outcome: oneshot::Receiver<CallbackOutcome>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CallbackServer {
    fn start() -> Result<Self, AuthError> {
        let (tx, rx) = oneshot::channel();
        let slot: CallbackSlot = Arc::new(Mutex::new(Some(tx)));

        let routes = warp::get()
            .and(warp::path("callback"))
            .and(warp::path::end())
            .and(warp::query::<HashMap<String, String>>())
            .and(warp::any().map(move || slot.clone()))
            .and_then(handle_callback);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(([127, 0, 0, 1], 0), async move {
                let _ = shutdown_rx.await;
            })
            .map_err(|e| AuthError::Listener(e.to_string()))?;

        tracing::debug!("OAuth callback listener bound to {}", addr);

        Ok(Self {
            addr,
            outcome: rx,
            shutdown: Some(shutdown_tx),
            task: Some(tokio::spawn(server)),
        })
    }

    fn redirect_uri(&self) -> String {
        format!("http://{}/callback", self.addr)
    }

    /// First of: a code, a callback error, or the deadline. Stops the server either way.
    async fn wait(mut self, timeout: Duration) -> CallbackOutcome {
        let outcome = match tokio::time::timeout(timeout, &mut self.outcome).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(AuthError::Listener(
                "callback server stopped before a response arrived".to_string(),
            )),
            Err(_) => Err(AuthError::Timeout(timeout)),
        };

        self.stop().await;
        outcome
    }

    async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                tracing::debug!("Callback server did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn handle_callback(
    params: HashMap<String, String>,
    slot: CallbackSlot,
) -> Result<warp::reply::Response, Infallible> {
    let outcome = match (params.get("code"), params.get("error")) {
        (Some(code), _) if !code.is_empty() => Ok(Callback {
            code: code.clone(),
            state: params.get("state").cloned(),
        }),
        (_, Some(error)) => Err(AuthError::Denied(error.clone())),
        _ => Err(AuthError::NoCode),
    };

    let Some(sender) = slot.lock().await.take() else {
        return Ok(page(ALREADY_HANDLED_PAGE, StatusCode::BAD_REQUEST));
    };

    let reply = match &outcome {
        Ok(_) => page(SUCCESS_PAGE, StatusCode::OK),
        Err(AuthError::Denied(_)) => page(DENIED_PAGE, StatusCode::BAD_REQUEST),
        Err(_) => page(NO_CODE_PAGE, StatusCode::BAD_REQUEST),
    };

    let _ = sender.send(outcome);
    Ok(reply)
}

fn page(html: &'static str, status: StatusCode) -> warp::reply::Response {
    warp::reply::with_status(warp::reply::html(html), status).into_response()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    async fn get(url: String) -> reqwest::StatusCode {
        reqwest::get(url).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_callback_delivers_code() {
        let server = CallbackServer::start().unwrap();
        let uri = server.redirect_uri();
        assert!(uri.starts_with("http://127.0.0.1:"));

        let status = get(format!("{}?code=4%2Fabc&state=xyz", uri)).await;
        assert_eq!(status, reqwest::StatusCode::OK);

        let callback = server.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(callback.code, "4/abc");
        assert_eq!(callback.state.as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn test_missing_code_is_bad_request() {
        let server = CallbackServer::start().unwrap();
        let status = get(format!("{}?state=xyz", server.redirect_uri())).await;
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);

        let err = server.wait(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, AuthError::NoCode));
    }

    #[tokio::test]
    async fn test_error_param_is_denied() {
        let server = CallbackServer::start().unwrap();
        let status = get(format!("{}?error=access_denied", server.redirect_uri())).await;
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);

        match server.wait(Duration::from_secs(5)).await {
            Err(AuthError::Denied(reason)) => assert_eq!(reason, "access_denied"),
            other => panic!("expected Denied, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_only_first_callback_counts() {
        let server = CallbackServer::start().unwrap();
        let uri = server.redirect_uri();

        assert_eq!(get(format!("{}?code=first", uri)).await, reqwest::StatusCode::OK);
        assert_eq!(
            get(format!("{}?code=second", uri)).await,
            reqwest::StatusCode::BAD_REQUEST
        );

        let callback = server.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(callback.code, "first");
    }

    #[tokio::test]
    async fn test_wait_times_out_and_releases_port() {
        let server = CallbackServer::start().unwrap();
        let uri = server.redirect_uri();

        let err = server.wait(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, AuthError::Timeout(_)));

        assert!(reqwest::get(format!("{}?code=late", uri)).await.is_err());
    }

    #[test]
    fn test_authorization_url_parameters() {
        let credential = Credential::new("client-id", "secret");
        let client = credential
            .oauth_client(Some("http://127.0.0.1:5555/callback"))
            .unwrap();

        let (url, csrf, _verifier) = authorization_url(&client);
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["scope"], CALENDAR_EVENTS_READONLY_SCOPE);
        assert_eq!(params["redirect_uri"], "http://127.0.0.1:5555/callback");
        assert_eq!(&params["state"], csrf.secret());
    }

    #[test]
    fn test_state_is_unique() {
        let client = Credential::new("client-id", "secret").oauth_client(None).unwrap();
        let (_, first, _) = authorization_url(&client);
        let (_, second, _) = authorization_url(&client);
        assert_ne!(first.secret(), second.secret());
    }
}
