//! Google sign-in for agenda: credential discovery, browser login with PKCE,
//! and a self-persisting, auto-refreshing token.

pub mod credentials;
pub mod error;
pub mod locator;
pub mod oauth;
pub mod persister;
pub mod refresh;
pub mod storage;

pub use credentials::{Credential, CALENDAR_EVENTS_READONLY_SCOPE};
pub use error::{AuthError, ConfigurationError, PersistenceError, TokenError};
pub use locator::{auth_state, AuthState, CredentialLocator, CredentialPaths};
pub use oauth::{AuthFlow, LOGIN_TIMEOUT};
pub use persister::{TokenPersister, TokenSource};
pub use refresh::RefreshingSource;
pub use storage::{delete_token, load_token, save_token, Token};
