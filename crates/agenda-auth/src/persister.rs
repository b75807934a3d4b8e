//! Keeps the token file in step with whatever the refresh source hands out.

use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::credentials::Credential;
use crate::error::{ConfigurationError, TokenError};
use crate::locator::CredentialPaths;
use crate::refresh::RefreshingSource;
use crate::storage::{self, Fingerprint, Token};

/// Produces a currently valid token, refreshing it upstream when needed.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> impl Future<Output = Result<Token, TokenError>> + Send;
}

/// Wraps a [`TokenSource`] and rewrites the token file whenever the token changes.
pub struct TokenPersister<S> {
    source: S,
    path: PathBuf,
    /// Fingerprint of the token last written to `path`.
    persisted: Mutex<Option<Fingerprint>>,
    #[cfg(test)]
    writes: std::sync::atomic::AtomicUsize,
}

impl TokenPersister<RefreshingSource> {
    /// Load the credential and stored token and wire up a Google refresh source.
    pub fn open(paths: &CredentialPaths) -> Result<Self, ConfigurationError> {
        let credential = Credential::load(&paths.credentials)?;
        let token = storage::load_token(&paths.token)?;
        let fingerprint = token.fingerprint();
        let source = RefreshingSource::new(&credential, token)?;

        Ok(Self::new(source, paths.token.clone(), Some(fingerprint)))
    }
}

impl<S: TokenSource> TokenPersister<S> {
    /// `persisted` is the fingerprint of the token already on disk, if any.
    pub fn new(source: S, path: impl Into<PathBuf>, persisted: Option<Fingerprint>) -> Self {
        Self {
            source,
            path: path.into(),
            persisted: Mutex::new(persisted),
            #[cfg(test)]
            writes: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current token, persisted first if it changed since the last write.
    ///
    /// A failed write yields [`TokenError::Persistence`], which still carries the
    /// token; the next call tries to write it again.
    pub async fn current_token(&self) -> Result<Token, TokenError> {
        let mut persisted = self.persisted.lock().await;

        let token = self.source.token().await?;
        let fingerprint = token.fingerprint();

        if persisted.as_ref() == Some(&fingerprint) {
            return Ok(token);
        }

        #[cfg(test)]
        self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        match storage::save_token(&self.path, &token) {
            Ok(()) => {
                tracing::info!("Token changed, saved to {}", self.path.display());
                *persisted = Some(fingerprint);
                Ok(token)
            }
            Err(source) => Err(TokenError::Persistence {
                token: Box::new(token),
                source,
            }),
        }
    }

    /// Access token for a request. Persistence failures are logged, not fatal.
    pub async fn access_token(&self) -> Result<String, TokenError> {
        match self.current_token().await {
            Ok(token) => Ok(token.access_token),
            Err(TokenError::Persistence { token, source }) => {
                tracing::warn!("Using refreshed token that could not be saved: {}", source);
                Ok(token.access_token)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Hands out the tokens in `tokens`, repeating the last one.
    struct ScriptedSource {
        tokens: Vec<Token>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(tokens: Vec<Token>) -> Self {
            Self {
                tokens,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl TokenSource for ScriptedSource {
        async fn token(&self) -> Result<Token, TokenError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let idx = n.min(self.tokens.len() - 1);
            Ok(self.tokens[idx].clone())
        }
    }

    /// Refreshes "a" to "b" once, slowly, the way an expired token is renewed.
    struct RenewingSource {
        current: Mutex<Token>,
        refreshes: AtomicUsize,
    }

    impl TokenSource for RenewingSource {
        async fn token(&self) -> Result<Token, TokenError> {
            let mut current = self.current.lock().await;
            if current.access_token == "a" {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                *current = token("b");
                self.refreshes.fetch_add(1, Ordering::SeqCst);
            }
            Ok(current.clone())
        }
    }

    struct FailingSource;

    impl TokenSource for FailingSource {
        async fn token(&self) -> Result<Token, TokenError> {
            Err(TokenError::Revoked("invalid_grant".into()))
        }
    }

    fn token(access: &str) -> Token {
        Token::new(access, Some("refresh".into()), Utc::now() + Duration::hours(1))
    }

    #[tokio::test]
    async fn test_first_access_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("google-token.json");
        let persister = TokenPersister::new(ScriptedSource::new(vec![token("a")]), &path, None);

        let got = persister.current_token().await.unwrap();

        assert_eq!(got.access_token, "a");
        assert_eq!(storage::load_token(&path).unwrap(), got);
    }

    #[tokio::test]
    async fn test_unchanged_token_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("google-token.json");
        let persister = TokenPersister::new(ScriptedSource::new(vec![token("a")]), &path, None);

        persister.current_token().await.unwrap();
        std::fs::remove_file(&path).unwrap();
        persister.current_token().await.unwrap();

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_seeded_fingerprint_skips_initial_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("google-token.json");
        let stored = token("a");
        let persister = TokenPersister::new(
            ScriptedSource::new(vec![stored.clone()]),
            &path,
            Some(stored.fingerprint()),
        );

        persister.current_token().await.unwrap();

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_refreshed_token_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("google-token.json");
        let persister = TokenPersister::new(
            ScriptedSource::new(vec![token("a"), token("b")]),
            &path,
            None,
        );

        persister.current_token().await.unwrap();
        persister.current_token().await.unwrap();

        assert_eq!(storage::load_token(&path).unwrap().access_token, "b");
    }

    #[tokio::test]
    async fn test_persistence_failure_still_returns_token() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let path = blocker.join("google-token.json");
        let persister = TokenPersister::new(ScriptedSource::new(vec![token("a")]), &path, None);

        let err = persister.current_token().await.unwrap_err();
        assert_eq!(err.usable_token().unwrap().access_token, "a");

        // Degraded durability, not correctness.
        assert_eq!(persister.access_token().await.unwrap(), "a");
    }

    #[tokio::test]
    async fn test_source_errors_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let persister =
            TokenPersister::new(FailingSource, dir.path().join("google-token.json"), None);

        let err = persister.access_token().await.unwrap_err();
        assert!(err.needs_login());
    }

    #[tokio::test]
    async fn test_writes_once_per_distinct_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("google-token.json");
        let (a, b, c) = (token("a"), token("b"), token("c"));
        let persister = TokenPersister::new(
            ScriptedSource::new(vec![a.clone(), a, b.clone(), b, c]),
            &path,
            None,
        );

        for _ in 0..6 {
            persister.current_token().await.unwrap();
        }

        assert_eq!(persister.writes.load(Ordering::SeqCst), 3);
        assert_eq!(storage::load_token(&path).unwrap().access_token, "c");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("google-token.json");
        let stale = token("a");
        storage::save_token(&path, &stale).unwrap();
        let persister = Arc::new(TokenPersister::new(
            RenewingSource {
                current: Mutex::new(stale.clone()),
                refreshes: AtomicUsize::new(0),
            },
            &path,
            Some(stale.fingerprint()),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let persister = Arc::clone(&persister);
                tokio::spawn(async move { persister.current_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().access_token, "b");
        }
        assert_eq!(persister.source.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(persister.writes.load(Ordering::SeqCst), 1);
        assert_eq!(storage::load_token(&path).unwrap().access_token, "b");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("google-token.json");
        let persister = Arc::new(TokenPersister::new(
            ScriptedSource::new(vec![token("a")]),
            &path,
            None,
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let persister = Arc::clone(&persister);
                tokio::spawn(async move { persister.current_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().access_token, "a");
        }
        assert_eq!(storage::load_token(&path).unwrap().access_token, "a");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
