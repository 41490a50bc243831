//! The bearer token shared by the background loops.

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::auth::{AuthError, AuthToken, Authenticator};

/// Shared, swappable bearer token.
///
/// Readers take a clone of the current token; writers replace it whole.
/// Logins are serialized so that two loops noticing an expired token at the
/// same time trigger a single login, not two.
pub struct TokenStore {
    authenticator: Authenticator,
    current: RwLock<Option<AuthToken>>,
    login_lock: Mutex<()>,
}

impl TokenStore {
    pub fn new(authenticator: Authenticator) -> Self {
        Self {
            authenticator,
            current: RwLock::new(None),
            login_lock: Mutex::new(()),
        }
    }

    pub async fn current(&self) -> Option<AuthToken> {
        self.current.read().await.clone()
    }

    /// Return the cached token, logging in first if there is none.
    pub async fn ensure(&self) -> Result<AuthToken, AuthError> {
        if let Some(token) = self.current().await {
            return Ok(token);
        }

        let _guard = self.login_lock.lock().await;
        // Another task may have logged in while we waited for the lock.
        if let Some(token) = self.current().await {
            return Ok(token);
        }

        let token = self.authenticator.login().await?;
        *self.current.write().await = Some(token.clone());
        Ok(token)
    }

    /// Log in again regardless of the cached token.
    ///
    /// On failure the previous token is kept: it may well still be valid, and
    /// a later `401` will clear it anyway.
    pub async fn refresh(&self) -> Result<AuthToken, AuthError> {
        let _guard = self.login_lock.lock().await;
        match self.authenticator.login().await {
            Ok(token) => {
                *self.current.write().await = Some(token.clone());
                info!("Token refreshed");
                Ok(token)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, keeping previous token");
                Err(e)
            }
        }
    }

    /// Drop `stale` so the next [`ensure`](Self::ensure) logs in again.
    ///
    /// A token that was already replaced by another task is left alone.
    pub async fn invalidate(&self, stale: &AuthToken) {
        let mut current = self.current.write().await;
        if current.as_ref() == Some(stale) {
            *current = None;
            debug!("Cached token invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{ScriptedLogin, counting_token, credentials};
    use crate::auth::{LoginError, LoginOutcome};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn store_with(strategy: ScriptedLogin) -> TokenStore {
        TokenStore::new(Authenticator::new(credentials(), vec![Box::new(strategy)]))
    }

    #[tokio::test]
    async fn test_ensure_logs_in_once_and_caches() {
        let (login, calls) = ScriptedLogin::new("scripted", counting_token);
        let store = store_with(login);

        assert_eq!(store.current().await, None);
        assert_eq!(store.ensure().await.unwrap(), AuthToken::new("token-0"));
        assert_eq!(store.ensure().await.unwrap(), AuthToken::new("token-0"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_is_single_flight() {
        let (login, calls) = ScriptedLogin::new("scripted", counting_token);
        let store = Arc::new(store_with(login));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.ensure().await.unwrap() })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), AuthToken::new("token-0"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_relogin() {
        let (login, calls) = ScriptedLogin::new("scripted", counting_token);
        let store = store_with(login);

        let first = store.ensure().await.unwrap();
        store.invalidate(&first).await;
        assert_eq!(store.current().await, None);
        assert_eq!(store.ensure().await.unwrap(), AuthToken::new("token-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_ignores_replaced_token() {
        let (login, _) = ScriptedLogin::new("scripted", counting_token);
        let store = store_with(login);

        let stale = store.ensure().await.unwrap();
        let fresh = store.refresh().await.unwrap();
        store.invalidate(&stale).await;
        assert_eq!(store.current().await, Some(fresh));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_token() {
        let (login, _) = ScriptedLogin::new("scripted", |n| {
            if n == 0 {
                counting_token(n)
            } else {
                Err(LoginError::FormNotFound("portal down".into()))
            }
        });
        let store = store_with(login);

        let token = store.ensure().await.unwrap();
        assert!(store.refresh().await.is_err());
        assert_eq!(store.current().await, Some(token));
    }

    #[tokio::test]
    async fn test_ensure_propagates_login_failure() {
        let (login, _) =
            ScriptedLogin::new("scripted", |_| Ok(LoginOutcome::Rejected("bad password".into())));
        let store = store_with(login);

        let err = store.ensure().await.unwrap_err();
        assert!(err.to_string().contains("bad password"));
        assert_eq!(store.current().await, None);
    }
}
