//! Credential-to-token exchange.
//!
//! The portal offers no documented login API, so authentication is an ordered
//! list of [`LoginStrategy`] implementations tried one after another until
//! one yields a bearer token.

pub mod external;
pub mod form_post;
pub mod json_api;
pub mod sso;
pub mod store;
pub mod token;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::obs::ObsApiError;

pub use external::ExternalCommandLogin;
pub use form_post::FormPostLogin;
pub use json_api::JsonCredentialLogin;
pub use sso::SsoFormLogin;
pub use store::TokenStore;
pub use token::AuthToken;

/// Portal username and password.
#[derive(Clone, custom_debug_derive::Debug)]
pub struct Credentials {
    pub username: String,
    #[debug(with = crate::fmt::redacted)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Result of a single strategy that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(AuthToken),
    /// The strategy ran but the portal did not hand out a token.
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    Portal(#[from] ObsApiError),
    #[error("login form not found: {0}")]
    FormNotFound(String),
    #[error("login command failed: {0}")]
    Command(String),
}

#[async_trait]
pub trait LoginStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn attempt(&self, credentials: &Credentials) -> Result<LoginOutcome, LoginError>;
}

#[derive(Debug, thiserror::Error)]
#[error("all login strategies failed ({})", summarize(.attempts))]
pub struct AuthError {
    /// Strategy name and why it did not produce a token.
    pub attempts: Vec<(&'static str, String)>,
}

fn summarize(attempts: &[(&'static str, String)]) -> String {
    if attempts.is_empty() {
        return "no strategies configured".to_string();
    }
    attempts
        .iter()
        .map(|(name, reason)| format!("{name}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Runs login strategies in order and returns the first token obtained.
pub struct Authenticator {
    credentials: Credentials,
    strategies: Vec<Box<dyn LoginStrategy>>,
}

impl Authenticator {
    pub fn new(credentials: Credentials, strategies: Vec<Box<dyn LoginStrategy>>) -> Self {
        Self {
            credentials,
            strategies,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn login(&self) -> Result<AuthToken, AuthError> {
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let name = strategy.name();
            debug!(strategy = name, "Attempting login");

            match strategy.attempt(&self.credentials).await {
                Ok(LoginOutcome::Authenticated(token)) => {
                    info!(strategy = name, "Login succeeded");
                    return Ok(token);
                }
                Ok(LoginOutcome::Rejected(reason)) => {
                    debug!(strategy = name, reason = reason.as_str(), "Login strategy yielded no token");
                    attempts.push((name, reason));
                }
                Err(e) => {
                    warn!(strategy = name, error = %e, "Login strategy failed");
                    attempts.push((name, e.to_string()));
                }
            }
        }

        Err(AuthError { attempts })
    }
}
