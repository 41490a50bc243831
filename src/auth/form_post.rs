//! Last-resort login: a plain urlencoded POST to `/login`, scraping the token
//! out of whatever page comes back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::auth::token::token_from_text;
use crate::auth::{Credentials, LoginError, LoginOutcome, LoginStrategy};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(15);

pub struct FormPostLogin {
    http: reqwest::Client,
    base_url: Url,
}

impl FormPostLogin {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// `{base}/login`, unless the base already points at a login page.
    fn form_url(&self) -> Url {
        let trimmed = self.base_url.as_str().trim_end_matches('/');
        if trimmed.ends_with("login") {
            return Url::parse(trimmed).unwrap_or_else(|_| self.base_url.clone());
        }
        self.base_url
            .join("login")
            .unwrap_or_else(|_| self.base_url.clone())
    }
}

#[async_trait]
impl LoginStrategy for FormPostLogin {
    fn name(&self) -> &'static str {
        "form-post"
    }

    async fn attempt(&self, credentials: &Credentials) -> Result<LoginOutcome, LoginError> {
        // Landing page first, for whatever session cookies it sets.
        self.http
            .get(self.base_url.clone())
            .timeout(LOGIN_TIMEOUT)
            .send()
            .await?;

        let url = self.form_url();
        let resp = self
            .http
            .post(url.clone())
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .timeout(LOGIN_TIMEOUT)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Ok(LoginOutcome::Rejected(format!(
                "{url} answered {}",
                status.as_u16()
            )));
        }

        let body = resp.text().await?;
        match token_from_text(&body) {
            Some(token) => Ok(LoginOutcome::Authenticated(token)),
            None => {
                debug!(url = %url, "Login page carried no token");
                Ok(LoginOutcome::Rejected(format!("no token in {url} response")))
            }
        }
    }
}
