//! Login against JSON endpoints the portal has exposed at one time or another.
//!
//! Neither the path nor the field names are documented, so every known
//! combination is tried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::auth::token::token_from_login_json;
use crate::auth::{Credentials, LoginError, LoginOutcome, LoginStrategy};

const LOGIN_PATHS: &[&str] = &["api/auth/login", "api/login", "login", "api/Auth/Login"];

/// Username/password field name pairs, in the order they are tried.
const FIELD_CONVENTIONS: &[(&str, &str)] = &[
    ("username", "password"),
    ("kullanici_adi", "sifre"),
    ("UserName", "Password"),
    ("email", "password"),
];

const LOGIN_TIMEOUT: Duration = Duration::from_secs(15);

pub struct JsonCredentialLogin {
    http: reqwest::Client,
    base_url: Url,
}

impl JsonCredentialLogin {
    /// `base_url` must end with '/' so that login paths resolve beneath it.
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    fn login_urls(&self) -> Vec<Url> {
        LOGIN_PATHS
            .iter()
            .filter_map(|p| self.base_url.join(p).ok())
            .collect()
    }
}

#[async_trait]
impl LoginStrategy for JsonCredentialLogin {
    fn name(&self) -> &'static str {
        "json-api"
    }

    async fn attempt(&self, credentials: &Credentials) -> Result<LoginOutcome, LoginError> {
        let urls = self.login_urls();
        let mut unreachable = 0;
        let mut last_error = None;

        'urls: for url in &urls {
            for (user_field, pass_field) in FIELD_CONVENTIONS {
                let mut body = Map::new();
                body.insert(user_field.to_string(), Value::from(credentials.username.as_str()));
                body.insert(pass_field.to_string(), Value::from(credentials.password.as_str()));

                let resp = match self
                    .http
                    .post(url.clone())
                    .json(&body)
                    .timeout(LOGIN_TIMEOUT)
                    .send()
                    .await
                {
                    Ok(resp) => resp,
                    Err(e) => {
                        // Unreachable endpoint: no point trying other field names on it.
                        debug!(url = %url, error = %e, "Login endpoint unreachable");
                        unreachable += 1;
                        last_error = Some(e);
                        continue 'urls;
                    }
                };

                let status = resp.status();
                if status == StatusCode::UNAUTHORIZED {
                    trace!(url = %url, user_field, "Credentials rejected");
                    continue;
                }

                let data = resp.json::<Value>().await.ok();
                if let Some(token) = data.as_ref().and_then(token_from_login_json) {
                    debug!(url = %url, user_field, "Login endpoint returned a token");
                    return Ok(LoginOutcome::Authenticated(token));
                }
                trace!(url = %url, status = status.as_u16(), user_field, "No token in login response");
            }
        }

        if let Some(e) = last_error
            && unreachable == urls.len()
        {
            return Err(e.into());
        }
        Ok(LoginOutcome::Rejected(
            "no login endpoint returned a token".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthToken;
    use crate::auth::testing::credentials;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn login_for(server: &MockServer) -> JsonCredentialLogin {
        let base = Url::parse(&format!("{}/", server.uri())).unwrap();
        JsonCredentialLogin::new(reqwest::Client::new(), base)
    }

    #[tokio::test]
    async fn test_tries_conventions_until_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(404))
            .expect(4)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .and(body_json(json!({"kullanici_adi": "ogrenci", "sifre": "parola"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "tok"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = login_for(&server).attempt(&credentials()).await.unwrap();
        assert_eq!(outcome, LoginOutcome::Authenticated(AuthToken::new("tok")));
    }

    #[tokio::test]
    async fn test_no_token_anywhere_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(16)
            .mount(&server)
            .await;

        let outcome = login_for(&server).attempt(&credentials()).await.unwrap();
        assert!(matches!(outcome, LoginOutcome::Rejected(_)));
    }
}
