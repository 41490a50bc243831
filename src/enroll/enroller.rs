use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::{AuthError, TokenStore};
use crate::obs::{EnrollOutcome, EnrollRequest, ObsApiError, ObsClient, interpret_enroll_response};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("no bearer token: {0}")]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Portal(#[from] ObsApiError),
}

impl SubmitError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Portal(ObsApiError::Unauthorized))
    }
}

/// Sends enrollment requests with the shared token.
pub struct Enroller {
    client: Arc<ObsClient>,
    tokens: Arc<TokenStore>,
}

impl Enroller {
    pub fn new(client: Arc<ObsClient>, tokens: Arc<TokenStore>) -> Self {
        Self { client, tokens }
    }

    pub fn client(&self) -> &ObsClient {
        &self.client
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Add `crns` and drop `drops` in one request.
    ///
    /// Logs the raw response in full. A `401` or a network failure drops the
    /// token that was used, so the next call logs in again.
    pub async fn submit(
        &self,
        crns: &[String],
        drops: &[String],
    ) -> Result<EnrollOutcome, SubmitError> {
        let token = self.tokens.ensure().await?;
        let request = EnrollRequest::new(crns.to_vec(), drops.to_vec());
        info!(add = ?request.add, drop = ?request.drop, "Submitting enrollment request");

        let response = match self.client.enroll(&token, &request).await {
            Ok(response) => response,
            Err(e) => {
                if e.invalidates_token() {
                    self.tokens.invalidate(&token).await;
                }
                warn!(error = %e, "Enrollment request failed");
                return Err(e.into());
            }
        };

        info!(
            status = response.status.as_u16(),
            body = response.body.as_str(),
            "Enrollment response"
        );
        debug!(headers = ?response.headers, "Enrollment response headers");

        let outcome = interpret_enroll_response(response.status, &response.body);
        if outcome.success {
            info!(added = ?outcome.added, message = outcome.message.as_str(), "Enrollment accepted");
        } else {
            warn!(failed = ?outcome.failed, message = outcome.message.as_str(), "Enrollment not accepted");
        }
        Ok(outcome)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{crns, enroller_at, enroller_for};
    use super::*;
    use crate::auth::testing::counting_token;
    use crate::auth::{AuthToken, LoginOutcome};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_submit_sends_bearer_and_interprets() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/ders-kayit/v21"))
            .and(header("authorization", "Bearer token-0"))
            .and(body_json(json!({"ECRN": ["23603"], "SCRN": ["21000"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "eklenenDersler": [{"crn": "23603"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (enroller, _) = enroller_for(&server, counting_token);
        let outcome = enroller
            .submit(&crns(&["23603"]), &crns(&["21000"]))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.added, vec!["23603"]);
    }

    #[tokio::test]
    async fn test_rejection_is_an_outcome_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "basarili": false,
                "mesaj": "Kontenjan dolu",
                "hatalar": ["23603"]
            })))
            .mount(&server)
            .await;

        let (enroller, _) = enroller_for(&server, counting_token);
        let outcome = enroller.submit(&crns(&["23603"]), &[]).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.message, "Kontenjan dolu");
        assert_eq!(outcome.failed, vec!["23603"]);
    }

    #[tokio::test]
    async fn test_unauthorized_invalidates_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (enroller, calls) = enroller_for(&server, counting_token);
        let err = enroller.submit(&crns(&["23603"]), &[]).await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(enroller.tokens().current().await, None);

        // The next submission logs in again.
        let _ = enroller.submit(&crns(&["23603"]), &[]).await;
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_connection_failure_invalidates_token() {
        // Bind then release a port so nothing is listening on it.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let (enroller, calls) = enroller_at(&format!("http://127.0.0.1:{port}"), counting_token);
        let err = enroller.submit(&crns(&["23603"]), &[]).await.unwrap_err();

        assert!(matches!(
            err,
            SubmitError::Portal(ObsApiError::RequestFailed(_))
        ));
        assert!(!err.is_unauthorized());
        assert_eq!(enroller.tokens().current().await, None);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_keeps_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&server)
            .await;

        let (enroller, _) = enroller_for(&server, counting_token);
        let outcome = enroller.submit(&crns(&["23603"]), &[]).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(
            enroller.tokens().current().await,
            Some(AuthToken::new("token-0"))
        );
    }

    #[tokio::test]
    async fn test_no_request_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (enroller, _) =
            enroller_for(&server, |_| Ok(LoginOutcome::Rejected("bad password".into())));
        let err = enroller.submit(&crns(&["23603"]), &[]).await.unwrap_err();

        assert!(matches!(err, SubmitError::Auth(_)));
    }
}
