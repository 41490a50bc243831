//! HTTP session against the OBS portal.

use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, REFERER,
    USER_AGENT,
};
use reqwest::{StatusCode, Url};
use tracing::{debug, trace};

use crate::auth::AuthToken;
use crate::obs::errors::ObsApiError;
use crate::obs::models::{EnrollRequest, EnrollResponse};
use crate::utils::log_if_slow;

pub const DEFAULT_BASE_URL: &str = "https://obs.itu.edu.tr";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const ENROLL_PATH: &str = "api/ders-kayit/v21";
const JWT_PATH: &str = "ogrenci/auth/jwt";
const SCHEDULE_PAGE_PATH: &str = "public/DersProgram";
const SCHEDULE_SEARCH_PATH: &str = "public/DersProgram/DersProgramSearch";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(2);

/// Client for the OBS portal.
///
/// Holds a single cookie-backed `reqwest::Client`, shared by the login
/// strategies so that SSO cookies carry over to the JWT endpoint.
#[derive(Debug, Clone)]
pub struct ObsClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ObsClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base_url = normalize_base(base_url)?;
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(browser_headers())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, base_url })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a path relative to the portal root.
    pub fn endpoint(&self, path: &str) -> Url {
        // Infallible: `base_url` always ends with '/', and paths here are relative.
        self.base_url
            .join(path.trim_start_matches('/'))
            .unwrap_or_else(|_| self.base_url.clone())
    }

    /// Base URL of the per-branch schedule search, without query parameters.
    pub fn schedule_search_url(&self) -> Url {
        self.endpoint(SCHEDULE_SEARCH_PATH)
    }

    /// Submit an enrollment request.
    ///
    /// `401` maps to [`ObsApiError::Unauthorized`]; every other status is
    /// returned as-is for the caller to interpret.
    pub async fn enroll(
        &self,
        token: &AuthToken,
        request: &EnrollRequest,
    ) -> Result<EnrollResponse, ObsApiError> {
        let url = self.endpoint(ENROLL_PATH);
        let start = Instant::now();

        let resp = self
            .http
            .post(url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token.as_str()))
            .json(request)
            .send()
            .await?;

        log_if_slow(start, SLOW_REQUEST_THRESHOLD, "enrollment request");

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ObsApiError::Unauthorized);
        }

        let headers = resp.headers().clone();
        let body = resp.text().await?;
        debug!(status = status.as_u16(), url = %url, "Enrollment response received");

        Ok(EnrollResponse {
            status,
            headers,
            body,
        })
    }

    /// GET one schedule search page and return its HTML.
    pub async fn fetch_schedule(&self, url: &str) -> Result<String, ObsApiError> {
        let start = Instant::now();
        let resp = self
            .http
            .get(url)
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header("X-Requested-With", "XMLHttpRequest")
            .header(REFERER, self.endpoint(SCHEDULE_PAGE_PATH).as_str())
            .send()
            .await?;

        log_if_slow(start, SLOW_REQUEST_THRESHOLD, "schedule fetch");

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(ObsApiError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(resp.text().await?)
    }

    /// `GET /ogrenci/auth/jwt` with whatever session cookies the jar holds.
    ///
    /// Returns `None` when the portal does not hand out a token (not logged in).
    pub async fn fetch_jwt_body(&self) -> Result<Option<String>, ObsApiError> {
        let resp = self
            .http
            .get(self.endpoint(JWT_PATH))
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            trace!(status = status.as_u16(), "JWT endpoint refused");
            return Ok(None);
        }

        let body = resp.text().await?;
        Ok((!body.trim().is_empty()).then_some(body))
    }
}

/// Parse the base URL and make sure it ends with '/', so `join` appends.
fn normalize_base(base: &str) -> anyhow::Result<Url> {
    let mut base = base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base).with_context(|| format!("Invalid OBS base URL: {base}"))
}

/// Headers a Chrome session on Windows would send to the portal's API.
fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("tr-TR,tr;q=0.9,en;q=0.8"),
    );

    let extra: [(&str, &str); 7] = [
        (
            "sec-ch-ua",
            r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#,
        ),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", r#""Windows""#),
        ("sec-fetch-dest", "empty"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-origin"),
        ("priority", "u=1, i"),
    ];
    for (name, value) in extra {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token() -> AuthToken {
        AuthToken::new("aaa.bbb.ccc")
    }

    #[test]
    fn test_endpoint_joins_under_base_path() {
        let client = ObsClient::new("https://example.edu/obs").unwrap();
        assert_eq!(
            client.endpoint("/api/ders-kayit/v21").as_str(),
            "https://example.edu/obs/api/ders-kayit/v21"
        );
        assert_eq!(
            client.schedule_search_url().as_str(),
            "https://example.edu/obs/public/DersProgram/DersProgramSearch"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ObsClient::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_enroll_sends_bearer_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/ders-kayit/v21"))
            .and(header("Authorization", "Bearer aaa.bbb.ccc"))
            .and(body_json(serde_json::json!({"ECRN": ["23603"], "SCRN": ["11111"]})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = ObsClient::new(&server.uri()).unwrap();
        let request = EnrollRequest::new(vec!["23603".into()], vec!["11111".into()]);
        let resp = client.enroll(&token(), &request).await.unwrap();

        assert_eq!(resp.status, StatusCode::OK);
        assert!(resp.body.contains("success"));
    }

    #[tokio::test]
    async fn test_enroll_401_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/ders-kayit/v21"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = ObsClient::new(&server.uri()).unwrap();
        let err = client
            .enroll(&token(), &EnrollRequest::new(vec!["1".into()], vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ObsApiError::Unauthorized));
    }

    #[tokio::test]
    async fn test_enroll_other_errors_are_returned_raw() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/ders-kayit/v21"))
            .respond_with(ResponseTemplate::new(400).set_body_string("closed"))
            .mount(&server)
            .await;

        let client = ObsClient::new(&server.uri()).unwrap();
        let resp = client
            .enroll(&token(), &EnrollRequest::new(vec!["1".into()], vec![]))
            .await
            .unwrap();
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.body, "closed");
    }

    #[tokio::test]
    async fn test_fetch_schedule_ok_and_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/public/DersProgram/DersProgramSearch"))
            .and(query_param("dersBransKoduId", "113"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<table></table>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/public/DersProgram/DersProgramSearch"))
            .and(query_param("dersBransKoduId", "500"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ObsClient::new(&server.uri()).unwrap();
        let base = client.schedule_search_url();

        let ok = client
            .fetch_schedule(&format!("{base}?dersBransKoduId=113"))
            .await
            .unwrap();
        assert_eq!(ok, "<table></table>");

        let err = client
            .fetch_schedule(&format!("{base}?dersBransKoduId=500"))
            .await
            .unwrap_err();
        assert!(matches!(err, ObsApiError::UnexpectedStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_fetch_jwt_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ogrenci/auth/jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("aaa.bbb.ccc"))
            .mount(&server)
            .await;

        let client = ObsClient::new(&server.uri()).unwrap();
        assert_eq!(
            client.fetch_jwt_body().await.unwrap().as_deref(),
            Some("aaa.bbb.ccc")
        );
    }

    #[tokio::test]
    async fn test_fetch_jwt_body_not_logged_in() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ogrenci/auth/jwt"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/login"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = ObsClient::new(&server.uri()).unwrap();
        assert_eq!(client.fetch_jwt_body().await.unwrap(), None);
    }
}
