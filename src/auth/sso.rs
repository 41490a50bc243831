//! Cookie-based SSO login without a browser.
//!
//! Opening the portal redirects to the university login page. The login form
//! is filled in and posted like a browser would, which leaves the session
//! cookies in the shared jar; `/ogrenci/auth/jwt` then exchanges those
//! cookies for the bearer token.

use std::sync::LazyLock;

use async_trait::async_trait;
use html_scraper::{ElementRef, Html, Selector};
use reqwest::Url;
use reqwest::header::ACCEPT;
use tracing::debug;

use crate::auth::token::token_from_jwt_body;
use crate::auth::{Credentials, LoginError, LoginOutcome, LoginStrategy};
use crate::obs::ObsClient;

const USERNAME_SELECTORS: &[&str] = &[
    r#"input[name="username"]"#,
    r#"input[name="UserName"]"#,
    r#"input[name="KullaniciAdi"]"#,
    r#"input[type="email"]"#,
    r#"input[id*="username"]"#,
    r#"input[id*="UserName"]"#,
    r#"input[id*="KullaniciAdi"]"#,
    r#"input[placeholder*="mail"]"#,
    r#"input[placeholder*="kullanıcı"]"#,
];

const PASSWORD_SELECTORS: &[&str] = &[
    r#"input[name="password"]"#,
    r#"input[name="Password"]"#,
    r#"input[name="Sifre"]"#,
    r#"input[type="password"]"#,
    r#"input[id*="password"]"#,
    r#"input[id*="Password"]"#,
    r#"input[id*="Sifre"]"#,
];

static FORM_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form").unwrap());
static INPUT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("input").unwrap());
static PASSWORD_INPUT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[type="password"]"#).unwrap());
static SUBMIT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"button[type="submit"][name], input[type="submit"][name]"#).unwrap()
});

/// A login form ready to be posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoginForm {
    pub action: Url,
    pub fields: Vec<(String, String)>,
}

pub struct SsoFormLogin {
    client: ObsClient,
    start_url: Url,
}

impl SsoFormLogin {
    pub fn new(client: ObsClient, start_url: Url) -> Self {
        Self { client, start_url }
    }
}

#[async_trait]
impl LoginStrategy for SsoFormLogin {
    fn name(&self) -> &'static str {
        "sso-form"
    }

    async fn attempt(&self, credentials: &Credentials) -> Result<LoginOutcome, LoginError> {
        // A still-valid session skips the form entirely.
        if let Some(token) = self
            .client
            .fetch_jwt_body()
            .await?
            .as_deref()
            .and_then(token_from_jwt_body)
        {
            debug!("Existing session cookies already grant a token");
            return Ok(LoginOutcome::Authenticated(token));
        }

        let resp = self
            .client
            .http()
            .get(self.start_url.clone())
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await?;
        let page_url = resp.url().clone();
        let body = resp.text().await?;

        let form = {
            let html = Html::parse_document(&body);
            build_login_form(&html, &page_url, credentials)?
        };
        debug!(action = %form.action, fields = form.fields.len(), "Submitting login form");

        let resp = self
            .client
            .http()
            .post(form.action)
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .form(&form.fields)
            .send()
            .await?;
        debug!(status = resp.status().as_u16(), landed = %resp.url(), "Login form posted");

        match self
            .client
            .fetch_jwt_body()
            .await?
            .as_deref()
            .and_then(token_from_jwt_body)
        {
            Some(token) => Ok(LoginOutcome::Authenticated(token)),
            None => Ok(LoginOutcome::Rejected(
                "portal issued no token after submitting the login form".to_string(),
            )),
        }
    }
}

/// Locate the form holding a password input and fill in the credentials.
pub(crate) fn build_login_form(
    html: &Html,
    page_url: &Url,
    credentials: &Credentials,
) -> Result<LoginForm, LoginError> {
    let form = html
        .select(&FORM_SELECTOR)
        .find(|form| form.select(&PASSWORD_INPUT).next().is_some())
        .ok_or_else(|| LoginError::FormNotFound(format!("no password form on {page_url}")))?;

    let username_field = find_named_input(form, USERNAME_SELECTORS)
        .ok_or_else(|| LoginError::FormNotFound("username input".to_string()))?;
    let password_field = find_named_input(form, PASSWORD_SELECTORS)
        .ok_or_else(|| LoginError::FormNotFound("password input".to_string()))?;

    let mut fields = extract_form_fields(form);
    set_field(&mut fields, &username_field, &credentials.username);
    set_field(&mut fields, &password_field, &credentials.password);

    // Some login pages dispatch on the clicked button's name.
    if let Some(submit) = form.select(&SUBMIT_SELECTOR).next()
        && let Some(name) = submit.attr("name")
    {
        let value = submit.attr("value").unwrap_or_default();
        set_field(&mut fields, name, value);
    }

    let action = match form.attr("action").map(str::trim) {
        Some(action) if !action.is_empty() => page_url
            .join(action)
            .map_err(|e| LoginError::FormNotFound(format!("bad form action {action:?}: {e}")))?,
        _ => page_url.clone(),
    };

    Ok(LoginForm { action, fields })
}

/// Name of the first input matching one of `selectors` (in priority order).
fn find_named_input(form: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        let selector = Selector::parse(sel).ok()?;
        form.select(&selector)
            .filter_map(|input| input.attr("name"))
            .find(|name| !name.is_empty())
            .map(str::to_string)
    })
}

/// Values a browser would submit with the form, before the user types anything.
fn extract_form_fields(form: ElementRef<'_>) -> Vec<(String, String)> {
    let mut fields = Vec::new();

    for input in form.select(&INPUT_SELECTOR) {
        let name = match input.attr("name") {
            Some(n) if !n.is_empty() => n,
            _ => continue,
        };
        let input_type = input.attr("type").unwrap_or("text").to_lowercase();

        // Buttons are only sent when clicked.
        if matches!(input_type.as_str(), "submit" | "image" | "button" | "reset") {
            continue;
        }
        if (input_type == "radio" || input_type == "checkbox") && input.attr("checked").is_none()
        {
            continue;
        }

        let value = input.attr("value").unwrap_or_default().to_string();
        fields.push((name.to_string(), value));
    }

    fields
}

fn set_field(fields: &mut Vec<(String, String)>, name: &str, value: &str) {
    match fields.iter_mut().find(|(n, _)| n == name) {
        Some(existing) => existing.1 = value.to_string(),
        None => fields.push((name.to_string(), value.to_string())),
    }
}
