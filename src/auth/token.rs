//! Bearer token type and the heuristics that dig it out of portal responses.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Keys under which login endpoints have been seen returning the token.
const LOGIN_TOKEN_KEYS: &[&str] = &["token", "accessToken", "access_token", "jwt"];

/// Keys tried on the `/ogrenci/auth/jwt` response.
const JWT_ENDPOINT_KEYS: &[&str] = &["token", "accessToken", "access_token", "jwt", "data"];

static BARE_JWT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+$").unwrap());

static EMBEDDED_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)"token"\s*:\s*"([^"]+)""#).unwrap());

/// A bearer JWT for the enrollment API.
#[derive(Clone, PartialEq, Eq, custom_debug_derive::Debug)]
pub struct AuthToken {
    #[debug(with = crate::fmt::redacted)]
    value: String,
}

impl AuthToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

/// Extract a token from a `/ogrenci/auth/jwt` body.
///
/// The endpoint answers either with the bare JWT or with JSON wrapping it.
pub fn token_from_jwt_body(body: &str) -> Option<AuthToken> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if BARE_JWT.is_match(body) {
        return Some(AuthToken::new(body));
    }

    match serde_json::from_str::<Value>(body).ok()? {
        Value::String(s) if !s.is_empty() => Some(AuthToken::new(s)),
        Value::Object(map) => JWT_ENDPOINT_KEYS.iter().find_map(|key| match map.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(AuthToken::new(s.clone())),
            Some(Value::Object(inner)) => inner
                .get("token")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(AuthToken::new),
            _ => None,
        }),
        _ => None,
    }
}

/// Extract a token from a JSON login response.
pub fn token_from_login_json(data: &Value) -> Option<AuthToken> {
    let map = data.as_object()?;
    LOGIN_TOKEN_KEYS
        .iter()
        .find_map(|key| match map.get(*key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .map(AuthToken::new)
}

/// Find a `"token": "..."` pair anywhere in an HTML or text body.
pub fn token_from_text(body: &str) -> Option<AuthToken> {
    EMBEDDED_TOKEN
        .captures(body)
        .map(|caps| AuthToken::new(&caps[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_debug_is_redacted() {
        let token = AuthToken::new("eyJhbGciOi.secret.sig");
        let debug = format!("{token:?}");
        assert!(!debug.contains("secret"), "{debug}");
        assert!(debug.contains("redacted"), "{debug}");
    }

    #[test]
    fn test_jwt_body_bare() {
        assert_eq!(
            token_from_jwt_body("  eyJh.eyJz.c2ln\n"),
            Some(AuthToken::new("eyJh.eyJz.c2ln"))
        );
    }

    #[test]
    fn test_jwt_body_json_keys() {
        assert_eq!(
            token_from_jwt_body(r#"{"accessToken": "abc"}"#),
            Some(AuthToken::new("abc"))
        );
        assert_eq!(
            token_from_jwt_body(r#"{"data": {"token": "nested"}}"#),
            Some(AuthToken::new("nested"))
        );
        assert_eq!(
            token_from_jwt_body(r#""quoted-token""#),
            Some(AuthToken::new("quoted-token"))
        );
    }

    #[test]
    fn test_jwt_body_rejects_junk() {
        assert_eq!(token_from_jwt_body(""), None);
        assert_eq!(token_from_jwt_body("<html>login</html>"), None);
        assert_eq!(token_from_jwt_body(r#"{"token": ""}"#), None);
        assert_eq!(token_from_jwt_body("[1,2]"), None);
    }

    #[test]
    fn test_login_json_key_order() {
        let data = json!({"jwt": "second", "token": "first"});
        assert_eq!(token_from_login_json(&data), Some(AuthToken::new("first")));
    }

    #[test]
    fn test_login_json_skips_empty_values() {
        let data = json!({"token": "", "access_token": "real"});
        assert_eq!(token_from_login_json(&data), Some(AuthToken::new("real")));
        assert_eq!(token_from_login_json(&json!({"ok": true})), None);
        assert_eq!(token_from_login_json(&json!(["token"])), None);
    }

    #[test]
    fn test_token_from_text() {
        let body = r#"<script>window.__STATE__ = {"Token" : "abc.def.ghi"};</script>"#;
        assert_eq!(token_from_text(body), Some(AuthToken::new("abc.def.ghi")));
        assert_eq!(token_from_text("no token here"), None);
    }
}
