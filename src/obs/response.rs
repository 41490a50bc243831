//! Interpretation of the enrollment endpoint's loosely-shaped JSON answers.
//!
//! The portal has changed its response keys between registration periods
//! (Turkish and English variants both show up), so every field is looked up
//! under several names.

use reqwest::StatusCode;
use serde_json::{Map, Value};

const SUCCESS_KEYS: &[&str] = &["success", "basarili", "isSuccess"];
const ADDED_KEYS: &[&str] = &[
    "eklenenDersler",
    "eklenen",
    "added",
    "kayitYapilanDersler",
    "data",
];
const MESSAGE_KEYS: &[&str] = &["message", "mesaj", "error"];
const FAILED_KEYS: &[&str] = &["errors", "hatalar", "failedCRNs"];

/// What an enrollment request achieved, as far as the response tells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollOutcome {
    pub success: bool,
    pub added: Vec<String>,
    pub failed: Vec<String>,
    pub message: String,
}

impl EnrollOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            added: Vec::new(),
            failed: Vec::new(),
            message: message.into(),
        }
    }
}

/// Interpret an enrollment response body.
pub fn interpret_enroll_response(status: StatusCode, body: &str) -> EnrollOutcome {
    let data: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return EnrollOutcome::failure(format!("invalid JSON - {}", truncate(body, 200))),
    };

    let Some(obj) = data.as_object() else {
        return EnrollOutcome::failure("response is not a JSON object");
    };

    match first_present(obj, SUCCESS_KEYS) {
        Some(Value::Bool(true)) => EnrollOutcome {
            success: true,
            added: added_crns(obj),
            failed: Vec::new(),
            message: "enrolled".to_string(),
        },
        Some(Value::Bool(false)) => {
            let message = first_present(obj, MESSAGE_KEYS)
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or("some courses could not be added")
                .to_string();
            let failed = first_present(obj, FAILED_KEYS)
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(crn_of_item).collect())
                .unwrap_or_default();
            EnrollOutcome {
                success: false,
                added: Vec::new(),
                failed,
                message,
            }
        }
        _ if status == StatusCode::OK => EnrollOutcome {
            success: true,
            added: Vec::new(),
            failed: Vec::new(),
            message: "enrolled (response not understood)".to_string(),
        },
        _ => {
            let snippet = truncate(body, 150);
            EnrollOutcome::failure(if snippet.is_empty() {
                "unknown response".to_string()
            } else {
                snippet
            })
        }
    }
}

/// Value of the first key that is present, even if it is `null`.
fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

fn added_crns(obj: &Map<String, Value>) -> Vec<String> {
    let mut added = Vec::new();
    for key in ADDED_KEYS {
        match obj.get(*key) {
            Some(Value::Array(items)) => {
                added.extend(items.iter().filter_map(crn_of_item));
                break;
            }
            Some(Value::Object(item)) => {
                if let Some(crn) = item.get("crn").map(value_to_string) {
                    added.push(crn);
                }
            }
            _ => {}
        }
    }
    added
}

/// A list item is either a bare CRN string or an object carrying `crn`.
fn crn_of_item(item: &Value) -> Option<String> {
    match item {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("crn").map(value_to_string),
        _ => None,
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
