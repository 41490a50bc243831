use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Serialize;

/// Body of `POST /api/ders-kayit/v21`.
///
/// `ECRN` lists the sections to add, `SCRN` the sections to drop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrollRequest {
    #[serde(rename = "ECRN")]
    pub add: Vec<String>,
    #[serde(rename = "SCRN")]
    pub drop: Vec<String>,
}

impl EnrollRequest {
    pub fn new(add: Vec<String>, drop: Vec<String>) -> Self {
        Self { add, drop }
    }
}

/// Raw answer to an enrollment request, kept whole for logging.
#[derive(Debug, Clone)]
pub struct EnrollResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}
