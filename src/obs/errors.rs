//! Error types for the OBS portal client.

#[derive(Debug, thiserror::Error)]
pub enum ObsApiError {
    /// The portal answered `401`; the cached bearer token is no longer valid.
    #[error("OBS rejected the bearer token (401)")]
    Unauthorized,
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
    #[error(transparent)]
    RequestFailed(#[from] reqwest::Error),
}

impl ObsApiError {
    /// Whether the cached token should be dropped after this error.
    ///
    /// Network failures count as well: the portal tends to reset connections
    /// for stale sessions instead of answering `401`.
    pub fn invalidates_token(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::RequestFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_invalidates_token() {
        assert!(ObsApiError::Unauthorized.invalidates_token());
    }

    #[test]
    fn test_unexpected_status_keeps_token() {
        let err = ObsApiError::UnexpectedStatus {
            status: 503,
            url: "https://obs.itu.edu.tr/api/ders-kayit/v21".to_string(),
        };
        assert!(!err.invalidates_token());
        assert!(err.to_string().contains("503"));
    }
}
