use thiserror::Error;

use super::store::StoreError;
use super::transport::TransportError;

/// Errors returned by credential operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not logged in")]
    NotLoggedIn,
    #[error("Authorization code is empty")]
    InvalidCode,
    #[error("Expired or invalid grant")]
    ExpiredOrInvalidGrant,
    #[error("Token endpoint rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<TransportError> for AuthError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Network(message) => Self::Network(message),
            TransportError::Decode(message) => Self::InvalidResponse(message),
            TransportError::Status { status, body } => {
                let code = oauth_error_code(&body);
                if matches!(status, 400 | 401) && code.as_deref() == Some("invalid_grant") {
                    return Self::ExpiredOrInvalidGrant;
                }
                Self::Rejected {
                    status,
                    message: code.unwrap_or(body),
                }
            }
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(error: StoreError) -> Self {
        Self::Storage(error.to_string())
    }
}

/// Pull the RFC 6749 `error` field out of a token endpoint error body.
fn oauth_error_code(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.as_str())
                .map(|s| s.to_string())
        })
}
