use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::error::AuthError;

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// The single OAuth credential managed by a session.
///
/// All four fields travel together: a credential either exists in full or
/// not at all.
///
/// # Example
/// ```no_run
/// use chrono::{Duration, Utc};
/// use keyturn::auth::Credential;
///
/// let credential = Credential {
///     access_token: "access".to_string(),
///     refresh_token: "refresh".to_string(),
///     token_type: "Bearer".to_string(),
///     expires_at: Utc::now() + Duration::hours(1),
/// };
/// assert!(credential.is_valid());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from a token endpoint response.
    ///
    /// `completed_at` is the instant the response arrived; `expires_at` is
    /// derived from it. A response without a refresh token reuses
    /// `previous_refresh_token` (refresh responses may omit rotation).
    pub fn from_response(
        response: TokenResponse,
        previous_refresh_token: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        if response.access_token.trim().is_empty() {
            return Err(AuthError::InvalidResponse(
                "Token response has an empty access_token".to_string(),
            ));
        }
        let refresh_token = match (response.refresh_token, previous_refresh_token) {
            (Some(token), _) if !token.is_empty() => token,
            (_, Some(previous)) => previous.to_string(),
            _ => {
                return Err(AuthError::InvalidResponse(
                    "Token response missing refresh_token".to_string(),
                ))
            }
        };
        let expires_at = i64::try_from(response.expires_in)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| completed_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                AuthError::InvalidResponse("Token response expires_in out of range".to_string())
            })?;
        Ok(Self {
            access_token: response.access_token,
            refresh_token,
            token_type: response
                .token_type
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
            expires_at,
        })
    }

    /// Whether the access token is still usable at `now` (strictly before expiry).
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Time left until expiry, clamped at zero.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }

    /// `Authorization` header value, e.g. `Bearer abc`.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// JSON body returned by the token endpoint for both grants.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(deserialize_with = "deserialize_seconds")]
    pub expires_in: u64,
}

impl TokenResponse {
    pub fn from_json(value: serde_json::Value) -> Result<Self, AuthError> {
        serde_json::from_value(value)
            .map_err(|e| AuthError::InvalidResponse(format!("Malformed token response: {e}")))
    }
}

/// Some servers send `expires_in` as a string or a float.
fn deserialize_seconds<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Float(f64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(value) => Ok(value),
        Seconds::Float(value) if value.is_finite() && value >= 0.0 => Ok(value.trunc() as u64),
        Seconds::Float(value) => Err(serde::de::Error::custom(format!(
            "invalid expires_in: {value}"
        ))),
        Seconds::Text(text) => text
            .trim()
            .parse::<u64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid expires_in: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn response(expires_in: serde_json::Value) -> TokenResponse {
        TokenResponse::from_json(json!({
            "access_token": "acc",
            "refresh_token": "ref",
            "token_type": "bearer",
            "expires_in": expires_in,
        }))
        .unwrap()
    }

    #[test]
    fn expiry_is_completion_time_plus_lifetime() {
        let credential = Credential::from_response(response(json!(3600)), None, at(0)).unwrap();
        assert_eq!(credential.expires_at, at(3600));
        assert!(credential.is_valid_at(at(3599)));
        assert!(!credential.is_valid_at(at(3601)));
    }

    #[test]
    fn credential_is_invalid_exactly_at_expiry() {
        let credential = Credential::from_response(response(json!(60)), None, at(0)).unwrap();
        assert!(!credential.is_valid_at(at(60)));
    }

    #[test]
    fn string_expires_in_is_accepted() {
        let credential = Credential::from_response(response(json!("120")), None, at(0)).unwrap();
        assert_eq!(credential.expires_at, at(120));
    }

    #[test]
    fn float_expires_in_is_truncated() {
        let credential = Credential::from_response(response(json!(3600.0)), None, at(0)).unwrap();
        assert_eq!(credential.expires_at, at(3600));
        let credential = Credential::from_response(response(json!(90.9)), None, at(0)).unwrap();
        assert_eq!(credential.expires_at, at(90));
    }

    #[test]
    fn negative_expires_in_is_invalid() {
        let result = TokenResponse::from_json(json!({
            "access_token": "acc",
            "refresh_token": "ref",
            "expires_in": -1.5,
        }));
        assert!(matches!(result, Err(AuthError::InvalidResponse(_))));
    }

    #[test]
    fn missing_refresh_token_reuses_previous() {
        let payload = TokenResponse::from_json(json!({
            "access_token": "new-acc",
            "token_type": "bearer",
            "expires_in": 10,
        }))
        .unwrap();
        let credential = Credential::from_response(payload, Some("old-ref"), at(0)).unwrap();
        assert_eq!(credential.refresh_token, "old-ref");
    }

    #[test]
    fn missing_refresh_token_without_previous_is_rejected() {
        let payload = TokenResponse::from_json(json!({
            "access_token": "acc",
            "expires_in": 10,
        }))
        .unwrap();
        let result = Credential::from_response(payload, None, at(0));
        assert!(matches!(result, Err(AuthError::InvalidResponse(_))));
    }

    #[test]
    fn missing_token_type_defaults_to_bearer() {
        let payload = TokenResponse::from_json(json!({
            "access_token": "acc",
            "refresh_token": "ref",
            "expires_in": 10,
        }))
        .unwrap();
        let credential = Credential::from_response(payload, None, at(0)).unwrap();
        assert_eq!(credential.authorization_header(), "Bearer acc");
    }

    #[test]
    fn malformed_response_is_invalid() {
        let result = TokenResponse::from_json(json!({ "error": "invalid_request" }));
        assert!(matches!(result, Err(AuthError::InvalidResponse(_))));
    }

    #[test]
    fn remaining_is_clamped_at_zero() {
        let credential = Credential::from_response(response(json!(5)), None, at(0)).unwrap();
        assert_eq!(credential.remaining_at(at(2)), Duration::seconds(3));
        assert_eq!(credential.remaining_at(at(10)), Duration::zero());
    }
}
