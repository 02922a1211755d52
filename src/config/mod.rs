//! Authorization server configuration (layered: code > env > config file).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{KeyturnError, Result};

/// Static settings for the one authorization server a session talks to.
///
/// Fixed at construction; never derived from user input.
///
/// # Example
/// ```no_run
/// use keyturn::config::AuthConfig;
///
/// let config = AuthConfig::new("example.com/api", "client", "secret", "com.example.app");
/// assert_eq!(
///     config.callback_url(),
///     "com.example.app://example.com/api/cordova/com.example.app/callback",
/// );
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Host (and optional path prefix) of the authorization server.
    pub domain: String,
    pub client_id: String,
    pub client_secret: String,
    /// App identifier; doubles as the redirect URI scheme.
    pub package_identifier: String,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub revoke_endpoint: Option<String>,
    /// Revoke the access token at the server before clearing it on logout.
    #[serde(default)]
    pub revoke_on_logout: bool,
    /// Tries per stored key before logout reports failure (default 3).
    #[serde(default)]
    pub logout_attempts: Option<u32>,
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
}

impl AuthConfig {
    pub fn new(
        domain: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        package_identifier: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            package_identifier: package_identifier.into(),
            authorization_endpoint: None,
            token_endpoint: None,
            revoke_endpoint: None,
            revoke_on_logout: false,
            logout_attempts: None,
            http_timeout_secs: None,
            store_dir: None,
        }
    }

    pub fn with_authorization_endpoint(mut self, url: impl Into<String>) -> Self {
        self.authorization_endpoint = Some(url.into());
        self
    }

    pub fn with_token_endpoint(mut self, url: impl Into<String>) -> Self {
        self.token_endpoint = Some(url.into());
        self
    }

    pub fn with_revoke_endpoint(mut self, url: impl Into<String>) -> Self {
        self.revoke_endpoint = Some(url.into());
        self
    }

    pub fn with_revoke_on_logout(mut self, enabled: bool) -> Self {
        self.revoke_on_logout = enabled;
        self
    }

    pub fn with_logout_attempts(mut self, attempts: u32) -> Self {
        self.logout_attempts = Some(attempts);
        self
    }

    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    /// Load from environment variables (`KEYTURN_DOMAIN`, `KEYTURN_CLIENT_ID`, ...).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; `from_env` uses the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| KeyturnError::Configuration(format!("{name} is not set")))
        };
        let mut config = Self::new(
            required("KEYTURN_DOMAIN")?,
            required("KEYTURN_CLIENT_ID")?,
            required("KEYTURN_CLIENT_SECRET")?,
            required("KEYTURN_PACKAGE_ID")?,
        );
        config.authorization_endpoint = lookup("KEYTURN_AUTHORIZATION_ENDPOINT");
        config.token_endpoint = lookup("KEYTURN_TOKEN_ENDPOINT");
        config.revoke_endpoint = lookup("KEYTURN_REVOKE_ENDPOINT");
        config.store_dir = lookup("KEYTURN_STORE_DIR").map(PathBuf::from);
        if let Some(raw) = lookup("KEYTURN_HTTP_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                KeyturnError::Configuration(format!(
                    "KEYTURN_HTTP_TIMEOUT_SECS must be a whole number of seconds, got {raw:?}"
                ))
            })?;
            config.http_timeout_secs = Some(secs);
        }
        if let Some(raw) = lookup("KEYTURN_LOGOUT_ATTEMPTS") {
            let attempts = raw.trim().parse::<u32>().map_err(|_| {
                KeyturnError::Configuration(format!(
                    "KEYTURN_LOGOUT_ATTEMPTS must be a positive whole number, got {raw:?}"
                ))
            })?;
            config.logout_attempts = Some(attempts);
        }
        if let Some(raw) = lookup("KEYTURN_REVOKE_ON_LOGOUT") {
            config.revoke_on_logout = matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("domain", &self.domain),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("package_identifier", &self.package_identifier),
        ] {
            if value.trim().is_empty() {
                return Err(KeyturnError::Configuration(format!("{name} must not be empty")));
            }
        }
        if self.logout_attempts == Some(0) {
            return Err(KeyturnError::Configuration(
                "logout_attempts must be at least 1".to_string(),
            ));
        }
        if self.domain.contains("://") {
            return Err(KeyturnError::Configuration(
                "domain must not include a scheme".to_string(),
            ));
        }
        Ok(())
    }

    /// Redirect target registered with the server: `{scheme}://{domain}/cordova/{scheme}/callback`.
    pub fn callback_url(&self) -> String {
        let scheme = &self.package_identifier;
        format!("{scheme}://{}/cordova/{scheme}/callback", self.domain())
    }

    pub fn authorization_endpoint(&self) -> String {
        self.authorization_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}/auth", self.domain()))
    }

    pub fn token_endpoint(&self) -> String {
        self.token_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}/token", self.domain()))
    }

    pub fn revoke_endpoint(&self) -> String {
        self.revoke_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}/token/revoke", self.domain()))
    }

    /// URL the user is sent to for consent.
    pub fn authorize_url(&self) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}",
            self.authorization_endpoint(),
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.callback_url()),
        )
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }

    fn domain(&self) -> &str {
        self.domain.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn sample() -> AuthConfig {
        AuthConfig::new("territory.example/api", "client-1", "s3cret", "com.example.app")
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn callback_url_uses_package_identifier_as_scheme() {
        assert_eq!(
            sample().callback_url(),
            "com.example.app://territory.example/api/cordova/com.example.app/callback"
        );
    }

    #[test]
    fn authorize_url_encodes_redirect_uri() {
        assert_eq!(
            sample().authorize_url(),
            "https://territory.example/api/auth?response_type=code&client_id=client-1\
             &redirect_uri=com.example.app%3A%2F%2Fterritory.example%2Fapi%2Fcordova%2Fcom.example.app%2Fcallback"
        );
    }

    #[test]
    fn endpoints_default_to_domain() {
        let config = sample();
        assert_eq!(config.token_endpoint(), "https://territory.example/api/token");
        assert_eq!(
            config.revoke_endpoint(),
            "https://territory.example/api/token/revoke"
        );
    }

    #[test]
    fn endpoint_overrides_take_precedence() {
        let config = sample().with_token_endpoint("http://127.0.0.1:9/token");
        assert_eq!(config.token_endpoint(), "http://127.0.0.1:9/token");
    }

    #[test]
    fn from_lookup_reads_required_and_optional_values() {
        let config = AuthConfig::from_lookup(lookup_from(&[
            ("KEYTURN_DOMAIN", "auth.example"),
            ("KEYTURN_CLIENT_ID", "cid"),
            ("KEYTURN_CLIENT_SECRET", "secret"),
            ("KEYTURN_PACKAGE_ID", "com.example"),
            ("KEYTURN_HTTP_TIMEOUT_SECS", "15"),
            ("KEYTURN_REVOKE_ON_LOGOUT", "true"),
            ("KEYTURN_LOGOUT_ATTEMPTS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.logout_attempts, Some(5));
        assert_eq!(config.domain, "auth.example");
        assert_eq!(config.http_timeout(), Some(Duration::from_secs(15)));
        assert!(config.revoke_on_logout);
    }

    #[test]
    fn from_lookup_reports_missing_variable() {
        let err = AuthConfig::from_lookup(lookup_from(&[("KEYTURN_DOMAIN", "auth.example")]))
            .unwrap_err();
        assert!(err.to_string().contains("KEYTURN_CLIENT_ID"));
    }

    #[test]
    fn from_lookup_rejects_bad_timeout() {
        let err = AuthConfig::from_lookup(lookup_from(&[
            ("KEYTURN_DOMAIN", "auth.example"),
            ("KEYTURN_CLIENT_ID", "cid"),
            ("KEYTURN_CLIENT_SECRET", "secret"),
            ("KEYTURN_PACKAGE_ID", "com.example"),
            ("KEYTURN_HTTP_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, KeyturnError::Configuration(_)));
    }

    #[test]
    fn toml_config_parses() {
        let config = AuthConfig::from_toml_str(
            r#"
            domain = "auth.example"
            client_id = "cid"
            client_secret = "secret"
            package_identifier = "com.example"
            revoke_on_logout = true
            "#,
        )
        .unwrap();
        assert!(config.revoke_on_logout);
        assert_eq!(config.authorization_endpoint(), "https://auth.example/auth");
    }

    #[test]
    fn zero_logout_attempts_is_rejected() {
        let err = sample().with_logout_attempts(0).validate().unwrap_err();
        assert!(err.to_string().contains("logout_attempts"));
    }

    #[test]
    fn toml_config_rejects_scheme_in_domain() {
        let err = AuthConfig::from_toml_str(
            r#"
            domain = "https://auth.example"
            client_id = "cid"
            client_secret = "secret"
            package_identifier = "com.example"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, KeyturnError::Configuration(_)));
    }
}
