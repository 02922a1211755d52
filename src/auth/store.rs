use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::credential::Credential;

/// Key under which the credential record is persisted.
pub const CREDENTIAL_KEY: &str = "credential";

/// Keys used by the older four-key layout.
pub const LEGACY_KEYS: [&str; 4] = ["access_token", "refresh_token", "token_type", "expires_at"];

const RECORD_VERSION: u32 = 1;
const DEFAULT_REMOVE_ATTEMPTS: u32 = 3;

/// Failure of a single key-value operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Platform key-value persistence.
///
/// Every call is independent; there is no multi-key transaction.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store, mostly useful for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.values
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// File-backed store: one file per key under a base directory.
///
/// # Example
/// ```no_run
/// use keyturn::auth::{FileKeyValueStore, KeyValueStore};
///
/// # async fn example() -> Result<(), keyturn::auth::StoreError> {
/// let store = FileKeyValueStore::new("/tmp/keyturn");
/// store.set("greeting", "hello").await?;
/// assert_eq!(store.get("greeting").await?.as_deref(), Some("hello"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    base_dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn new_default() -> Self {
        Self::new(default_store_dir())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.value", normalize_key(key)))
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.key_path(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let path = self.key_path(key);
        // Write-then-rename so readers never observe a truncated value.
        let staging = path.with_extension("value.tmp");
        tokio::fs::write(&staging, value).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o600)).await?;
        }
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.key_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Persists the [`Credential`] as one record on top of a [`KeyValueStore`].
///
/// Older installs kept the credential spread across [`LEGACY_KEYS`]; those
/// are still read when no record exists and are removed on save and clear.
#[derive(Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KeyValueStore>,
    remove_attempts: u32,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("kv", &"..")
            .field("remove_attempts", &self.remove_attempts)
            .finish()
    }
}

impl CredentialStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            remove_attempts: DEFAULT_REMOVE_ATTEMPTS,
        }
    }

    /// How many times each removal is tried before `clear` gives up on it.
    pub fn with_remove_attempts(mut self, attempts: u32) -> Self {
        self.remove_attempts = attempts.max(1);
        self
    }

    pub async fn load(&self) -> Result<Option<Credential>, StoreError> {
        if let Some(raw) = self.kv.get(CREDENTIAL_KEY).await? {
            let record: CredentialRecord = serde_json::from_str(&raw)?;
            return Ok(Some(record.credential));
        }
        self.load_legacy().await
    }

    /// Replace the stored credential in a single write.
    pub async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let record = CredentialRecord {
            version: RECORD_VERSION,
            credential: credential.clone(),
            saved_at: Utc::now(),
        };
        let serialized = serde_json::to_string(&record)?;
        self.kv.set(CREDENTIAL_KEY, &serialized).await?;
        for key in LEGACY_KEYS {
            if let Err(e) = self.kv.remove(key).await {
                tracing::warn!(key, error = %e, "failed to drop legacy credential key");
            }
        }
        Ok(())
    }

    /// Remove the record and every legacy key.
    ///
    /// All removals are attempted even when one fails; the first failure is
    /// returned.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut first_error = None;
        for key in std::iter::once(CREDENTIAL_KEY).chain(LEGACY_KEYS) {
            if let Err(e) = self.remove_with_retry(key).await {
                tracing::warn!(key, error = %e, "failed to remove credential key");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn remove_with_retry(&self, key: &str) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            match self.kv.remove(key).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= self.remove_attempts => return Err(e),
                Err(e) => {
                    tracing::debug!(key, attempt, error = %e, "retrying credential key removal");
                    attempt += 1;
                }
            }
        }
    }

    async fn load_legacy(&self) -> Result<Option<Credential>, StoreError> {
        let mut values = Vec::with_capacity(LEGACY_KEYS.len());
        for key in LEGACY_KEYS {
            values.push(self.kv.get(key).await?);
        }
        let present = values.iter().filter(|v| v.is_some()).count();
        if present == 0 {
            return Ok(None);
        }
        if present < LEGACY_KEYS.len() {
            tracing::warn!(present, "ignoring partial legacy credential");
            return Ok(None);
        }
        let mut values = values.into_iter().flatten();
        let (Some(access_token), Some(refresh_token), Some(token_type), Some(expires_at)) =
            (values.next(), values.next(), values.next(), values.next())
        else {
            return Ok(None);
        };
        let Some(expires_at) = parse_legacy_timestamp(&expires_at) else {
            tracing::warn!("ignoring legacy credential with unreadable expires_at");
            return Ok(None);
        };
        Ok(Some(Credential {
            access_token,
            refresh_token,
            token_type,
            expires_at,
        }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialRecord {
    version: u32,
    credential: Credential,
    saved_at: DateTime<Utc>,
}

/// Legacy expiry values are RFC 3339 strings (possibly JSON-quoted) or epoch millis.
fn parse_legacy_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim().trim_matches('"');
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    let millis: i64 = trimmed.parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

fn default_store_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".keyturn"))
        .unwrap_or_else(|| PathBuf::from(".keyturn"))
}

fn normalize_key(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "default".to_string();
    }
    let mut out = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() || lower == '-' || lower == '_' {
            out.push(lower);
        } else {
            out.push('-');
        }
    }
    out
}
