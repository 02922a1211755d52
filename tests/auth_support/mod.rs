#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keyturn::auth::{
    FallbackBrowser, HttpTransport, KeyValueStore, MemoryKeyValueStore, SessionManager, StoreError,
    TransportError, UiError,
};
use keyturn::config::AuthConfig;
use serde_json::json;
use wiremock::MockServer;

/// In-memory store whose removals can be made to fail a set number of times.
#[derive(Default)]
pub struct FlakyKeyValueStore {
    values: Mutex<HashMap<String, String>>,
    remove_failures: Mutex<HashMap<String, usize>>,
}

impl FlakyKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_removes(&self, key: &str, times: usize) {
        self.remove_failures
            .lock()
            .expect("store lock poisoned")
            .insert(key.to_string(), times);
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.values.lock().expect("store lock poisoned").clone()
    }
}

#[async_trait]
impl KeyValueStore for FlakyKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .values
            .lock()
            .expect("store lock poisoned")
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .expect("store lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        {
            let mut failures = self.remove_failures.lock().expect("store lock poisoned");
            if let Some(left) = failures.get_mut(key) {
                if *left > 0 {
                    *left -= 1;
                    return Err(StoreError::Unavailable(format!("cannot remove {key}")));
                }
            }
        }
        self.values
            .lock()
            .expect("store lock poisoned")
            .remove(key);
        Ok(())
    }
}

/// Transport that answers after a delay and records peak concurrency.
pub struct SlowTransport {
    delay: Duration,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl SlowTransport {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HttpTransport for SlowTransport {
    async fn post_form(
        &self,
        _url: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let code = params
            .iter()
            .find(|(k, _)| *k == "code")
            .map(|(_, v)| v.to_string())
            .unwrap_or_default();
        Ok(token_body(&format!("acc-{code}-{call}"), "ref", 3600))
    }
}

/// Fallback browser that only records the URLs it was asked to open.
#[derive(Default)]
pub struct SilentBrowser {
    pub opened: Mutex<Vec<String>>,
}

#[async_trait]
impl FallbackBrowser for SilentBrowser {
    async fn open(&self, url: &str) -> Result<(), UiError> {
        self.opened
            .lock()
            .expect("browser lock poisoned")
            .push(url.to_string());
        Ok(())
    }
}

pub fn token_body(access_token: &str, refresh_token: &str, expires_in: i64) -> serde_json::Value {
    json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "token_type": "bearer",
        "expires_in": expires_in,
    })
}

pub fn config_for(server: &MockServer) -> AuthConfig {
    AuthConfig::new("auth.example", "client-1", "s3cret", "com.example.app")
        .with_token_endpoint(format!("{}/token", server.uri()))
        .with_revoke_endpoint(format!("{}/token/revoke", server.uri()))
}

pub fn session_for(server: &MockServer) -> (Arc<MemoryKeyValueStore>, SessionManager) {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let session = SessionManager::new(config_for(server), kv.clone());
    (kv, session)
}
