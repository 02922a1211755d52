//! Session manager driving the authorization-code flow for one credential.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;

use super::credential::{Credential, TokenResponse};
use super::error::AuthError;
use super::store::{CredentialStore, KeyValueStore};
use super::transport::{HttpTransport, ReqwestTransport, TransportError};
use super::ui::{
    AuthorizationUi, ConsoleBrowser, FallbackBrowser, NoAuthorizationUi, PresentOptions, UiEvent,
};
use crate::config::AuthConfig;

const CHANNEL_CAPACITY: usize = 16;

/// Which presentation path [`SessionManager::login`] took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The in-app authorization UI is showing the page.
    Presented,
    /// The UI was unavailable; the fallback browser was used.
    Fallback,
    /// Nothing was shown. The reason was also published as [`UiEvent::Failed`].
    Failed { reason: String },
}

/// Position in the credential lifecycle, computed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    AwaitingCode,
    Authenticated,
    Expired,
}

/// Owns the OAuth2 state machine for a single authorization server.
///
/// Exchange, refresh and logout are serialized: a call made while another is
/// running waits for it to finish.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use keyturn::auth::{MemoryKeyValueStore, SessionManager};
/// use keyturn::config::AuthConfig;
///
/// # async fn example() -> Result<(), keyturn::auth::AuthError> {
/// let config = AuthConfig::new("auth.example", "client", "secret", "com.example.app");
/// let session = SessionManager::new(config, Arc::new(MemoryKeyValueStore::new()));
/// let mut tokens = session.token_changes();
///
/// session.login().await;
/// // ... the redirect delivers `code` to the app ...
/// let credential = session.exchange_code("code-from-redirect").await?;
/// assert_eq!(tokens.recv().await.ok(), Some(credential.access_token));
/// # Ok(())
/// # }
/// ```
pub struct SessionManager {
    config: AuthConfig,
    store: CredentialStore,
    transport: Arc<dyn HttpTransport>,
    ui: Arc<dyn AuthorizationUi>,
    fallback: Arc<dyn FallbackBrowser>,
    tokens: broadcast::Sender<String>,
    ui_events: broadcast::Sender<UiEvent>,
    operation: Mutex<()>,
    awaiting_code: Arc<AtomicBool>,
}

impl SessionManager {
    pub fn new(config: AuthConfig, kv: Arc<dyn KeyValueStore>) -> Self {
        let transport = match config.http_timeout() {
            Some(timeout) => ReqwestTransport::with_timeout(timeout).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default HTTP client");
                ReqwestTransport::new()
            }),
            None => ReqwestTransport::new(),
        };
        let mut store = CredentialStore::new(kv);
        if let Some(attempts) = config.logout_attempts {
            store = store.with_remove_attempts(attempts);
        }
        let (tokens, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (ui_events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            config,
            store,
            transport: Arc::new(transport),
            ui: Arc::new(NoAuthorizationUi),
            fallback: Arc::new(ConsoleBrowser),
            tokens,
            ui_events,
            operation: Mutex::new(()),
            awaiting_code: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_authorization_ui(mut self, ui: Arc<dyn AuthorizationUi>) -> Self {
        self.ui = ui;
        self
    }

    pub fn with_fallback_browser(mut self, fallback: Arc<dyn FallbackBrowser>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_credential_store(mut self, store: CredentialStore) -> Self {
        self.store = store;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn credential_store(&self) -> &CredentialStore {
        &self.store
    }

    /// Show the authorization page to the user.
    ///
    /// Never fails: problems are logged and published on [`Self::ui_events`].
    /// Stored credentials are not touched.
    pub async fn login(&self) -> LoginOutcome {
        let url = self.config.authorize_url();
        tracing::debug!(endpoint = %self.config.authorization_endpoint(), "starting login");

        let available = match self.ui.is_available().await {
            Ok(available) => available,
            Err(e) => {
                return self.login_failed(format!("availability check failed: {e}"));
            }
        };

        if !available {
            tracing::debug!("authorization UI unavailable, using fallback browser");
            return match self.fallback.open(&url).await {
                Ok(()) => {
                    self.awaiting_code.store(true, Ordering::SeqCst);
                    LoginOutcome::Fallback
                }
                Err(e) => self.login_failed(format!("fallback browser failed: {e}")),
            };
        }

        match self.ui.show(PresentOptions::for_login(url)).await {
            Ok(mut events) => {
                self.awaiting_code.store(true, Ordering::SeqCst);
                let sender = self.ui_events.clone();
                let awaiting_code = Arc::clone(&self.awaiting_code);
                tokio::spawn(async move {
                    while let Some(item) = events.next().await {
                        let event = match item {
                            Ok(event) => {
                                tracing::debug!(?event, "authorization UI event");
                                event
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "authorization UI error");
                                UiEvent::Failed {
                                    message: e.to_string(),
                                }
                            }
                        };
                        // Dismissed without a code reaching us.
                        if matches!(event, UiEvent::Closed | UiEvent::Failed { .. }) {
                            awaiting_code.store(false, Ordering::SeqCst);
                        }
                        let _ = sender.send(event);
                    }
                });
                LoginOutcome::Presented
            }
            Err(e) => self.login_failed(format!("presentation failed: {e}")),
        }
    }

    /// Trade an authorization code for a credential, store it and announce it.
    ///
    /// On failure nothing is stored and nothing is announced.
    pub async fn exchange_code(&self, code: &str) -> Result<Credential, AuthError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::InvalidCode);
        }
        let _guard = self.operation.lock().await;
        let redirect_uri = self.config.callback_url();
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        match self.request_credential(&params, None).await {
            Ok(credential) => {
                tracing::info!(expires_at = %credential.expires_at, "authorization code exchanged");
                Ok(credential)
            }
            Err(e) => {
                tracing::warn!(error = %e, "authorization code exchange failed");
                Err(e)
            }
        }
    }

    /// Obtain a new access token with the stored refresh token.
    ///
    /// On failure the stored credential is left as it was.
    pub async fn refresh(&self) -> Result<Credential, AuthError> {
        let _guard = self.operation.lock().await;
        let current = self.store.load().await?.ok_or(AuthError::NotLoggedIn)?;
        self.refresh_locked(current).await
    }

    /// Caller must hold `self.operation`.
    async fn refresh_locked(&self, current: Credential) -> Result<Credential, AuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", current.refresh_token.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        match self
            .request_credential(&params, Some(current.refresh_token.as_str()))
            .await
        {
            Ok(credential) => {
                tracing::info!(expires_at = %credential.expires_at, "access token refreshed");
                Ok(credential)
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed");
                Err(e)
            }
        }
    }

    /// `true` iff a credential is stored and has not yet expired.
    pub async fn is_authenticated(&self) -> bool {
        self.is_authenticated_at(Utc::now()).await
    }

    pub async fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        match self.store.load().await {
            Ok(Some(credential)) => credential.is_valid_at(now),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read credential");
                false
            }
        }
    }

    /// Revoke (when configured) and remove the stored credential.
    ///
    /// Resolves `true` once every key is gone, including when nothing was
    /// stored. Subscribers to [`Self::token_changes`] are not notified.
    pub async fn logout(&self) -> bool {
        let _guard = self.operation.lock().await;
        self.awaiting_code.store(false, Ordering::SeqCst);
        if self.config.revoke_on_logout {
            match self.store.load().await {
                Ok(Some(credential)) => self.revoke(&credential).await,
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "skipping revocation, credential unreadable"),
            }
        }
        match self.store.clear().await {
            Ok(()) => {
                tracing::info!("credential cleared");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "credential only partially cleared");
                false
            }
        }
    }

    /// Subscribe to access tokens issued from now on.
    ///
    /// Dropping the receiver unsubscribes.
    pub fn token_changes(&self) -> broadcast::Receiver<String> {
        self.tokens.subscribe()
    }

    /// [`Self::token_changes`] as a stream; tokens missed by a slow consumer are skipped.
    pub fn token_stream(&self) -> impl Stream<Item = String> + Send + 'static {
        BroadcastStream::new(self.tokens.subscribe())
            .filter_map(|item| futures::future::ready(item.ok()))
    }

    pub fn ui_events(&self) -> broadcast::Receiver<UiEvent> {
        self.ui_events.subscribe()
    }

    pub async fn current_credential(&self) -> Result<Option<Credential>, AuthError> {
        Ok(self.store.load().await?)
    }

    pub async fn phase(&self) -> SessionPhase {
        self.phase_at(Utc::now()).await
    }

    pub async fn phase_at(&self, now: DateTime<Utc>) -> SessionPhase {
        if self.awaiting_code.load(Ordering::SeqCst) {
            return SessionPhase::AwaitingCode;
        }
        match self.store.load().await {
            Ok(Some(credential)) if credential.is_valid_at(now) => SessionPhase::Authenticated,
            Ok(Some(_)) => SessionPhase::Expired,
            Ok(None) => SessionPhase::Unauthenticated,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read credential");
                SessionPhase::Unauthenticated
            }
        }
    }

    /// A usable access token, refreshing once if the stored one has expired.
    ///
    /// Concurrent callers share a single refresh.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let credential = self.store.load().await?.ok_or(AuthError::NotLoggedIn)?;
        if credential.is_valid() {
            return Ok(credential.access_token);
        }
        let _guard = self.operation.lock().await;
        // Another caller may have refreshed while we waited.
        let credential = self.store.load().await?.ok_or(AuthError::NotLoggedIn)?;
        if credential.is_valid() {
            return Ok(credential.access_token);
        }
        tracing::debug!("stored access token expired, refreshing");
        Ok(self.refresh_locked(credential).await?.access_token)
    }

    async fn request_credential(
        &self,
        params: &[(&str, &str)],
        previous_refresh_token: Option<&str>,
    ) -> Result<Credential, AuthError> {
        let body = self
            .transport
            .post_form(&self.config.token_endpoint(), params)
            .await?;
        let completed_at = Utc::now();
        let response = TokenResponse::from_json(body)?;
        let credential = Credential::from_response(response, previous_refresh_token, completed_at)?;
        self.store.save(&credential).await?;
        self.awaiting_code.store(false, Ordering::SeqCst);
        let receivers = self.tokens.send(credential.access_token.clone()).unwrap_or(0);
        tracing::debug!(receivers, "published access token");
        Ok(credential)
    }

    async fn revoke(&self, credential: &Credential) {
        let params = [
            ("token", credential.access_token.as_str()),
            ("token_type_hint", "access_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        match self
            .transport
            .post_form(&self.config.revoke_endpoint(), &params)
            .await
        {
            // Revocation endpoints may answer 2xx with a non-JSON body.
            Ok(_) | Err(TransportError::Decode(_)) => tracing::debug!("access token revoked"),
            Err(e) => tracing::warn!(error = %e, "token revocation failed"),
        }
    }

    fn login_failed(&self, reason: String) -> LoginOutcome {
        tracing::warn!(%reason, "login could not present authorization page");
        let _ = self.ui_events.send(UiEvent::Failed {
            message: reason.clone(),
        });
        LoginOutcome::Failed { reason }
    }
}
