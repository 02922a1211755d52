//! Authorization UI capability: shows the authorize URL to the user.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UiError {
    #[error("Authorization UI unavailable: {0}")]
    Unavailable(String),
    #[error("Authorization UI failed: {0}")]
    Presentation(String),
}

/// Lifecycle notifications from the authorization UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UiEvent {
    Opened,
    Loaded,
    Closed,
    /// Availability check or presentation raised an error.
    Failed { message: String },
}

/// How the authorization page is presented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentOptions {
    pub url: String,
    pub hidden: bool,
    pub animated: bool,
    pub transition: String,
    pub reader_mode: bool,
    pub tint_color: String,
}

impl PresentOptions {
    /// Fixed presentation used for login: visible, not animated, reader mode hinted.
    pub fn for_login(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            hidden: false,
            animated: false,
            transition: "curl".to_string(),
            reader_mode: true,
            tint_color: "#ff0000".to_string(),
        }
    }
}

/// In-app browser able to present the authorization page.
#[async_trait]
pub trait AuthorizationUi: Send + Sync {
    async fn is_available(&self) -> Result<bool, UiError>;

    /// Present the page; the returned stream ends when the UI is dismissed.
    async fn show(
        &self,
        options: PresentOptions,
    ) -> Result<BoxStream<'static, Result<UiEvent, UiError>>, UiError>;
}

/// Presentation used when no [`AuthorizationUi`] is available.
#[async_trait]
pub trait FallbackBrowser: Send + Sync {
    async fn open(&self, url: &str) -> Result<(), UiError>;
}

/// [`AuthorizationUi`] that is never available, forcing the fallback path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthorizationUi;

#[async_trait]
impl AuthorizationUi for NoAuthorizationUi {
    async fn is_available(&self) -> Result<bool, UiError> {
        Ok(false)
    }

    async fn show(
        &self,
        _options: PresentOptions,
    ) -> Result<BoxStream<'static, Result<UiEvent, UiError>>, UiError> {
        Err(UiError::Unavailable(
            "no in-app authorization UI on this platform".to_string(),
        ))
    }
}

/// Fallback that asks the user to open the URL themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleBrowser;

#[async_trait]
impl FallbackBrowser for ConsoleBrowser {
    async fn open(&self, url: &str) -> Result<(), UiError> {
        eprintln!("🔗 Visit: {url}");
        eprintln!("📋 After authorizing, run `keyturn auth exchange <CODE>` with the returned code.");
        Ok(())
    }
}
