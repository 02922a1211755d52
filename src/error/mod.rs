//! Error types for keyturn.

use thiserror::Error;

use crate::auth::AuthError;

/// Primary error type for configuration and CLI-level operations.
#[derive(Error, Debug)]
pub enum KeyturnError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Network,
    Server,
    Storage,
    Configuration,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Run the login flow again.
    Reauthenticate,
    RetryLater,
    CheckConfiguration,
    CheckStorage,
    ContactSupport,
}

impl KeyturnError {
    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::Toml(_) => ErrorCategory::Configuration,
            Self::Io(_) => ErrorCategory::Storage,
            Self::Auth(auth) => match auth {
                AuthError::NotLoggedIn
                | AuthError::InvalidCode
                | AuthError::ExpiredOrInvalidGrant => ErrorCategory::Authentication,
                AuthError::Rejected { status, .. } => match status {
                    400 | 401 | 403 => ErrorCategory::Authentication,
                    500..=599 => ErrorCategory::Server,
                    _ => ErrorCategory::Unknown,
                },
                AuthError::Network(_) => ErrorCategory::Network,
                AuthError::InvalidResponse(_) => ErrorCategory::Server,
                AuthError::Storage(_) => ErrorCategory::Storage,
            },
        }
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::Reauthenticate,
            ErrorCategory::Network | ErrorCategory::Server => RecoverySuggestion::RetryLater,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Storage => RecoverySuggestion::CheckStorage,
            ErrorCategory::Unknown => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, KeyturnError>;
