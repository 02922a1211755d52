//! Keyturn: client-side OAuth2 authorization-code credential manager.
//!
//! Drives the user-facing authorization step, exchanges the returned code for
//! tokens, persists the resulting credential, refreshes it, broadcasts new
//! access tokens, and revokes/clears it on logout.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use keyturn::auth::{FileKeyValueStore, SessionManager};
//! use keyturn::config::AuthConfig;
//!
//! # async fn example() -> keyturn::error::Result<()> {
//! let config = AuthConfig::from_env()?;
//! let session = SessionManager::new(config, Arc::new(FileKeyValueStore::new_default()));
//! if !session.is_authenticated().await {
//!     session.login().await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;

#[cfg(feature = "cli")]
pub mod cli;
