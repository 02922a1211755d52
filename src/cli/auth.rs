//! CLI auth command handlers.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use crate::auth::{FileKeyValueStore, LoginOutcome, SessionManager, SessionPhase};
use crate::config::AuthConfig;
use crate::error::Result;

/// Build a session from `--config` or the environment, persisting under the store dir.
pub fn build_session(config_path: Option<&Path>) -> Result<SessionManager> {
    let config = match config_path {
        Some(path) => AuthConfig::load(path)?,
        None => AuthConfig::from_env()?,
    };
    let kv = match &config.store_dir {
        Some(dir) => FileKeyValueStore::new(dir),
        None => FileKeyValueStore::new_default(),
    };
    tracing::debug!(store = %kv.base_dir().display(), "using credential store");
    Ok(SessionManager::new(config, Arc::new(kv)))
}

/// Handle `keyturn auth login`.
pub async fn handle_login(session: &SessionManager) -> Result<()> {
    match session.login().await {
        LoginOutcome::Presented | LoginOutcome::Fallback => Ok(()),
        LoginOutcome::Failed { reason } => {
            eprintln!("❌ Could not open the authorization page: {reason}");
            std::process::exit(1);
        }
    }
}

/// Handle `keyturn auth exchange <code>`.
pub async fn handle_exchange(session: &SessionManager, code: &str) -> Result<()> {
    let credential = session.exchange_code(code).await?;
    println!(
        "✅ Logged in (expires {})",
        credential.expires_at.format("%Y-%m-%d %H:%M")
    );
    Ok(())
}

/// Handle `keyturn auth refresh`.
pub async fn handle_refresh(session: &SessionManager) -> Result<()> {
    let credential = session.refresh().await?;
    println!(
        "✅ Token refreshed (expires {})",
        credential.expires_at.format("%Y-%m-%d %H:%M")
    );
    Ok(())
}

/// Handle `keyturn auth status`.
pub async fn handle_status(session: &SessionManager) -> Result<()> {
    println!("🔐 Authentication Status\n");
    println!("  Server: {}", session.config().domain);
    let credential = session.current_credential().await?;
    let status = match (session.phase().await, credential) {
        (SessionPhase::Authenticated, Some(credential)) => format!(
            "✅ Logged in ({} min left, expires {})",
            credential.remaining_at(Utc::now()).num_minutes(),
            credential.expires_at.format("%Y-%m-%d %H:%M")
        ),
        (SessionPhase::Expired, _) => "⚠️  Token expired (run `keyturn auth refresh`)".to_string(),
        _ => "❌ Not logged in".to_string(),
    };
    println!("  Status: {status}");
    Ok(())
}

/// Handle `keyturn auth logout`.
pub async fn handle_logout(session: &SessionManager) -> Result<()> {
    if session.logout().await {
        println!("✅ Logged out");
    } else {
        eprintln!("⚠️  Some stored credential data could not be removed");
        std::process::exit(1);
    }
    Ok(())
}
