//! CLI entry point for keyturn.

pub mod auth;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Keyturn CLI
#[derive(Parser, Debug)]
#[command(name = "keyturn", version, about = "Keyturn: OAuth2 credential manager CLI")]
pub struct Cli {
    /// TOML config file (defaults to KEYTURN_* environment variables)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Credential management
    Auth(AuthArgs),
}

/// Arguments for the `auth` subcommand group.
#[derive(Parser, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

/// Auth subcommands.
#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Open the authorization page
    Login,
    /// Exchange an authorization code for tokens
    Exchange(ExchangeArgs),
    /// Refresh the stored access token
    Refresh,
    /// Show authentication status
    Status,
    /// Revoke (if configured) and remove stored tokens
    Logout,
}

/// Arguments for `keyturn auth exchange`.
#[derive(Parser, Debug)]
pub struct ExchangeArgs {
    /// Authorization code from the redirect
    pub code: String,
}
