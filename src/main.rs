//! Keyturn CLI binary entry point.

use clap::Parser;
use keyturn::cli::{auth, AuthCommands, Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("KEYTURN_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> keyturn::error::Result<()> {
    let session = auth::build_session(cli.config.as_deref())?;
    match cli.command {
        Commands::Auth(auth_args) => match auth_args.command {
            AuthCommands::Login => auth::handle_login(&session).await,
            AuthCommands::Exchange(args) => auth::handle_exchange(&session, &args.code).await,
            AuthCommands::Refresh => auth::handle_refresh(&session).await,
            AuthCommands::Status => auth::handle_status(&session).await,
            AuthCommands::Logout => auth::handle_logout(&session).await,
        },
    }
}
