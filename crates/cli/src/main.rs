//! Threadline operator CLI.
//!
//! ```bash
//! threadline-cli migrate
//! threadline-cli admin grant shopper@example.com
//! threadline-cli admin revoke shopper@example.com
//! threadline-cli payments orphans
//! ```
//!
//! Every command reads `STOREFRONT_DATABASE_URL` (or `DATABASE_URL`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

use threadline_core::{Email, UserRole};

mod commands;

#[derive(Parser)]
#[command(name = "threadline-cli")]
#[command(author, version, about = "Threadline operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending storefront migrations
    Migrate,
    /// Change the role of an existing account
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Payment reconciliation
    Payments {
        #[command(subcommand)]
        action: PaymentsAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Give the account the admin role
    Grant { email: Email },
    /// Put the account back on the customer role
    Revoke { email: Email },
}

impl AdminAction {
    fn into_parts(self) -> (Email, UserRole) {
        match self {
            Self::Grant { email } => (email, UserRole::Admin),
            Self::Revoke { email } => (email, UserRole::Customer),
        }
    }
}

#[derive(Subcommand)]
enum PaymentsAction {
    /// List captured payments that never became orders
    Orphans,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Admin { action } => {
            let (email, role) = action.into_parts();
            commands::admin::set_role(&email, role).await?;
        }
        Commands::Payments {
            action: PaymentsAction::Orphans,
        } => commands::payments::orphans().await?,
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_grant_normalizes_email() {
        let cli = Cli::try_parse_from(["threadline-cli", "admin", "grant", "Ops@Example.com"])
            .unwrap();
        let Commands::Admin { action } = cli.command else {
            panic!("expected admin command");
        };
        let (email, role) = action.into_parts();
        assert_eq!(email.as_str(), "ops@example.com");
        assert_eq!(role, UserRole::Admin);
    }

    #[test]
    fn test_invalid_email_is_a_usage_error() {
        assert!(Cli::try_parse_from(["threadline-cli", "admin", "revoke", "nobody"]).is_err());
    }
}
