//! Mini App CLI - database migrations and account administration.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! miniapp-cli migrate
//!
//! # Grant a role (revokes existing sessions)
//! miniapp-cli account promote 123456789 platform-manager
//!
//! # Force logout
//! miniapp-cli account revoke 123456789
//!
//! # Soft-delete
//! miniapp-cli account delete 123456789
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use miniapp_core::ExternalId;

mod commands;

#[derive(Parser)]
#[command(name = "miniapp-cli")]
#[command(author, version, about = "Mini App identity gateway CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage accounts
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Set an account's role
    Promote {
        /// Chat-platform user ID
        external_id: ExternalId,

        /// Role (`root-admin`, `platform-manager`, `platform-support`,
        /// `merchant-owner`, `end-user`)
        role: String,
    },
    /// Revoke all of an account's sessions
    Revoke {
        /// Chat-platform user ID
        external_id: ExternalId,
    },
    /// Soft-delete an account
    Delete {
        /// Chat-platform user ID
        external_id: ExternalId,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Account { action } => match action {
            AccountAction::Promote { external_id, role } => {
                commands::account::promote(external_id, &role).await?;
            }
            AccountAction::Revoke { external_id } => {
                commands::account::revoke(external_id).await?;
            }
            AccountAction::Delete { external_id } => {
                commands::account::delete(external_id).await?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_promote() {
        let cli = Cli::try_parse_from(["miniapp-cli", "account", "promote", "42", "root-admin"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Account {
                action: AccountAction::Promote { external_id, .. }
            }) if external_id == ExternalId::new(42)
        ));
    }

    #[test]
    fn test_non_numeric_external_id_rejected() {
        assert!(Cli::try_parse_from(["miniapp-cli", "account", "revoke", "bob"]).is_err());
    }
}
