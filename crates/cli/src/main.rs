//! Markets CLI - Database migrations and sample data.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! markets-cli migrate
//!
//! # Load sample users, stores and reviews
//! markets-cli seed crates/cli/data/sample.yaml
//!
//! # Wipe existing directory data first
//! markets-cli seed crates/cli/data/sample.yaml --clear
//! ```
//!
//! # Environment Variables
//!
//! - `MARKETS_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "markets-cli")]
#[command(author, version, about = "Markets CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Load sample data from a YAML file
    Seed {
        /// Path to the YAML seed file
        file: String,

        /// Delete all users, stores, reviews and hearts first
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { file, clear } => commands::seed::run(&file, clear).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_seed_flags() {
        let cli = Cli::try_parse_from(["markets-cli", "seed", "data.yaml", "--clear"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Seed { ref file, clear: true }) if file == "data.yaml"
        ));
    }
}
