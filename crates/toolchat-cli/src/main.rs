//! CLI entry point for toolchat.
//!
//! This binary provides the `toolchat` command with subcommands for
//! chatting, asking a single question, and managing client configurations.

mod catalog;
mod cli;
mod clients;
mod config;
mod helpers;
mod repl;

use anyhow::Result;
use clap::Parser;

use crate::cli::{ClientAction, Cli, Commands};
use crate::config::ConfigStore;
use crate::helpers::init_tracing;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore errors if missing).
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing("warn");

    let store = ConfigStore::from_env()?;
    tracing::debug!(path = %store.path().display(), "using configuration file");

    match cli.command {
        Commands::Chat { session } => repl::cmd_chat(&store, &session).await,
        Commands::Ask { session, prompt } => repl::cmd_ask(&store, &session, &prompt).await,
        Commands::Clients { action } => match action {
            ClientAction::List { json } => clients::cmd_list(&store, json),
            ClientAction::Create {
                name,
                client_type,
                options,
            } => clients::cmd_create(&store, &name, &client_type, options.as_deref()),
            ClientAction::Destroy { name } => clients::cmd_destroy(&store, &name),
        },
    }
}
