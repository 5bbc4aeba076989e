//! CLI argument definitions for toolchat.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use clap::{Parser, Subcommand};

/// toolchat -- chat with a model that can run tools on your machine.
#[derive(Parser)]
#[command(
    name = "toolchat",
    version,
    about = "toolchat -- streaming tool-calling chat in the terminal",
    long_about = "Chat with OpenAI, Anthropic or Gemini models that can call local tools \
                  (shell, ls) while they answer."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat session.
    Chat {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Send a single prompt and print the answer.
    Ask {
        #[command(flatten)]
        session: SessionArgs,

        /// The prompt to send.
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },

    /// Manage configured clients.
    Clients {
        #[command(subcommand)]
        action: ClientAction,
    },
}

/// Options shared by every command that opens a session.
#[derive(clap::Args, Debug, Clone)]
pub struct SessionArgs {
    /// Configured client to use (defaults to the first one, alphabetically).
    #[arg(long, short)]
    pub client: Option<String>,

    /// Replace the default system prompt.
    #[arg(long, short)]
    pub system: Option<String>,

    /// Maximum model rounds per message.
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Tool providers to enable (comma-separated).
    #[arg(long, value_delimiter = ',', default_values_t = default_tool_providers())]
    pub tools: Vec<String>,
}

fn default_tool_providers() -> Vec<String> {
    toolchat_tools::DEFAULT_PROVIDERS
        .iter()
        .map(|p| (*p).to_owned())
        .collect()
}

/// Actions for managing client configurations.
#[derive(Subcommand)]
pub enum ClientAction {
    /// List configured clients.
    List {
        /// Print machine-readable JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Create a new client configuration.
    Create {
        /// Name of the client.
        name: String,
        /// Type of the client (plugin:type).
        #[arg(long = "type", short = 't')]
        client_type: String,
        /// Client options (JSON).
        #[arg(long, short)]
        options: Option<String>,
    },
    /// Destroy a client configuration.
    Destroy {
        /// Name of the client to destroy.
        name: String,
    },
}
