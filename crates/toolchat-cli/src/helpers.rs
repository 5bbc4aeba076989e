//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, the default system prompt, and option
//! redaction for display.

use std::path::Path;

use serde_json::Value;
use toolchat_agent::ClientOptions;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// Logs go to stderr so they never interleave with streamed answers on
/// stdout.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// System prompt
// ---------------------------------------------------------------------------

/// The system prompt used when `--system` is not given.
pub fn default_system_prompt(working_dir: &Path, tool_names: &[&str]) -> String {
    let now = chrono::Local::now();
    let tools = if tool_names.is_empty() {
        "none".to_owned()
    } else {
        tool_names.join(", ")
    };
    format!(
        "You are a helpful assistant running in the user's terminal. \
         Use the available tools when they help answer the question, and keep answers concise.\n\n\
         ## Environment\n\n\
         Working directory: {}\n\
         Tools: {tools}\n\
         Current date & time: {}\n",
        working_dir.display(),
        now.format("%Y-%m-%d %H:%M:%S %Z (%A)")
    )
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// Client options as JSON, with the API key masked.
pub fn redacted_options(options: &ClientOptions) -> Value {
    let mut value = serde_json::to_value(options).unwrap_or(Value::Null);
    if let Some(key) = value.get_mut("api_key") {
        *key = Value::String("<redacted>".into());
    }
    value
}
