//! Built-in tools for toolchat -- shell execution and directory listing.
//!
//! Each tool implements [`toolchat_agent::Tool`].  Tools are grouped into
//! named providers (see [`provider`]) that the CLI resolves into a session's
//! tool registry.

pub mod error;
pub mod ls;
pub mod provider;
pub mod shell;

pub use error::{ProviderError, Result};
pub use ls::LsTool;
pub use provider::{
    DEFAULT_PROVIDERS, ToolProvider, build_registry, builtin_providers, find_provider,
    resolve_tools,
};
pub use shell::BashTool;
