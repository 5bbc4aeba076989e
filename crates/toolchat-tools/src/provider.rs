//! Named tool providers.
//!
//! A provider is a named bundle of tools.  Sessions pick providers by name
//! and the resolved tools are flattened into one [`ToolRegistry`].

use std::path::Path;
use std::sync::Arc;

use toolchat_agent::{Tool, ToolRegistry};

use crate::error::{ProviderError, Result};
use crate::ls::LsTool;
use crate::shell::BashTool;

/// Prefix users may put in front of a provider name.
const NAME_PREFIX: &str = "toolchat-";

/// Providers enabled when the user does not choose any.
pub const DEFAULT_PROVIDERS: &[&str] = &["yolo-bash", "ls"];

/// A named source of tools.
pub trait ToolProvider: Send + Sync {
    /// Unique provider name.
    fn name(&self) -> &'static str;

    /// One-line summary for listings.
    fn description(&self) -> &'static str;

    /// Instantiate the provider's tools for `working_dir`.
    fn tools(&self, working_dir: &Path) -> Vec<Arc<dyn Tool>>;
}

struct YoloBash;

impl ToolProvider for YoloBash {
    fn name(&self) -> &'static str {
        "yolo-bash"
    }

    fn description(&self) -> &'static str {
        "Unsandboxed `bash` tool"
    }

    fn tools(&self, working_dir: &Path) -> Vec<Arc<dyn Tool>> {
        vec![Arc::new(BashTool::new(working_dir))]
    }
}

struct Ls;

impl ToolProvider for Ls {
    fn name(&self) -> &'static str {
        "ls"
    }

    fn description(&self) -> &'static str {
        "Directory listing tool"
    }

    fn tools(&self, working_dir: &Path) -> Vec<Arc<dyn Tool>> {
        vec![Arc::new(LsTool::new(working_dir))]
    }
}

/// Every built-in provider, in listing order.
pub fn builtin_providers() -> Vec<Box<dyn ToolProvider>> {
    vec![Box::new(YoloBash), Box::new(Ls)]
}

/// Look up a provider by name, with or without the `toolchat-` prefix.
pub fn find_provider(name: &str) -> Option<Box<dyn ToolProvider>> {
    let bare = name.strip_prefix(NAME_PREFIX).unwrap_or(name);
    builtin_providers().into_iter().find(|p| p.name() == bare)
}

/// Resolve provider names into a flat tool list, in the order given.
pub fn resolve_tools<S: AsRef<str>>(names: &[S], working_dir: &Path) -> Result<Vec<Arc<dyn Tool>>> {
    let mut tools = Vec::new();
    for name in names {
        let name = name.as_ref();
        let provider = find_provider(name).ok_or_else(|| ProviderError::UnknownProvider {
            name: name.to_owned(),
            available: builtin_providers()
                .iter()
                .map(|p| p.name())
                .collect::<Vec<_>>()
                .join(", "),
        })?;
        tracing::debug!(provider = provider.name(), "resolving tool provider");
        tools.extend(provider.tools(working_dir));
    }
    Ok(tools)
}

/// Resolve provider names straight into a registry.
///
/// Fails when two providers contribute a tool with the same name.
pub fn build_registry<S: AsRef<str>>(names: &[S], working_dir: &Path) -> Result<ToolRegistry> {
    let tools = resolve_tools(names, working_dir)?;
    Ok(ToolRegistry::new(tools)?)
}
