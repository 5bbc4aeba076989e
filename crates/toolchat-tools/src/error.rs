//! Tool provider error types.

/// Errors raised while resolving tool providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// No provider is registered under this name.
    #[error("unknown tool provider `{name}` (available: {available})")]
    UnknownProvider { name: String, available: String },

    /// The resolved tools could not be combined into one registry.
    #[error(transparent)]
    Registry(#[from] toolchat_agent::AgentError),
}

/// Convenience alias used throughout the tools crate.
pub type Result<T> = std::result::Result<T, ProviderError>;
