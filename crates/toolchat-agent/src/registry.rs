//! Tool contract and registry.
//!
//! Tools are offered to the model as [`ToolDescriptor`]s and invoked by name
//! with the argument text the model streamed.  The registry owns name
//! resolution and argument parsing so that every failure mode ends up as a
//! [`ToolExecutionError`] the session can turn into a tool-result item.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AgentError, Result, ToolError, ToolExecutionError};
use crate::llm::types::{ToolDescriptor, parse_arguments_text};

// ---------------------------------------------------------------------------
// Tool trait
// ---------------------------------------------------------------------------

/// A capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name, as the model will call it.
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema of the accepted arguments.
    fn parameters(&self) -> Value;

    /// Run the tool with parsed arguments, returning the text fed back to the
    /// model.
    async fn run(&self, arguments: Value) -> std::result::Result<String, ToolError>;

    /// The descriptor advertised to the model.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            parameters: self.parameters(),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Name-indexed collection of tools, in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// Build a registry, rejecting duplicate names.
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(tools.len());
        for (position, tool) in tools.iter().enumerate() {
            if by_name.insert(tool.name().to_owned(), position).is_some() {
                return Err(AgentError::DuplicateTool {
                    name: tool.name().to_owned(),
                });
            }
        }
        Ok(Self { tools, by_name })
    }

    /// A registry with no tools.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    /// Descriptors for every registered tool, in registration order.
    pub fn describe(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    /// Resolve `name`, parse `arguments_text` and run the tool.
    pub async fn invoke(
        &self,
        name: &str,
        arguments_text: &str,
    ) -> std::result::Result<String, ToolExecutionError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolExecutionError::UnknownTool {
                name: name.to_owned(),
            })?;

        let arguments =
            parse_arguments_text(arguments_text).map_err(|e| ToolExecutionError::InvalidArguments {
                tool: name.to_owned(),
                reason: e.to_string(),
            })?;

        tracing::debug!(tool = %name, "executing tool");

        tool.run(arguments)
            .await
            .map_err(|source| ToolExecutionError::Failed {
                tool: name.to_owned(),
                source,
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
