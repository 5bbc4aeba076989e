//! Core types for LLM interaction.
//!
//! These types model the data flowing between the session loop and vendor
//! adapters.  They are vendor-agnostic at this layer; each adapter translates
//! them into its own wire format and each delta accumulator translates the
//! vendor's stream back into [`StreamEvent`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Conversation items
// ---------------------------------------------------------------------------

/// The role of a participant in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Input from the human user.
    User,
    /// Output from the model.
    Assistant,
    /// Result of a tool invocation, fed back to the model.
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        };
        f.write_str(name)
    }
}

/// A single entry in a conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationItem {
    /// Who produced this item.
    pub role: Role,

    /// The textual content.
    ///
    /// For [`Role::Tool`] items this is the tool output (or an `Error: ...`
    /// line).  For assistant items that only call tools it may be empty.
    #[serde(default)]
    pub content: String,

    /// Tool calls requested by the assistant, in the order the stream
    /// started them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,

    /// The call this item answers (only present when `role == Role::Tool`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ConversationItem {
    /// Create a user item.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create an assistant text item.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create an assistant item that requests tool calls.
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRecord>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Create a tool-result item answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Whether this is an assistant item that requested at least one tool.
    pub fn has_tool_calls(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// One tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Vendor-assigned (or synthesized) call id.
    pub id: String,

    /// Name of the tool to invoke.
    pub name: String,

    /// Raw JSON argument text, exactly as the model streamed it.
    #[serde(default)]
    pub arguments_text: String,

    /// Opaque vendor token that must be sent back with the call
    /// (Gemini `thoughtSignature`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ToolCallRecord {
    /// Create a record with no arguments yet.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments_text: String::new(),
            signature: None,
        }
    }

    /// Create a record with complete argument text.
    pub fn with_arguments(mut self, arguments_text: impl Into<String>) -> Self {
        self.arguments_text = arguments_text.into();
        self
    }

    /// Attach a vendor signature.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Parse the accumulated argument text.
    ///
    /// Blank text is treated as an empty object; some vendors send nothing at
    /// all for tools without parameters.
    pub fn parse_arguments(&self) -> Result<Value, serde_json::Error> {
        parse_arguments_text(&self.arguments_text)
    }
}

/// Parse tool argument text, mapping blank input to `{}`.
pub fn parse_arguments_text(text: &str) -> Result<Value, serde_json::Error> {
    if text.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(text)
}

// ---------------------------------------------------------------------------
// Tool descriptors
// ---------------------------------------------------------------------------

/// A tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description.
    pub description: String,

    /// JSON Schema describing the accepted arguments.
    pub parameters: Value,
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

/// Token accounting reported by the vendor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens consumed.
    pub input_tokens: u32,
    /// Completion tokens generated.
    pub output_tokens: u32,
}

impl Usage {
    /// Accumulate another round's usage into this one.
    pub fn add(&mut self, other: Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// The vendor-independent event vocabulary every accumulator produces.
///
/// For a single tool call index the order is always one `ToolCallStarted`
/// followed by zero or more `ToolCallArgumentFragment`s (and at most one
/// `ToolCallSignature`, from vendors that sign calls).  Exactly one
/// `TurnComplete` ends each successful stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A fragment of assistant text.
    TextFragment(String),

    /// A new tool call with a known id and name.
    ToolCallStarted {
        index: usize,
        id: String,
        name: String,
    },

    /// A piece of the JSON argument text for an already started call.
    ToolCallArgumentFragment { index: usize, fragment: String },

    /// An opaque signature to echo back with an already started call.
    ToolCallSignature { index: usize, signature: String },

    /// The vendor finished the turn.
    TurnComplete { usage: Usage },
}
