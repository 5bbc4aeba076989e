//! Streaming tool-calling conversation runtime for toolchat.
//!
//! This crate turns a user's text into a multi-round exchange with a model
//! vendor: the model streams text and tool calls, the runtime runs the tools
//! and feeds the results back, until the model answers without calling a
//! tool.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌───────────────────┐
//! │   Session    │────>│ VendorAdapter  │────>│ DeltaAccumulator  │
//! │ (turn loop)  │<────│ (HTTP + wire)  │<────│ (SSE -> events)   │
//! └──────┬───────┘     └────────────────┘     └───────────────────┘
//!        │
//!        ├──────> ConversationStore (history + streaming item)
//!        └──────> ToolRegistry (name -> Tool)
//! ```
//!
//! ## Modules
//!
//! - [`llm`] -- Vendor adapters, stream accumulators, and wire types.
//! - [`conversation`] -- The ordered conversation history.
//! - [`registry`] -- The tool contract and name-indexed registry.
//! - [`session`] -- The turn loop, cancellation, and observers.
//! - [`error`] -- Agent error types.

pub mod conversation;
pub mod error;
pub mod llm;
pub mod registry;
pub mod session;

// Re-export the most commonly used types at the crate root.
pub use conversation::{ConversationChange, ConversationStore};
pub use error::{
    AdapterError, AdapterResult, AgentError, ProtocolError, Result, ToolError,
    ToolExecutionError,
};
pub use llm::{
    ClientConfig, ClientOptions, ConversationItem, EventStream, Role, StreamEvent,
    ToolCallRecord, ToolDescriptor, TurnRequest, Usage, Vendor, VendorAdapter, build_adapter,
};
pub use registry::{Tool, ToolRegistry};
pub use session::{
    Session, SessionConfig, SessionObserver, TurnOutcome, TurnPhase, TurnStatus,
};

/// Re-exported so callers can cancel turns without naming `tokio-util`.
pub use tokio_util::sync::CancellationToken;
