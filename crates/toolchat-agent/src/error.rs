//! Agent error types.
//!
//! The runtime distinguishes three failure families:
//!
//! - [`AdapterError`] -- a vendor adapter could not complete a
//!   request/response cycle (transport, HTTP status, malformed stream).  Fatal
//!   for the current turn only.
//! - [`ProtocolError`] -- a delta accumulator observed an impossible event
//!   ordering.  Surfaced as [`AdapterError::Protocol`].
//! - [`ToolExecutionError`] -- a tool could not be run or failed.  Never
//!   fatal: the session turns it into a tool-result item.
//!
//! Everything a caller of [`crate::Session`] can see is wrapped in
//! [`AgentError`].

/// Violations of the normalized stream contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// An argument fragment referenced a tool call index that was never started.
    #[error("argument fragment for tool call {index} arrived before the call started")]
    FragmentBeforeStart { index: usize },

    /// A signature referenced a tool call index that was never started.
    #[error("signature for tool call {index} arrived before the call started")]
    SignatureBeforeStart { index: usize },

    /// The same tool call index was started twice within one turn.
    #[error("tool call {index} started twice")]
    DuplicateStart { index: usize },

    /// The stream ended before the vendor sent an id for a tool call.
    #[error("tool call {index} never received an id")]
    MissingCallId { index: usize },

    /// The stream ended before the vendor sent a name for a tool call.
    #[error("tool call {index} never received a function name")]
    MissingCallName { index: usize },

    /// A content delta arrived while no content block was open.
    #[error("content delta arrived with no open content block")]
    DeltaWithoutOpenBlock,

    /// A content delta named a block other than the one currently open.
    #[error("content delta for block {index} does not match the open block")]
    UnknownBlockIndex { index: usize },
}

/// Errors raised by vendor adapters and their stream decoders.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The HTTP request could not be sent.
    #[error("request failed: {reason}")]
    Request { reason: String },

    /// The vendor answered with a non-success status.
    #[error("{vendor} API returned {status}: {body}")]
    Status {
        vendor: String,
        status: u16,
        body: String,
    },

    /// The response stream was interrupted or carried a vendor error event.
    #[error("stream error: {reason}")]
    Stream { reason: String },

    /// A stream payload could not be parsed.
    #[error("parse error: {reason}")]
    Parse { reason: String },

    /// The vendor violated the streaming protocol.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// No API key in the client options or the environment.
    #[error("missing api key for {vendor} (set `api_key` in the client options or {env_var})")]
    MissingApiKey { vendor: String, env_var: String },

    /// Client options failed validation.
    #[error("invalid client options: {reason}")]
    InvalidOptions { reason: String },
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request {
            reason: err.to_string(),
        }
    }
}

/// Convenience alias for adapter-level results.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Errors a [`crate::Tool`] implementation may return from `run`.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The arguments parsed as JSON but do not satisfy the tool's schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool ran and failed.
    #[error("{0}")]
    Failed(String),

    /// The tool exceeded its time limit.
    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// An I/O operation inside the tool failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A tool call that could not produce a normal result.
///
/// These never escape the session loop; they are rendered into the content
/// of a tool-result item as `Error: <message>`.
#[derive(Debug, thiserror::Error)]
pub enum ToolExecutionError {
    /// No tool with this name is registered.
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    /// The accumulated arguments text is not valid JSON.
    #[error("invalid arguments for `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// The tool returned an error.
    #[error("`{tool}` failed: {source}")]
    Failed {
        tool: String,
        #[source]
        source: ToolError,
    },

    /// The tool task panicked or was torn down.
    #[error("`{tool}` aborted: {reason}")]
    Aborted { tool: String, reason: String },

    /// The user cancelled the turn before the tool finished.
    #[error("tool call cancelled")]
    Cancelled,
}

impl ToolExecutionError {
    /// Render the error as tool-result content.
    pub fn to_tool_output(&self) -> String {
        format!("Error: {self}")
    }
}

/// Unified error type for the agent runtime.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- Vendor errors -------------------------------------------------------
    /// The vendor adapter failed; the current turn is aborted.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    // -- Runtime errors ------------------------------------------------------
    /// Two tools with the same name were offered to one registry.
    #[error("duplicate tool name: {name}")]
    DuplicateTool { name: String },

    /// The turn needed more model rounds than the session allows.
    #[error("turn exceeded max rounds ({max_rounds})")]
    MaxRoundsExceeded { max_rounds: u32 },

    // -- Configuration errors ------------------------------------------------
    /// Configuration validation or loading failed.
    #[error("config error: {reason}")]
    Config { reason: String },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // -- Generic -------------------------------------------------------------
    /// Catch-all for broken internal invariants.  Prefer a typed variant
    /// whenever possible.
    #[error("internal agent error: {0}")]
    Internal(String),
}

impl From<ProtocolError> for AgentError {
    fn from(err: ProtocolError) -> Self {
        Self::Adapter(AdapterError::Protocol(err))
    }
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;
