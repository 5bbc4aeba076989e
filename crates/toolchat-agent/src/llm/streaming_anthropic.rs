//! Stream accumulator for the Anthropic Messages API.
//!
//! Anthropic uses a *block lifecycle*: every piece of content lives in a
//! block that is opened by `content_block_start`, filled by
//! `content_block_delta` events and closed by `content_block_stop`.  Tool
//! calls are `tool_use` blocks whose start event carries the id and name and
//! whose deltas carry partial JSON input.
//!
//! Exactly one block is open at a time.  The accumulator keeps that block in
//! its own state and clears it on stop, so a delta can never be attributed
//! to a block other than the one the vendor opened.

use serde_json::Value;

use crate::error::{AdapterError, AdapterResult, ProtocolError};
use crate::llm::accumulator::{DeltaAccumulator, json_string, json_u32, parse_json};
use crate::llm::sse::SseFrame;
use crate::llm::types::{StreamEvent, Usage};

// ---------------------------------------------------------------------------
// Raw events
// ---------------------------------------------------------------------------

/// A decoded Anthropic streaming event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnthropicEvent {
    /// The message has begun; carries the prompt token count.
    MessageStart {
        message_id: String,
        model: String,
        input_tokens: u32,
    },

    /// A new content block has started.
    ContentBlockStart {
        index: usize,
        content_type: String,
        id: Option<String>,
        name: Option<String>,
        text: Option<String>,
    },

    /// Incremental content for the open block.
    ContentBlockDelta { index: usize, delta: BlockDelta },

    /// The open block has finished.
    ContentBlockStop { index: usize },

    /// Top-level message metadata changed (stop reason, output tokens).
    MessageDelta {
        stop_reason: Option<String>,
        output_tokens: u32,
    },

    /// The message is complete.
    MessageStop,

    /// Keep-alive.
    Ping,

    /// The vendor reported an error mid-stream.
    Error { kind: String, message: String },
}

/// The payload of a `content_block_delta` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockDelta {
    /// Incremental text.
    TextDelta(String),
    /// Incremental JSON input for a `tool_use` block.
    InputJsonDelta(String),
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    ToolUse,
    Other,
}

#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    index: usize,
    kind: BlockKind,
}

/// Block-lifecycle accumulator.
///
/// Tool calls are reported under the vendor's block index.
#[derive(Debug, Default)]
pub struct BlockAccumulator {
    open: Option<OpenBlock>,
    started_tools: Vec<usize>,
    usage: Usage,
    stop_reason: Option<String>,
    done: bool,
}

impl BlockAccumulator {
    /// Create an accumulator for a new turn.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stop reason reported by `message_delta`, if any.
    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    fn open_block(&self, index: usize) -> Result<OpenBlock, ProtocolError> {
        let block = self.open.ok_or(ProtocolError::DeltaWithoutOpenBlock)?;
        if block.index != index {
            return Err(ProtocolError::UnknownBlockIndex { index });
        }
        Ok(block)
    }
}

impl DeltaAccumulator for BlockAccumulator {
    type Raw = AnthropicEvent;

    fn decode(&self, frame: &SseFrame) -> AdapterResult<Option<AnthropicEvent>> {
        parse_event(frame)
    }

    fn normalize(&mut self, raw: AnthropicEvent) -> AdapterResult<Vec<StreamEvent>> {
        let mut events = Vec::new();

        match raw {
            AnthropicEvent::MessageStart {
                message_id,
                model,
                input_tokens,
            } => {
                tracing::debug!(message_id, model, "anthropic message started");
                self.usage.input_tokens = input_tokens;
            }

            AnthropicEvent::ContentBlockStart {
                index,
                content_type,
                id,
                name,
                text,
            } => {
                let kind = match content_type.as_str() {
                    "tool_use" => {
                        if self.started_tools.contains(&index) {
                            return Err(ProtocolError::DuplicateStart { index }.into());
                        }
                        let id = id
                            .filter(|s| !s.is_empty())
                            .ok_or(ProtocolError::MissingCallId { index })?;
                        let name = name
                            .filter(|s| !s.is_empty())
                            .ok_or(ProtocolError::MissingCallName { index })?;
                        self.started_tools.push(index);
                        events.push(StreamEvent::ToolCallStarted { index, id, name });
                        BlockKind::ToolUse
                    }
                    "text" => {
                        if let Some(text) = text.filter(|t| !t.is_empty()) {
                            events.push(StreamEvent::TextFragment(text));
                        }
                        BlockKind::Text
                    }
                    other => {
                        tracing::trace!(content_type = other, "ignoring content block");
                        BlockKind::Other
                    }
                };
                self.open = Some(OpenBlock { index, kind });
            }

            AnthropicEvent::ContentBlockDelta { index, delta } => {
                let block = self.open_block(index)?;
                match delta {
                    BlockDelta::TextDelta(text) => {
                        if !text.is_empty() {
                            events.push(StreamEvent::TextFragment(text));
                        }
                    }
                    BlockDelta::InputJsonDelta(fragment) => {
                        if block.kind != BlockKind::ToolUse {
                            return Err(ProtocolError::FragmentBeforeStart { index }.into());
                        }
                        if !fragment.is_empty() {
                            events.push(StreamEvent::ToolCallArgumentFragment { index, fragment });
                        }
                    }
                }
            }

            AnthropicEvent::ContentBlockStop { index } => {
                self.open_block(index)?;
                self.open = None;
            }

            AnthropicEvent::MessageDelta {
                stop_reason,
                output_tokens,
            } => {
                if stop_reason.is_some() {
                    self.stop_reason = stop_reason;
                }
                self.usage.output_tokens = output_tokens;
            }

            AnthropicEvent::MessageStop => self.done = true,

            AnthropicEvent::Ping => {}

            AnthropicEvent::Error { kind, message } => {
                return Err(AdapterError::Stream {
                    reason: format!("{kind}: {message}"),
                });
            }
        }

        Ok(events)
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self) -> AdapterResult<Vec<StreamEvent>> {
        self.open = None;
        Ok(vec![StreamEvent::TurnComplete { usage: self.usage }])
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Parse one SSE frame into an [`AnthropicEvent`].
///
/// The frame's `event:` field selects the event type; the payload's own
/// `type` field is used when the field is absent.
pub fn parse_event(frame: &SseFrame) -> AdapterResult<Option<AnthropicEvent>> {
    if frame.is_done_sentinel() {
        return Ok(Some(AnthropicEvent::MessageStop));
    }

    let v: Value = parse_json(&frame.data)?;
    let payload_type = json_string(&v, "type");
    let event_type = frame.event.as_deref().unwrap_or(payload_type.as_str());

    let event = match event_type {
        "message_start" => {
            let message = &v["message"];
            AnthropicEvent::MessageStart {
                message_id: json_string(message, "id"),
                model: json_string(message, "model"),
                input_tokens: json_u32(&message["usage"]["input_tokens"]),
            }
        }

        "content_block_start" => {
            let block = &v["content_block"];
            AnthropicEvent::ContentBlockStart {
                index: block_index(&v),
                content_type: json_string(block, "type"),
                id: block["id"].as_str().map(String::from),
                name: block["name"].as_str().map(String::from),
                text: block["text"].as_str().map(String::from),
            }
        }

        "content_block_delta" => {
            let delta_obj = &v["delta"];
            let delta = match json_string(delta_obj, "type").as_str() {
                "text_delta" => BlockDelta::TextDelta(json_string(delta_obj, "text")),
                "input_json_delta" => {
                    BlockDelta::InputJsonDelta(json_string(delta_obj, "partial_json"))
                }
                other => {
                    tracing::trace!(delta_type = other, "ignoring delta type");
                    return Ok(None);
                }
            };
            AnthropicEvent::ContentBlockDelta {
                index: block_index(&v),
                delta,
            }
        }

        "content_block_stop" => AnthropicEvent::ContentBlockStop {
            index: block_index(&v),
        },

        "message_delta" => AnthropicEvent::MessageDelta {
            stop_reason: v["delta"]["stop_reason"].as_str().map(String::from),
            output_tokens: json_u32(&v["usage"]["output_tokens"]),
        },

        "message_stop" => AnthropicEvent::MessageStop,

        "ping" => AnthropicEvent::Ping,

        "error" => AnthropicEvent::Error {
            kind: json_string(&v["error"], "type"),
            message: json_string(&v["error"], "message"),
        },

        other => {
            tracing::trace!(event_type = other, "ignoring unknown SSE event type");
            return Ok(None);
        }
    };

    Ok(Some(event))
}

fn block_index(v: &Value) -> usize {
    v["index"]
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
