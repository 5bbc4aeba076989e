//! Stream accumulator for the OpenAI Chat Completions API.
//!
//! OpenAI streams `choices[0].delta` objects.  Tool calls are *indexed
//! deltas*: each entry in `delta.tool_calls` carries an `index` plus any of
//! `id`, `function.name` and `function.arguments`.  Id and name normally
//! arrive in the first delta for an index, but nothing forbids splitting
//! them, and some compatible servers send argument text before the name.
//!
//! The accumulator therefore buffers each index until both id and name are
//! known, emits `ToolCallStarted`, then flushes any argument text that
//! arrived early.  The stream terminates with a `data: [DONE]` sentinel.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{AdapterError, AdapterResult, ProtocolError};
use crate::llm::accumulator::{DeltaAccumulator, json_u32, parse_json};
use crate::llm::sse::SseFrame;
use crate::llm::types::{StreamEvent, Usage};

// ---------------------------------------------------------------------------
// Raw events
// ---------------------------------------------------------------------------

/// A decoded OpenAI stream chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatChunk {
    /// One `chat.completion.chunk` payload.
    Delta(ChunkDelta),
    /// The `[DONE]` sentinel.
    Done,
}

/// The parts of a chunk the accumulator cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkDelta {
    /// `choices[0].delta.content`.
    pub content: Option<String>,
    /// `choices[0].delta.tool_calls`.
    pub tool_calls: Vec<ToolCallDelta>,
    /// `choices[0].finish_reason`.
    pub finish_reason: Option<String>,
    /// Top-level `usage`, sent on the final chunk when requested.
    pub usage: Option<Usage>,
}

/// One entry of `delta.tool_calls`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// In-progress tool call keyed by its vendor index.
#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: String,
    /// Argument text received before the call could be started.
    buffered: String,
    started: bool,
}

/// Indexed-delta accumulator.
#[derive(Debug, Default)]
pub struct IndexedDeltaAccumulator {
    calls: BTreeMap<usize, PendingCall>,
    usage: Usage,
    finish_reason: Option<String>,
    done: bool,
}

impl IndexedDeltaAccumulator {
    /// Create an accumulator for a new turn.
    pub fn new() -> Self {
        Self::default()
    }

    /// The `finish_reason` of the last chunk that carried one.
    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    fn apply_tool_delta(&mut self, delta: ToolCallDelta, events: &mut Vec<StreamEvent>) {
        let index = delta.index;
        let call = self.calls.entry(index).or_default();

        if !call.started {
            if let Some(id) = delta.id.filter(|s| !s.is_empty()) {
                call.id = Some(id);
            }
            if let Some(name) = delta.name.filter(|s| !s.is_empty()) {
                call.name = name;
            }
        }
        if let Some(args) = delta.arguments {
            call.buffered.push_str(&args);
        }

        if !call.started
            && let Some(id) = &call.id
            && !call.name.is_empty()
        {
            call.started = true;
            events.push(StreamEvent::ToolCallStarted {
                index,
                id: id.clone(),
                name: call.name.clone(),
            });
        }

        if call.started && !call.buffered.is_empty() {
            events.push(StreamEvent::ToolCallArgumentFragment {
                index,
                fragment: std::mem::take(&mut call.buffered),
            });
        }
    }
}

impl DeltaAccumulator for IndexedDeltaAccumulator {
    type Raw = ChatChunk;

    fn decode(&self, frame: &SseFrame) -> AdapterResult<Option<ChatChunk>> {
        parse_chunk(frame)
    }

    fn normalize(&mut self, raw: ChatChunk) -> AdapterResult<Vec<StreamEvent>> {
        let delta = match raw {
            ChatChunk::Done => {
                self.done = true;
                return Ok(Vec::new());
            }
            ChatChunk::Delta(delta) => delta,
        };

        let mut events = Vec::new();
        if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
            events.push(StreamEvent::TextFragment(text));
        }
        for tc in delta.tool_calls {
            self.apply_tool_delta(tc, &mut events);
        }
        if delta.finish_reason.is_some() {
            self.finish_reason = delta.finish_reason;
        }
        if let Some(usage) = delta.usage {
            self.usage = usage;
        }
        Ok(events)
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self) -> AdapterResult<Vec<StreamEvent>> {
        for (&index, call) in &self.calls {
            if call.started {
                continue;
            }
            if call.id.is_none() {
                return Err(ProtocolError::MissingCallId { index }.into());
            }
            return Err(ProtocolError::MissingCallName { index }.into());
        }
        Ok(vec![StreamEvent::TurnComplete { usage: self.usage }])
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Parse one SSE frame into a [`ChatChunk`].
pub fn parse_chunk(frame: &SseFrame) -> AdapterResult<Option<ChatChunk>> {
    if frame.is_done_sentinel() {
        return Ok(Some(ChatChunk::Done));
    }

    let v: Value = parse_json(frame.data.trim())?;

    if let Some(err) = v.get("error").filter(|e| !e.is_null()) {
        let message = err["message"].as_str().unwrap_or("unknown error");
        return Err(AdapterError::Stream {
            reason: message.to_owned(),
        });
    }

    let choice = &v["choices"][0];
    let delta = &choice["delta"];

    let tool_calls = delta["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .map(|tc| {
                    let func = &tc["function"];
                    ToolCallDelta {
                        index: tc["index"]
                            .as_u64()
                            .and_then(|n| usize::try_from(n).ok())
                            .unwrap_or_default(),
                        id: tc["id"].as_str().map(String::from),
                        name: func["name"].as_str().map(String::from),
                        arguments: func["arguments"].as_str().map(String::from),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    // Usage arrives on a final chunk whose `choices` array is empty.
    let usage = v.get("usage").filter(|u| !u.is_null()).map(|u| Usage {
        input_tokens: json_u32(&u["prompt_tokens"]),
        output_tokens: json_u32(&u["completion_tokens"]),
    });

    Ok(Some(ChatChunk::Delta(ChunkDelta {
        content: delta["content"].as_str().map(String::from),
        tool_calls,
        finish_reason: choice["finish_reason"].as_str().map(String::from),
        usage,
    })))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
