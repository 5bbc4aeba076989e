//! Stream accumulator for the Gemini `streamGenerateContent` API.
//!
//! Gemini streams whole `GenerateContentResponse` chunks.  Each chunk holds
//! `candidates[0].content.parts`, where a part is either `text` or a complete
//! `functionCall { name, args }`.  Function calls are never split across
//! chunks, so each one becomes a `ToolCallStarted` immediately followed by a
//! single argument fragment holding the serialized `args`.
//!
//! Gemini does not always assign call ids; when it doesn't, the accumulator
//! synthesizes one (prefixed [`SYNTHESIZED_ID_PREFIX`]) so that the matching
//! tool result can be correlated.  A call's `thoughtSignature` is forwarded
//! as a `ToolCallSignature` event.

use serde_json::Value;
use uuid::Uuid;

use crate::error::{AdapterError, AdapterResult};
use crate::llm::accumulator::{DeltaAccumulator, json_u32, parse_json};
use crate::llm::sse::SseFrame;
use crate::llm::types::{StreamEvent, Usage};

// ---------------------------------------------------------------------------
// Raw events
// ---------------------------------------------------------------------------

/// One decoded `GenerateContentResponse` chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeminiChunk {
    /// Parts of the first candidate.
    pub parts: Vec<GeminiPart>,
    /// `candidates[0].finishReason`.
    pub finish_reason: Option<String>,
    /// `usageMetadata`, when present.
    pub usage: Option<Usage>,
}

/// A content part the accumulator understands.
#[derive(Debug, Clone, PartialEq)]
pub enum GeminiPart {
    /// Visible text.
    Text(String),
    /// A complete function call.
    FunctionCall {
        id: Option<String>,
        name: String,
        args: Value,
        signature: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Chunked-function-call accumulator.
///
/// Tool call indices are assigned in arrival order starting at zero.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    next_index: usize,
    usage: Usage,
    finish_reason: Option<String>,
}

impl ChunkAccumulator {
    /// Create an accumulator for a new turn.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last finish reason reported by the vendor.
    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }
}

/// Prefix of ids the accumulator made up; these are never sent to Gemini.
pub const SYNTHESIZED_ID_PREFIX: &str = "call_toolchat_";

/// Build an id for a function call the vendor left unnamed.
pub fn synthesize_call_id() -> String {
    format!("{SYNTHESIZED_ID_PREFIX}{}", Uuid::now_v7().simple())
}

/// Whether `id` was issued by Gemini rather than synthesized.
pub fn is_vendor_call_id(id: &str) -> bool {
    !id.starts_with(SYNTHESIZED_ID_PREFIX)
}

impl DeltaAccumulator for ChunkAccumulator {
    type Raw = GeminiChunk;

    fn decode(&self, frame: &SseFrame) -> AdapterResult<Option<GeminiChunk>> {
        parse_chunk(frame)
    }

    fn normalize(&mut self, raw: GeminiChunk) -> AdapterResult<Vec<StreamEvent>> {
        let mut events = Vec::new();

        for part in raw.parts {
            match part {
                GeminiPart::Text(text) => {
                    if !text.is_empty() {
                        events.push(StreamEvent::TextFragment(text));
                    }
                }
                GeminiPart::FunctionCall {
                    id,
                    name,
                    args,
                    signature,
                } => {
                    let index = self.next_index;
                    self.next_index += 1;
                    let id = id
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(synthesize_call_id);
                    let fragment = if args.is_null() {
                        "{}".to_owned()
                    } else {
                        args.to_string()
                    };
                    events.push(StreamEvent::ToolCallStarted { index, id, name });
                    events.push(StreamEvent::ToolCallArgumentFragment { index, fragment });
                    if let Some(signature) = signature.filter(|s| !s.is_empty()) {
                        events.push(StreamEvent::ToolCallSignature { index, signature });
                    }
                }
            }
        }

        if raw.finish_reason.is_some() {
            self.finish_reason = raw.finish_reason;
        }
        if let Some(usage) = raw.usage {
            self.usage = usage;
        }
        Ok(events)
    }

    fn finish(&mut self) -> AdapterResult<Vec<StreamEvent>> {
        Ok(vec![StreamEvent::TurnComplete { usage: self.usage }])
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Parse one SSE frame into a [`GeminiChunk`].
pub fn parse_chunk(frame: &SseFrame) -> AdapterResult<Option<GeminiChunk>> {
    let v: Value = parse_json(frame.data.trim())?;

    if let Some(err) = v.get("error").filter(|e| !e.is_null()) {
        let status = err["status"].as_str().unwrap_or("ERROR");
        let message = err["message"].as_str().unwrap_or("unknown error");
        return Err(AdapterError::Stream {
            reason: format!("{status}: {message}"),
        });
    }

    if let Some(reason) = v["promptFeedback"]["blockReason"].as_str() {
        return Err(AdapterError::Stream {
            reason: format!("prompt blocked: {reason}"),
        });
    }

    let candidate = &v["candidates"][0];
    let parts = candidate["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(parse_part).collect())
        .unwrap_or_default();

    let usage = v.get("usageMetadata").filter(|u| !u.is_null()).map(|u| Usage {
        input_tokens: json_u32(&u["promptTokenCount"]),
        output_tokens: json_u32(&u["candidatesTokenCount"]),
    });

    Ok(Some(GeminiChunk {
        parts,
        finish_reason: candidate["finishReason"].as_str().map(String::from),
        usage,
    }))
}

fn parse_part(part: &Value) -> Option<GeminiPart> {
    if let Some(call) = part.get("functionCall") {
        return Some(GeminiPart::FunctionCall {
            id: call["id"].as_str().map(String::from),
            name: call["name"].as_str().unwrap_or_default().to_owned(),
            args: call.get("args").cloned().unwrap_or(Value::Null),
            signature: part["thoughtSignature"].as_str().map(String::from),
        });
    }
    // Thought summaries are not part of the visible reply.
    if part["thought"].as_bool() == Some(true) {
        return None;
    }
    part["text"].as_str().map(|t| GeminiPart::Text(t.to_owned()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(acc: &mut ChunkAccumulator, json: &str) -> Vec<StreamEvent> {
        let frame = SseFrame {
            event: None,
            data: json.into(),
        };
        let raw = acc.decode(&frame).unwrap().unwrap();
        acc.normalize(raw).unwrap()
    }

    #[test]
    fn text_parts_become_fragments() {
        let mut acc = ChunkAccumulator::new();
        let events = normalize(
            &mut acc,
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"},{"text":"lo"}]}}]}"#,
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::TextFragment("Hel".into()),
                StreamEvent::TextFragment("lo".into()),
            ]
        );
    }

    #[test]
    fn function_call_is_started_then_filled() {
        let mut acc = ChunkAccumulator::new();
        let events = normalize(
            &mut acc,
            r#"{"candidates":[{"content":{"role":"model","parts":[{"functionCall":{"name":"bash","args":{"command":"ls"}}},{"functionCall":{"id":"fc_2","name":"ls","args":{}}}]}}]}"#,
        );

        assert_eq!(events.len(), 4);
        match &events[0] {
            StreamEvent::ToolCallStarted { index, id, name } => {
                assert_eq!(*index, 0);
                assert!(id.starts_with("call_"));
                assert_eq!(name, "bash");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(
            events[1],
            StreamEvent::ToolCallArgumentFragment {
                index: 0,
                fragment: r#"{"command":"ls"}"#.into(),
            }
        );
        assert_eq!(
            events[2],
            StreamEvent::ToolCallStarted {
                index: 1,
                id: "fc_2".into(),
                name: "ls".into(),
            }
        );
    }

    #[test]
    fn indices_continue_across_chunks() {
        let mut acc = ChunkAccumulator::new();
        normalize(
            &mut acc,
            r#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"a"}}]}}]}"#,
        );
        let events = normalize(
            &mut acc,
            r#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"b"}}]}}]}"#,
        );
        assert!(matches!(events[0], StreamEvent::ToolCallStarted { index: 1, .. }));
        assert_eq!(
            events[1],
            StreamEvent::ToolCallArgumentFragment {
                index: 1,
                fragment: "{}".into(),
            }
        );
    }

    #[test]
    fn usage_and_finish_reason() {
        let mut acc = ChunkAccumulator::new();
        normalize(
            &mut acc,
            r#"{"candidates":[{"content":{"parts":[{"text":"ok"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":7,"candidatesTokenCount":3,"totalTokenCount":10}}"#,
        );
        assert_eq!(acc.finish_reason(), Some("STOP"));
        assert_eq!(
            acc.finish().unwrap(),
            vec![StreamEvent::TurnComplete {
                usage: Usage {
                    input_tokens: 7,
                    output_tokens: 3,
                }
            }]
        );
    }

    #[test]
    fn thought_signature_follows_the_call() {
        let mut acc = ChunkAccumulator::new();
        let events = normalize(
            &mut acc,
            r#"{"candidates":[{"content":{"parts":[{"functionCall":{"id":"fc_1","name":"ls","args":{}},"thoughtSignature":"c2lnLTE="}]}}]}"#,
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::ToolCallStarted {
                    index: 0,
                    id: "fc_1".into(),
                    name: "ls".into(),
                },
                StreamEvent::ToolCallArgumentFragment {
                    index: 0,
                    fragment: "{}".into(),
                },
                StreamEvent::ToolCallSignature {
                    index: 0,
                    signature: "c2lnLTE=".into(),
                },
            ]
        );
    }

    #[test]
    fn synthesized_ids_are_recognizable() {
        assert!(!is_vendor_call_id(&synthesize_call_id()));
        assert!(is_vendor_call_id("fc_1"));
    }

    #[test]
    fn thought_parts_are_hidden() {
        let mut acc = ChunkAccumulator::new();
        let events = normalize(
            &mut acc,
            r#"{"candidates":[{"content":{"parts":[{"text":"thinking...","thought":true},{"text":"answer"}]}}]}"#,
        );
        assert_eq!(events, vec![StreamEvent::TextFragment("answer".into())]);
    }

    #[test]
    fn blocked_prompt_is_stream_error() {
        let frame = SseFrame {
            event: None,
            data: r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#.into(),
        };
        let err = parse_chunk(&frame).unwrap_err();
        assert!(matches!(err, AdapterError::Stream { .. }));
    }
}
