//! Anthropic Messages API adapter.
//!
//! Anthropic keeps the system prompt out of the message list, represents
//! assistant tool calls as `tool_use` content blocks, and expects tool
//! results as `tool_result` blocks inside a `user` message.  Consecutive
//! tool items are merged into one such message so that user/assistant turns
//! keep alternating.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::error::AdapterResult;
use crate::llm::accumulator::EventStream;
use crate::llm::client::{
    ClientConfig, DEFAULT_MAX_TOKENS, HttpTransport, TurnRequest, Vendor, VendorAdapter,
    header_value,
};
use crate::llm::streaming_anthropic::BlockAccumulator;
use crate::llm::types::{ConversationItem, Role, ToolDescriptor};

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Adapter for `POST {base_url}/v1/messages`.
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    config: ClientConfig,
    transport: HttpTransport,
}

impl AnthropicAdapter {
    /// Create an adapter from resolved settings.
    pub fn new(config: ClientConfig) -> AdapterResult<Self> {
        Ok(Self {
            config,
            transport: HttpTransport::new()?,
        })
    }

    fn headers(&self) -> AdapterResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", header_value("x-api-key", &self.config.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        Ok(headers)
    }
}

#[async_trait]
impl VendorAdapter for AnthropicAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Anthropic
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn build_request_body(&self, request: &TurnRequest<'_>) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": items_to_anthropic(request.history),
            "stream": true,
        });

        if let Some(system) = request.system_prompt.filter(|s| !s.is_empty()) {
            body["system"] = json!(system);
        }

        if !request.tools.is_empty() {
            body["tools"] = tools_to_anthropic(request.tools);
        }

        body
    }

    async fn stream(&self, request: &TurnRequest<'_>) -> AdapterResult<EventStream> {
        let url = format!("{}/v1/messages", self.config.base_url);
        let body = self.build_request_body(request);
        self.transport
            .open_stream(
                Vendor::Anthropic,
                &url,
                self.headers()?,
                &body,
                BlockAccumulator::new(),
            )
            .await
    }
}

// ---------------------------------------------------------------------------
// Format conversion
// ---------------------------------------------------------------------------

/// Convert canonical items into the Anthropic `messages` array.
pub fn items_to_anthropic(items: &[ConversationItem]) -> Vec<Value> {
    let mut wire_messages: Vec<Value> = Vec::with_capacity(items.len());
    // Pending `tool_result` blocks waiting to be flushed as one user message.
    let mut results: Vec<Value> = Vec::new();

    for item in items {
        if item.role != Role::Tool && !results.is_empty() {
            wire_messages.push(json!({
                "role": "user",
                "content": std::mem::take(&mut results),
            }));
        }

        match item.role {
            Role::User => {
                wire_messages.push(json!({
                    "role": "user",
                    "content": item.content,
                }));
            }
            Role::Assistant => {
                if item.tool_calls.is_empty() {
                    // Anthropic rejects empty assistant content.
                    if item.content.is_empty() {
                        continue;
                    }
                    wire_messages.push(json!({
                        "role": "assistant",
                        "content": item.content,
                    }));
                } else {
                    let mut content: Vec<Value> = Vec::new();
                    if !item.content.is_empty() {
                        content.push(json!({
                            "type": "text",
                            "text": item.content,
                        }));
                    }
                    for tc in &item.tool_calls {
                        let input = match tc.parse_arguments() {
                            Ok(v) if v.is_object() => v,
                            _ => json!({}),
                        };
                        content.push(json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.name,
                            "input": input,
                        }));
                    }
                    wire_messages.push(json!({
                        "role": "assistant",
                        "content": content,
                    }));
                }
            }
            Role::Tool => {
                results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": item.tool_call_id,
                    "content": item.content,
                }));
            }
        }
    }

    if !results.is_empty() {
        wire_messages.push(json!({
            "role": "user",
            "content": results,
        }));
    }

    wire_messages
}

/// Convert tool descriptors into the Anthropic `tools` format.
pub fn tools_to_anthropic(tools: &[ToolDescriptor]) -> Value {
    let tool_values: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.parameters,
            })
        })
        .collect();
    json!(tool_values)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
