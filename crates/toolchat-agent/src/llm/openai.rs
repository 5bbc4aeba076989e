//! OpenAI Chat Completions adapter.
//!
//! Also covers OpenAI-compatible endpoints (Ollama, vLLM, Together) through
//! the `base_url` option.  The canonical history maps almost one-to-one onto
//! the OpenAI message list; argument text is sent back exactly as it was
//! streamed.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde_json::{Value, json};

use crate::error::AdapterResult;
use crate::llm::accumulator::EventStream;
use crate::llm::client::{ClientConfig, HttpTransport, TurnRequest, Vendor, VendorAdapter, header_value};
use crate::llm::streaming_openai::IndexedDeltaAccumulator;
use crate::llm::types::{ConversationItem, Role, ToolDescriptor};

/// Adapter for `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    config: ClientConfig,
    transport: HttpTransport,
}

impl OpenAiAdapter {
    /// Create an adapter from resolved settings.
    pub fn new(config: ClientConfig) -> AdapterResult<Self> {
        Ok(Self {
            config,
            transport: HttpTransport::new()?,
        })
    }

    fn headers(&self) -> AdapterResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            header_value("authorization", &format!("Bearer {}", self.config.api_key))?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl VendorAdapter for OpenAiAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::OpenAi
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn build_request_body(&self, request: &TurnRequest<'_>) -> Value {
        let mut messages = Vec::with_capacity(request.history.len() + 1);
        if let Some(system) = request.system_prompt.filter(|s| !s.is_empty()) {
            messages.push(json!({
                "role": "system",
                "content": system,
            }));
        }
        messages.extend(items_to_openai(request.history));

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": true,
            "stream_options": {"include_usage": true},
        });

        if let Some(max_tokens) = self.config.max_tokens {
            body["max_completion_tokens"] = json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = tools_to_openai(request.tools);
            body["tool_choice"] = json!("auto");
        }

        body
    }

    async fn stream(&self, request: &TurnRequest<'_>) -> AdapterResult<EventStream> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = self.build_request_body(request);
        self.transport
            .open_stream(
                Vendor::OpenAi,
                &url,
                self.headers()?,
                &body,
                IndexedDeltaAccumulator::new(),
            )
            .await
    }
}

// ---------------------------------------------------------------------------
// Format conversion
// ---------------------------------------------------------------------------

/// Convert canonical items into the OpenAI `messages` array.
///
/// Tool calls are in `assistant.tool_calls` and tool results use
/// `role: "tool"` with a `tool_call_id`.
pub fn items_to_openai(items: &[ConversationItem]) -> Vec<Value> {
    let mut wire_messages: Vec<Value> = Vec::with_capacity(items.len());

    for item in items {
        match item.role {
            Role::User => {
                wire_messages.push(json!({
                    "role": "user",
                    "content": item.content,
                }));
            }
            Role::Assistant => {
                if item.tool_calls.is_empty() {
                    wire_messages.push(json!({
                        "role": "assistant",
                        "content": item.content,
                    }));
                } else {
                    let tool_calls: Vec<Value> = item
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments_text,
                                }
                            })
                        })
                        .collect();

                    let mut m = json!({
                        "role": "assistant",
                        "tool_calls": tool_calls,
                    });

                    if !item.content.is_empty() {
                        m["content"] = json!(item.content);
                    }

                    wire_messages.push(m);
                }
            }
            Role::Tool => {
                wire_messages.push(json!({
                    "role": "tool",
                    "tool_call_id": item.tool_call_id,
                    "content": item.content,
                }));
            }
        }
    }

    wire_messages
}

/// Convert tool descriptors into the OpenAI `tools` format.
///
/// OpenAI wraps each tool in `{"type": "function", "function": {...}}`.
pub fn tools_to_openai(tools: &[ToolDescriptor]) -> Value {
    let tool_values: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect();
    json!(tool_values)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
