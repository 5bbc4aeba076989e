//! Google Gemini `streamGenerateContent` adapter.
//!
//! Gemini calls the assistant `model`, carries tool calls as `functionCall`
//! parts and tool results as `functionResponse` parts addressed by function
//! *name*.  The canonical history addresses results by call id, so the
//! serializer remembers which name each id belongs to.
//!
//! Vendor-issued call ids are echoed on both `functionCall` and
//! `functionResponse`; synthesized ids stay local.  A call's
//! `thoughtSignature` is sent back on the same part it arrived with.
//!
//! Parameter schemas use Gemini's upper-case `Type` enum (`OBJECT`,
//! `STRING`, ...), so `type` keywords are rewritten recursively.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{Value, json};

use crate::error::AdapterResult;
use crate::llm::accumulator::EventStream;
use crate::llm::client::{ClientConfig, HttpTransport, TurnRequest, Vendor, VendorAdapter, header_value};
use crate::llm::streaming_gemini::{ChunkAccumulator, is_vendor_call_id};
use crate::llm::types::{ConversationItem, Role, ToolDescriptor};

/// Adapter for `POST {base_url}/models/{model}:streamGenerateContent?alt=sse`.
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    config: ClientConfig,
    transport: HttpTransport,
}

impl GeminiAdapter {
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
            "x-goog-api-key",
            header_value("x-goog-api-key", &self.config.api_key)?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl VendorAdapter for GeminiAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Gemini
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn build_request_body(&self, request: &TurnRequest<'_>) -> Value {
        let mut body = json!({
            "contents": items_to_gemini(request.history),
        });

        if let Some(max_tokens) = self.config.max_tokens {
            body["generationConfig"] = json!({"maxOutputTokens": max_tokens});
        }

        if let Some(system) = request.system_prompt.filter(|s| !s.is_empty()) {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        if !request.tools.is_empty() {
            body["tools"] = tools_to_gemini(request.tools);
        }

        body
    }

    async fn stream(&self, request: &TurnRequest<'_>) -> AdapterResult<EventStream> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url, self.config.model
        );
        let body = self.build_request_body(request);
        self.transport
            .open_stream(
                Vendor::Gemini,
                &url,
                self.headers()?,
                &body,
                ChunkAccumulator::new(),
            )
            .await
    }
}

// ---------------------------------------------------------------------------
// Format conversion
// ---------------------------------------------------------------------------

/// Convert canonical items into the Gemini `contents` array.
pub fn items_to_gemini(items: &[ConversationItem]) -> Vec<Value> {
    let mut contents: Vec<Value> = Vec::with_capacity(items.len());
    let mut names_by_id: HashMap<&str, &str> = HashMap::new();
    // Pending `functionResponse` parts waiting to be flushed as one user turn.
    let mut responses: Vec<Value> = Vec::new();

    for item in items {
        if item.role != Role::Tool && !responses.is_empty() {
            contents.push(json!({
                "role": "user",
                "parts": std::mem::take(&mut responses),
            }));
        }

        match item.role {
            Role::User => {
                contents.push(json!({
                    "role": "user",
                    "parts": [{"text": item.content}],
                }));
            }
            Role::Assistant => {
                let mut parts: Vec<Value> = Vec::new();
                if !item.content.is_empty() {
                    parts.push(json!({"text": item.content}));
                }
                for tc in &item.tool_calls {
                    names_by_id.insert(tc.id.as_str(), tc.name.as_str());
                    let args = match tc.parse_arguments() {
                        Ok(v) if v.is_object() => v,
                        _ => json!({}),
                    };
                    let mut call = json!({"name": tc.name, "args": args});
                    if is_vendor_call_id(&tc.id) {
                        call["id"] = json!(tc.id);
                    }
                    let mut part = json!({"functionCall": call});
                    if let Some(signature) = &tc.signature {
                        part["thoughtSignature"] = json!(signature);
                    }
                    parts.push(part);
                }
                // Gemini rejects contents without parts.
                if parts.is_empty() {
                    continue;
                }
                contents.push(json!({
                    "role": "model",
                    "parts": parts,
                }));
            }
            Role::Tool => {
                let id = item.tool_call_id.as_deref().unwrap_or_default();
                let name = names_by_id.get(id).copied().unwrap_or_default();
                let mut response = json!({
                    "name": name,
                    "response": {"content": item.content},
                });
                if !id.is_empty() && is_vendor_call_id(id) {
                    response["id"] = json!(id);
                }
                responses.push(json!({"functionResponse": response}));
            }
        }
    }

    if !responses.is_empty() {
        contents.push(json!({
            "role": "user",
            "parts": responses,
        }));
    }

    contents
}

/// Convert tool descriptors into a single Gemini `functionDeclarations` tool.
pub fn tools_to_gemini(tools: &[ToolDescriptor]) -> Value {
    let declarations: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "parameters": upper_case_schema_types(&t.parameters),
            })
        })
        .collect();
    json!([{"functionDeclarations": declarations}])
}

/// Rewrite JSON Schema `type` keywords into Gemini's upper-case form.
pub fn upper_case_schema_types(schema: &Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return schema.clone();
    };

    let mut out = serde_json::Map::with_capacity(obj.len());
    for (key, value) in obj {
        let mapped = match key.as_str() {
            "type" => match value.as_str() {
                Some(t) => json!(t.to_uppercase()),
                None => value.clone(),
            },
            "properties" => match value.as_object() {
                Some(props) => Value::Object(
                    props
                        .iter()
                        .map(|(name, prop)| (name.clone(), upper_case_schema_types(prop)))
                        .collect(),
                ),
                None => value.clone(),
            },
            "items" => upper_case_schema_types(value),
            _ => value.clone(),
        };
        out.insert(key.clone(), mapped);
    }
    Value::Object(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
