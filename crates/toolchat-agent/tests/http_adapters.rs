//! Vendor adapters against a local HTTP server.
//!
//! Each test serves a recorded-style SSE body from mockito and checks the
//! normalized events the adapter yields.  The echo tests build that body from
//! the adapter's own request payload, so serializing history and decoding the
//! vendor's reply are checked against each other.

use std::collections::HashMap;

use futures::StreamExt;
use mockito::{Matcher, Server};
use serde_json::{Value, json};
use toolchat_agent::llm::{AnthropicAdapter, GeminiAdapter, OpenAiAdapter};
use toolchat_agent::{
    AdapterError, ClientConfig, ConversationItem, EventStream, ProtocolError, StreamEvent,
    ToolCallRecord, ToolDescriptor, TurnRequest, Usage, Vendor, VendorAdapter,
};

// ═══════════════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════════════

fn config(vendor: Vendor, server: &Server) -> ClientConfig {
    ClientConfig::new(vendor, "test-key", "test-model").with_base_url(server.url())
}

fn sse(frames: &[Value]) -> String {
    frames
        .iter()
        .map(|frame| format!("data: {frame}\n\n"))
        .collect()
}

fn anthropic_sse(frames: &[Value]) -> String {
    frames
        .iter()
        .map(|frame| format!("event: {}\ndata: {frame}\n\n", frame["type"].as_str().unwrap()))
        .collect()
}

async fn drain(mut stream: EventStream) -> Result<Vec<StreamEvent>, AdapterError> {
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event?);
    }
    Ok(events)
}

/// Fold normalized events into the assistant item a session would build.
fn fold(events: &[StreamEvent]) -> (ConversationItem, Usage) {
    let mut item = ConversationItem::assistant("");
    let mut positions: HashMap<usize, usize> = HashMap::new();
    let mut usage = Usage::default();
    for event in events {
        match event {
            StreamEvent::TextFragment(text) => item.content.push_str(text),
            StreamEvent::ToolCallStarted { index, id, name } => {
                positions.insert(*index, item.tool_calls.len());
                item.tool_calls.push(ToolCallRecord::new(id.as_str(), name.as_str()));
            }
            StreamEvent::ToolCallArgumentFragment { index, fragment } => {
                item.tool_calls[positions[index]]
                    .arguments_text
                    .push_str(fragment);
            }
            StreamEvent::ToolCallSignature { index, signature } => {
                item.tool_calls[positions[index]].signature = Some(signature.clone());
            }
            StreamEvent::TurnComplete { usage: u } => usage = *u,
        }
    }
    (item, usage)
}

/// Name and parsed arguments of every call, for comparisons that ignore ids
/// and whitespace.
fn call_contents(item: &ConversationItem) -> Vec<(String, Value)> {
    item.tool_calls
        .iter()
        .map(|c| (c.name.clone(), c.parse_arguments().unwrap()))
        .collect()
}

fn sample_history() -> Vec<ConversationItem> {
    vec![
        ConversationItem::user("what is in src and how big is it?"),
        ConversationItem::assistant_with_tool_calls(
            "Let me look.",
            vec![
                ToolCallRecord::new("call_a", "ls").with_arguments(r#"{"args":"-la src"}"#),
                ToolCallRecord::new("call_b", "bash")
                    .with_arguments(r#"{"command":"du -sh src"}"#),
            ],
        ),
    ]
}

fn sample_tools() -> Vec<ToolDescriptor> {
    vec![ToolDescriptor {
        name: "bash".into(),
        description: "Run a shell command".into(),
        parameters: json!({
            "type": "object",
            "properties": {"command": {"type": "string"}},
            "required": ["command"],
        }),
    }]
}

fn split_half(s: &str) -> (String, String) {
    let (a, b) = s.split_at(s.len() / 2);
    (a.to_owned(), b.to_owned())
}

// ═══════════════════════════════════════════════════════════════════════
//  Anthropic
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn anthropic_streams_text_and_tool_use() {
    let mut server = Server::new_async().await;
    let body = anthropic_sse(&[
        json!({"type":"message_start","message":{"id":"msg_1","model":"test-model","usage":{"input_tokens":25}}}),
        json!({"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}),
        json!({"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Checking"}}),
        json!({"type":"content_block_stop","index":0}),
        json!({"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"bash","input":{}}}),
        json!({"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"command\""}}),
        json!({"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":":\"ls\"}"}}),
        json!({"type":"content_block_stop","index":1}),
        json!({"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":9}}),
        json!({"type":"message_stop"}),
    ]);
    let mock = server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "test-key")
        .match_header("anthropic-version", "2023-06-01")
        .match_body(Matcher::PartialJson(json!({"stream": true, "system": "sys"})))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let adapter = AnthropicAdapter::new(config(Vendor::Anthropic, &server)).unwrap();
    let history = vec![ConversationItem::user("list files")];
    let tools = sample_tools();
    let request = TurnRequest {
        system_prompt: Some("sys"),
        history: &history,
        tools: &tools,
    };
    let events = drain(adapter.stream(&request).await.unwrap()).await.unwrap();
    mock.assert_async().await;

    assert_eq!(
        events,
        vec![
            StreamEvent::TextFragment("Checking".into()),
            StreamEvent::ToolCallStarted {
                index: 1,
                id: "toolu_1".into(),
                name: "bash".into()
            },
            StreamEvent::ToolCallArgumentFragment {
                index: 1,
                fragment: r#"{"command""#.into()
            },
            StreamEvent::ToolCallArgumentFragment {
                index: 1,
                fragment: r#":"ls"}"#.into()
            },
            StreamEvent::TurnComplete {
                usage: Usage {
                    input_tokens: 25,
                    output_tokens: 9
                }
            },
        ]
    );
}

#[tokio::test]
async fn anthropic_error_event_fails_the_stream() {
    let mut server = Server::new_async().await;
    let body = anthropic_sse(&[
        json!({"type":"message_start","message":{"id":"msg_1","model":"m","usage":{"input_tokens":1}}}),
        json!({"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}),
    ]);
    let _mock = server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let adapter = AnthropicAdapter::new(config(Vendor::Anthropic, &server)).unwrap();
    let history = vec![ConversationItem::user("hi")];
    let request = TurnRequest {
        system_prompt: None,
        history: &history,
        tools: &[],
    };
    let err = drain(adapter.stream(&request).await.unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::Stream { ref reason } if reason.contains("Overloaded")));
}

#[tokio::test]
async fn anthropic_echo_reproduces_history() {
    let mut server = Server::new_async().await;
    let adapter = AnthropicAdapter::new(config(Vendor::Anthropic, &server)).unwrap();
    let history = sample_history();
    let request = TurnRequest {
        system_prompt: None,
        history: &history,
        tools: &[],
    };

    // Replay the serialized assistant message as a vendor stream.
    let wire = adapter.build_request_body(&request);
    let blocks = wire["messages"][1]["content"].as_array().unwrap().clone();
    let mut frames = vec![
        json!({"type":"message_start","message":{"id":"msg_echo","model":"test-model","usage":{"input_tokens":3}}}),
    ];
    for (index, block) in blocks.iter().enumerate() {
        match block["type"].as_str().unwrap() {
            "text" => {
                frames.push(json!({"type":"content_block_start","index":index,"content_block":{"type":"text","text":""}}));
                frames.push(json!({"type":"content_block_delta","index":index,"delta":{"type":"text_delta","text":block["text"]}}));
            }
            _ => {
                let (head, tail) = split_half(&block["input"].to_string());
                frames.push(json!({"type":"content_block_start","index":index,"content_block":{"type":"tool_use","id":block["id"],"name":block["name"],"input":{}}}));
                frames.push(json!({"type":"content_block_delta","index":index,"delta":{"type":"input_json_delta","partial_json":head}}));
                frames.push(json!({"type":"content_block_delta","index":index,"delta":{"type":"input_json_delta","partial_json":tail}}));
            }
        }
        frames.push(json!({"type":"content_block_stop","index":index}));
    }
    frames.push(json!({"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":4}}));
    frames.push(json!({"type":"message_stop"}));

    let _mock = server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(anthropic_sse(&frames))
        .create_async()
        .await;

    let events = drain(adapter.stream(&request).await.unwrap()).await.unwrap();
    let (echoed, _) = fold(&events);
    let original = &history[1];

    assert_eq!(echoed.content, original.content);
    assert_eq!(call_contents(&echoed), call_contents(original));
    let ids: Vec<&str> = echoed.tool_calls.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["call_a", "call_b"]);
}

// ═══════════════════════════════════════════════════════════════════════
//  OpenAI
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn openai_streams_interleaved_tool_calls() {
    let mut server = Server::new_async().await;
    let body = sse(&[
        json!({"choices":[{"index":0,"delta":{"role":"assistant","content":"On it."}}]}),
        json!({"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"bash","arguments":""}}]}}]}),
        json!({"choices":[{"index":0,"delta":{"tool_calls":[{"index":1,"id":"call_2","type":"function","function":{"name":"ls","arguments":"{}"}}]}}]}),
        json!({"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"command\":\"pwd\"}"}}]}}]}),
        json!({"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}),
        json!({"choices":[],"usage":{"prompt_tokens":40,"completion_tokens":12}}),
    ]) + "data: [DONE]\n\n";
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(json!({
            "model": "test-model",
            "stream": true,
            "tool_choice": "auto",
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let adapter = OpenAiAdapter::new(config(Vendor::OpenAi, &server)).unwrap();
    let history = vec![ConversationItem::user("where am I")];
    let tools = sample_tools();
    let request = TurnRequest {
        system_prompt: None,
        history: &history,
        tools: &tools,
    };
    let events = drain(adapter.stream(&request).await.unwrap()).await.unwrap();
    mock.assert_async().await;

    let (item, usage) = fold(&events);
    assert_eq!(item.content, "On it.");
    assert_eq!(item.tool_calls.len(), 2);
    assert_eq!(item.tool_calls[0].id, "call_1");
    assert_eq!(item.tool_calls[0].arguments_text, r#"{"command":"pwd"}"#);
    assert_eq!(item.tool_calls[1].name, "ls");
    assert_eq!(
        usage,
        Usage {
            input_tokens: 40,
            output_tokens: 12
        }
    );
}

#[tokio::test]
async fn openai_rejected_request_is_a_status_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":{"message":"Incorrect API key provided"}}"#)
        .create_async()
        .await;

    let adapter = OpenAiAdapter::new(config(Vendor::OpenAi, &server)).unwrap();
    let history = vec![ConversationItem::user("hi")];
    let request = TurnRequest {
        system_prompt: None,
        history: &history,
        tools: &[],
    };
    let err = match adapter.stream(&request).await {
        Ok(_) => panic!("expected a status error"),
        Err(err) => err,
    };
    match err {
        AdapterError::Status {
            vendor,
            status,
            body,
        } => {
            assert_eq!(vendor, "openai");
            assert_eq!(status, 401);
            assert!(body.contains("Incorrect API key"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn openai_call_without_name_is_a_protocol_error() {
    let mut server = Server::new_async().await;
    let body = sse(&[
        json!({"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"arguments":"{}"}}]}}]}),
    ]) + "data: [DONE]\n\n";
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let adapter = OpenAiAdapter::new(config(Vendor::OpenAi, &server)).unwrap();
    let history = vec![ConversationItem::user("hi")];
    let request = TurnRequest {
        system_prompt: None,
        history: &history,
        tools: &[],
    };
    let err = drain(adapter.stream(&request).await.unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AdapterError::Protocol(ProtocolError::MissingCallName { index: 0 })
    ));
}

#[tokio::test]
async fn openai_echo_reproduces_history() {
    let mut server = Server::new_async().await;
    let adapter = OpenAiAdapter::new(config(Vendor::OpenAi, &server)).unwrap();
    let history = sample_history();
    let request = TurnRequest {
        system_prompt: None,
        history: &history,
        tools: &[],
    };

    let wire = adapter.build_request_body(&request);
    let message = &wire["messages"][1];
    let mut frames = vec![json!({"choices":[{"index":0,"delta":{"content":message["content"]}}]})];
    for (index, call) in message["tool_calls"].as_array().unwrap().iter().enumerate() {
        let (head, tail) = split_half(call["function"]["arguments"].as_str().unwrap());
        frames.push(json!({"choices":[{"index":0,"delta":{"tool_calls":[{"index":index,"id":call["id"],"type":"function","function":{"name":call["function"]["name"],"arguments":head}}]}}]}));
        frames.push(json!({"choices":[{"index":0,"delta":{"tool_calls":[{"index":index,"function":{"arguments":tail}}]}}]}));
    }
    frames.push(json!({"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}));

    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse(&frames) + "data: [DONE]\n\n")
        .create_async()
        .await;

    let events = drain(adapter.stream(&request).await.unwrap()).await.unwrap();
    let (echoed, _) = fold(&events);
    let original = &history[1];

    assert_eq!(echoed.content, original.content);
    assert_eq!(echoed.tool_calls, original.tool_calls);
}

// ═══════════════════════════════════════════════════════════════════════
//  Gemini
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn gemini_streams_whole_function_calls() {
    let mut server = Server::new_async().await;
    let body = sse(&[
        json!({"candidates":[{"content":{"role":"model","parts":[{"text":"Sure, ","thought":false}]}}]}),
        json!({"candidates":[{"content":{"role":"model","parts":[{"text":"planning","thought":true},{"functionCall":{"name":"bash","args":{"command":"ls"}}}]}}]}),
        json!({"candidates":[{"content":{"role":"model","parts":[]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":18,"candidatesTokenCount":6}}),
    ]);
    let mock = server
        .mock(
            "POST",
            Matcher::Regex(r"^/models/test-model:streamGenerateContent".into()),
        )
        .match_query(Matcher::UrlEncoded("alt".into(), "sse".into()))
        .match_header("x-goog-api-key", "test-key")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let adapter = GeminiAdapter::new(config(Vendor::Gemini, &server)).unwrap();
    let history = vec![ConversationItem::user("list files")];
    let tools = sample_tools();
    let request = TurnRequest {
        system_prompt: Some("sys"),
        history: &history,
        tools: &tools,
    };
    let events = drain(adapter.stream(&request).await.unwrap()).await.unwrap();
    mock.assert_async().await;

    let (item, usage) = fold(&events);
    assert_eq!(item.content, "Sure, ");
    assert_eq!(item.tool_calls.len(), 1);
    assert_eq!(item.tool_calls[0].name, "bash");
    assert!(item.tool_calls[0].id.starts_with("call_"));
    assert_eq!(
        item.tool_calls[0].parse_arguments().unwrap(),
        json!({"command": "ls"})
    );
    assert_eq!(
        usage,
        Usage {
            input_tokens: 18,
            output_tokens: 6
        }
    );
}

#[tokio::test]
async fn gemini_blocked_prompt_fails_the_stream() {
    let mut server = Server::new_async().await;
    let body = sse(&[json!({"promptFeedback":{"blockReason":"SAFETY"}})]);
    let _mock = server
        .mock(
            "POST",
            Matcher::Regex(r"^/models/test-model:streamGenerateContent".into()),
        )
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let adapter = GeminiAdapter::new(config(Vendor::Gemini, &server)).unwrap();
    let history = vec![ConversationItem::user("hi")];
    let request = TurnRequest {
        system_prompt: None,
        history: &history,
        tools: &[],
    };
    let err = drain(adapter.stream(&request).await.unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::Stream { ref reason } if reason.contains("SAFETY")));
}

#[tokio::test]
async fn gemini_echo_reproduces_history_content() {
    let mut server = Server::new_async().await;
    let adapter = GeminiAdapter::new(config(Vendor::Gemini, &server)).unwrap();
    let history = sample_history();
    let request = TurnRequest {
        system_prompt: None,
        history: &history,
        tools: &[],
    };

    // One chunk per part, the way Gemini delivers whole calls.
    let wire = adapter.build_request_body(&request);
    let parts = wire["contents"][1]["parts"].as_array().unwrap();
    let mut frames: Vec<Value> = parts
        .iter()
        .map(|part| json!({"candidates":[{"content":{"role":"model","parts":[part]}}]}))
        .collect();
    frames.push(json!({"candidates":[{"content":{"role":"model","parts":[]},"finishReason":"STOP"}]}));

    let _mock = server
        .mock(
            "POST",
            Matcher::Regex(r"^/models/test-model:streamGenerateContent".into()),
        )
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse(&frames))
        .create_async()
        .await;

    let events = drain(adapter.stream(&request).await.unwrap()).await.unwrap();
    let (echoed, _) = fold(&events);
    let original = &history[1];

    assert_eq!(echoed.content, original.content);
    assert_eq!(call_contents(&echoed), call_contents(original));
    // Vendor-issued ids travel with the calls.
    let ids: Vec<&str> = echoed.tool_calls.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["call_a", "call_b"]);
}
