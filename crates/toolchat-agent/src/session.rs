//! The session loop.
//!
//! A [`Session`] drives one conversation: it appends the user's text, asks
//! the vendor adapter for a streamed turn, folds the normalized events into a
//! streaming assistant item, and when that item requests tools, runs them
//! concurrently and feeds their results back for another round.  The loop
//! ends when the model answers without calling a tool.
//!
//! ```text
//!           submit
//!             │
//!   ┌─> AwaitingModel ──> Streaming ──> (no tool calls) ──> Done
//!   │                        │
//!   └──── ResolvingTools <───┘ (tool calls)
//! ```
//!
//! Adapter and protocol errors abort the turn: the partial streaming item is
//! discarded and the session is ready for the next `submit`.  Tool failures
//! never abort a turn; they become `Error: ...` tool results.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::conversation::{ConversationChange, ConversationStore};
use crate::error::{AgentError, ProtocolError, Result, ToolExecutionError};
use crate::llm::accumulator::EventStream;
use crate::llm::client::{TurnRequest, VendorAdapter};
use crate::llm::types::{ConversationItem, StreamEvent, ToolCallRecord, ToolDescriptor, Usage};
use crate::registry::ToolRegistry;

// ---------------------------------------------------------------------------
// Configuration and results
// ---------------------------------------------------------------------------

/// Configuration for a session.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Instructions sent with every model request, outside the history.
    pub system_prompt: Option<String>,

    /// Maximum model rounds per `submit`.  `None` means no cap.
    pub max_rounds: Option<u32>,
}

/// Where the session is in its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// No turn has run yet, or the last one completed or was cancelled.
    Idle,
    /// Waiting for the vendor to open a stream.
    AwaitingModel,
    /// Folding stream events into the streaming item.
    Streaming,
    /// Running the tools the model requested.
    ResolvingTools,
    /// The last turn failed; the session is still usable.
    Failed,
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// The model produced a final answer.
    Completed,
    /// The caller cancelled the turn.
    Cancelled,
}

/// Summary of one `submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// How the turn ended.
    pub status: TurnStatus,
    /// Number of model rounds that were started.
    pub rounds: u32,
    /// Text of the final assistant item (empty when cancelled).
    pub final_text: String,
    /// Token usage summed across rounds.
    pub usage: Usage,
}

/// Receives a notification after every change to the conversation store.
pub trait SessionObserver: Send + Sync {
    /// Called synchronously on the session task; keep it cheap.
    fn on_update(&self, conversation: &ConversationStore, change: &ConversationChange);
}

/// How one streamed round ended.
enum RoundEnd {
    Completed(Usage),
    Cancelled,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A conversation with one vendor adapter and one tool registry.
pub struct Session {
    id: Uuid,
    store: ConversationStore,
    adapter: Arc<dyn VendorAdapter>,
    registry: Arc<ToolRegistry>,
    tools: Vec<ToolDescriptor>,
    config: SessionConfig,
    observer: Option<Arc<dyn SessionObserver>>,
    phase: TurnPhase,
}

impl Session {
    /// Create a session.  The tool list is fixed for the session's lifetime.
    pub fn new(
        adapter: Arc<dyn VendorAdapter>,
        registry: ToolRegistry,
        config: SessionConfig,
    ) -> Self {
        let tools = registry.describe();
        Self {
            id: Uuid::now_v7(),
            store: ConversationStore::new(),
            adapter,
            registry: Arc::new(registry),
            tools,
            config,
            observer: None,
            phase: TurnPhase::Idle,
        }
    }

    /// Attach an observer that is notified of every store change.
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Unique identifier of this session.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Read-only view of the conversation.
    pub fn conversation(&self) -> &ConversationStore {
        &self.store
    }

    /// Current phase of the turn state machine.
    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// The tools offered to the model.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Run one user turn to completion.
    pub async fn submit(&mut self, text: &str) -> Result<TurnOutcome> {
        self.submit_with_cancel(text, CancellationToken::new()).await
    }

    /// Run one user turn, stopping early when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Adapter`] when the vendor request or stream
    /// fails, and [`AgentError::MaxRoundsExceeded`] when the configured round
    /// cap is hit.  In both cases the history stays consistent and the
    /// session accepts the next `submit`.
    pub async fn submit_with_cancel(
        &mut self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome> {
        let result = self.run_turn(text, &cancel).await;
        self.phase = match &result {
            Ok(_) => TurnPhase::Idle,
            Err(_) => TurnPhase::Failed,
        };
        if let Err(e) = &result {
            tracing::warn!(session = %self.id, error = %e, "turn failed");
        }
        result
    }

    async fn run_turn(&mut self, text: &str, cancel: &CancellationToken) -> Result<TurnOutcome> {
        tracing::info!(
            session = %self.id,
            vendor = %self.adapter.vendor(),
            model = self.adapter.model(),
            tool_count = self.tools.len(),
            "starting turn"
        );

        let index = self.store.append(ConversationItem::user(text))?;
        self.notify(ConversationChange::Appended(index));

        let mut rounds: u32 = 0;
        let mut usage = Usage::default();

        loop {
            if let Some(max_rounds) = self.config.max_rounds
                && rounds >= max_rounds
            {
                return Err(AgentError::MaxRoundsExceeded { max_rounds });
            }
            rounds += 1;
            tracing::debug!(session = %self.id, round = rounds, "round start");

            let round_usage = match self.stream_round(cancel).await? {
                RoundEnd::Completed(round_usage) => round_usage,
                RoundEnd::Cancelled => return Ok(cancelled(rounds, usage)),
            };
            usage.add(round_usage);

            let index = self.store.finalize_streaming()?;
            self.notify(ConversationChange::StreamingFinalized(index));

            let item = &self.store.items()[index];
            if item.tool_calls.is_empty() {
                tracing::info!(
                    session = %self.id,
                    rounds,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "turn completed"
                );
                return Ok(TurnOutcome {
                    status: TurnStatus::Completed,
                    rounds,
                    final_text: item.content.clone(),
                    usage,
                });
            }

            let calls = item.tool_calls.clone();
            tracing::info!(
                session = %self.id,
                round = rounds,
                tool_count = calls.len(),
                tools = ?calls.iter().map(|c| &c.name).collect::<Vec<_>>(),
                "model requested tool calls"
            );

            self.phase = TurnPhase::ResolvingTools;
            let (outputs, was_cancelled) = self.resolve_tools(&calls, cancel).await;
            for (call, output) in calls.iter().zip(outputs) {
                let index = self
                    .store
                    .append(ConversationItem::tool_result(call.id.as_str(), output))?;
                self.notify(ConversationChange::Appended(index));
            }
            if was_cancelled {
                return Ok(cancelled(rounds, usage));
            }
        }
    }

    /// Request one model turn and fold its events into the streaming item.
    async fn stream_round(&mut self, cancel: &CancellationToken) -> Result<RoundEnd> {
        self.phase = TurnPhase::AwaitingModel;
        let request = TurnRequest {
            system_prompt: self.config.system_prompt.as_deref(),
            history: self.store.items(),
            tools: &self.tools,
        };

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            opened = self.adapter.stream(&request) => Some(opened),
        };
        let mut stream: EventStream = match opened {
            None => return Ok(RoundEnd::Cancelled),
            Some(opened) => opened?,
        };

        self.phase = TurnPhase::Streaming;
        self.store.begin_streaming()?;
        self.notify(ConversationChange::StreamingStarted);

        // Vendor index -> position in the streaming item's tool_calls.
        let mut positions: HashMap<usize, usize> = HashMap::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    drop(stream);
                    self.discard_streaming();
                    tracing::info!(session = %self.id, "turn cancelled while streaming");
                    return Ok(RoundEnd::Cancelled);
                }
                next = stream.next() => next,
            };

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    self.discard_streaming();
                    return Err(e.into());
                }
                None => {
                    self.discard_streaming();
                    return Err(AgentError::Internal(
                        "event stream ended without TurnComplete".into(),
                    ));
                }
            };

            tracing::trace!(?event, "stream event");
            match self.apply_event(event, &mut positions) {
                Ok(Some(usage)) => return Ok(RoundEnd::Completed(usage)),
                Ok(None) => self.notify(ConversationChange::StreamingExtended),
                Err(e) => {
                    self.discard_streaming();
                    return Err(e);
                }
            }
        }
    }

    /// Fold one event into the streaming item.  Returns the usage once the
    /// turn is complete.
    fn apply_event(
        &mut self,
        event: StreamEvent,
        positions: &mut HashMap<usize, usize>,
    ) -> Result<Option<Usage>> {
        let item = self.store.streaming_mut()?;
        match event {
            StreamEvent::TextFragment(text) => item.content.push_str(&text),
            StreamEvent::ToolCallStarted { index, id, name } => {
                if positions.contains_key(&index) {
                    return Err(ProtocolError::DuplicateStart { index }.into());
                }
                positions.insert(index, item.tool_calls.len());
                item.tool_calls.push(ToolCallRecord::new(id, name));
            }
            StreamEvent::ToolCallArgumentFragment { index, fragment } => {
                let position = positions
                    .get(&index)
                    .copied()
                    .ok_or(ProtocolError::FragmentBeforeStart { index })?;
                item.tool_calls[position].arguments_text.push_str(&fragment);
            }
            StreamEvent::ToolCallSignature { index, signature } => {
                let position = positions
                    .get(&index)
                    .copied()
                    .ok_or(ProtocolError::SignatureBeforeStart { index })?;
                item.tool_calls[position].signature = Some(signature);
            }
            StreamEvent::TurnComplete { usage } => return Ok(Some(usage)),
        }
        Ok(None)
    }

    /// Run every call concurrently and collect outputs in start order.
    ///
    /// Returns the outputs and whether the caller cancelled.  On cancellation
    /// calls that had not finished are aborted and answered with the
    /// cancellation error, so every call still gets exactly one output.
    async fn resolve_tools(
        &self,
        calls: &[ToolCallRecord],
        cancel: &CancellationToken,
    ) -> (Vec<String>, bool) {
        let handles: Vec<JoinHandle<std::result::Result<String, ToolExecutionError>>> = calls
            .iter()
            .map(|call| {
                let registry = Arc::clone(&self.registry);
                let name = call.name.clone();
                let arguments = call.arguments_text.clone();
                tokio::spawn(async move { registry.invoke(&name, &arguments).await })
            })
            .collect();

        let mut outputs = Vec::with_capacity(calls.len());
        let mut was_cancelled = false;

        for (call, mut handle) in calls.iter().zip(handles) {
            if was_cancelled {
                handle.abort();
                outputs.push(ToolExecutionError::Cancelled.to_tool_output());
                continue;
            }

            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    handle.abort();
                    was_cancelled = true;
                    tracing::info!(session = %self.id, "turn cancelled while running tools");
                    outputs.push(ToolExecutionError::Cancelled.to_tool_output());
                    continue;
                }
                joined = &mut handle => joined,
            };

            let output = match joined {
                Ok(Ok(content)) => content,
                Ok(Err(e)) => {
                    tracing::warn!(tool = %call.name, id = %call.id, error = %e, "tool execution failed");
                    e.to_tool_output()
                }
                Err(e) => {
                    let e = ToolExecutionError::Aborted {
                        tool: call.name.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!(tool = %call.name, id = %call.id, error = %e, "tool task aborted");
                    e.to_tool_output()
                }
            };
            outputs.push(output);
        }

        (outputs, was_cancelled)
    }

    fn discard_streaming(&mut self) {
        if self.store.discard_streaming() {
            self.notify(ConversationChange::StreamingDiscarded);
        }
    }

    fn notify(&self, change: ConversationChange) {
        if let Some(observer) = &self.observer {
            observer.on_update(&self.store, &change);
        }
    }
}

fn cancelled(rounds: u32, usage: Usage) -> TurnOutcome {
    TurnOutcome {
        status: TurnStatus::Cancelled,
        rounds,
        final_text: String::new(),
        usage,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AdapterError, AdapterResult};
    use crate::llm::client::Vendor;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays one fixed event list per round.
    struct Replay {
        rounds: Mutex<Vec<Vec<StreamEvent>>>,
    }

    #[async_trait]
    impl VendorAdapter for Replay {
        fn vendor(&self) -> Vendor {
            Vendor::OpenAi
        }

        fn model(&self) -> &str {
            "replay"
        }

        fn build_request_body(&self, _request: &TurnRequest<'_>) -> serde_json::Value {
            serde_json::Value::Null
        }

        async fn stream(&self, _request: &TurnRequest<'_>) -> AdapterResult<EventStream> {
            let events = self.rounds.lock().unwrap().remove(0);
            Ok(Box::pin(futures::stream::iter(
                events.into_iter().map(Ok::<_, AdapterError>),
            )))
        }
    }

    fn session(rounds: Vec<Vec<StreamEvent>>) -> Session {
        let adapter = Arc::new(Replay {
            rounds: Mutex::new(rounds),
        });
        Session::new(adapter, ToolRegistry::empty(), SessionConfig::default())
    }

    fn complete() -> StreamEvent {
        StreamEvent::TurnComplete {
            usage: Usage {
                input_tokens: 3,
                output_tokens: 2,
            },
        }
    }

    #[tokio::test]
    async fn text_only_turn_completes_in_one_round() {
        let mut session = session(vec![vec![
            StreamEvent::TextFragment("Hel".into()),
            StreamEvent::TextFragment("lo".into()),
            complete(),
        ]]);

        let outcome = session.submit("hi").await.unwrap();
        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.final_text, "Hello");
        assert_eq!(outcome.usage.input_tokens, 3);
        assert_eq!(session.conversation().len(), 2);
        assert_eq!(session.phase(), TurnPhase::Idle);
    }

    #[tokio::test]
    async fn duplicate_start_fails_the_turn() {
        let start = StreamEvent::ToolCallStarted {
            index: 0,
            id: "a".into(),
            name: "bash".into(),
        };
        let mut session = session(vec![vec![start.clone(), start, complete()]]);

        let err = session.submit("hi").await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Adapter(AdapterError::Protocol(ProtocolError::DuplicateStart {
                index: 0
            }))
        ));
        assert_eq!(session.phase(), TurnPhase::Failed);
        assert!(session.conversation().streaming().is_none());
        assert_eq!(session.conversation().len(), 1);
    }

    #[tokio::test]
    async fn stream_without_turn_complete_is_an_error() {
        let mut session = session(vec![vec![StreamEvent::TextFragment("partial".into())]]);
        assert!(session.submit("hi").await.is_err());
        assert_eq!(session.conversation().len(), 1);
    }

    #[tokio::test]
    async fn max_rounds_stops_after_tool_results_are_appended() {
        let call_round = vec![
            StreamEvent::ToolCallStarted {
                index: 0,
                id: "c1".into(),
                name: "missing".into(),
            },
            complete(),
        ];
        let adapter = Arc::new(Replay {
            rounds: Mutex::new(vec![call_round]),
        });
        let mut session = Session::new(
            adapter,
            ToolRegistry::empty(),
            SessionConfig {
                system_prompt: None,
                max_rounds: Some(1),
            },
        );

        let err = session.submit("go").await.unwrap_err();
        assert!(matches!(err, AgentError::MaxRoundsExceeded { max_rounds: 1 }));

        let items = session.conversation().items();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(items[2].content, "Error: unknown tool: missing");
    }
}
