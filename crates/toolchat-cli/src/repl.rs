//! Subcommands: `toolchat chat` (interactive REPL) and `toolchat ask`
//! (one prompt, then exit).
//!
//! Both build a [`Session`] from a configured client and print the
//! conversation as it streams through a [`TerminalRenderer`].

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use toolchat_agent::{
    CancellationToken, ConversationChange, ConversationItem, ConversationStore, Role, Session,
    SessionConfig, SessionObserver, TurnOutcome, TurnStatus,
};

use crate::catalog;
use crate::cli::SessionArgs;
use crate::config::ConfigStore;
use crate::helpers::default_system_prompt;

/// Longest tool result summary printed, in characters.
const SUMMARY_CHARS: usize = 80;

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

struct RenderState<W> {
    out: W,
    /// Bytes of the streaming item's text already written.
    printed: usize,
}

/// Prints streamed assistant text and one notice line per tool call and
/// tool result.
pub struct TerminalRenderer<W> {
    state: Mutex<RenderState<W>>,
}

impl TerminalRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            state: Mutex::new(RenderState { out, printed: 0 }),
        }
    }

    fn render(
        state: &mut RenderState<W>,
        conversation: &ConversationStore,
        change: &ConversationChange,
    ) -> io::Result<()> {
        match *change {
            ConversationChange::StreamingStarted => state.printed = 0,
            ConversationChange::StreamingExtended => {
                if let Some(item) = conversation.streaming()
                    && let Some(new) = item.content.get(state.printed..)
                {
                    state.out.write_all(new.as_bytes())?;
                    state.printed = item.content.len();
                }
            }
            ConversationChange::StreamingFinalized(index) => {
                if state.printed > 0 {
                    writeln!(state.out)?;
                }
                state.printed = 0;
                if let Some(item) = conversation.items().get(index) {
                    for call in &item.tool_calls {
                        writeln!(state.out, "  -> {} {}", call.name, call.arguments_text.trim())?;
                    }
                }
            }
            ConversationChange::StreamingDiscarded => {
                if state.printed > 0 {
                    writeln!(state.out)?;
                }
                state.printed = 0;
            }
            ConversationChange::Appended(index) => {
                if let Some(item) = conversation.items().get(index)
                    && item.role == Role::Tool
                {
                    writeln!(state.out, "  <- {}", summarize(item))?;
                }
            }
        }
        state.out.flush()
    }
}

impl<W: Write + Send> SessionObserver for TerminalRenderer<W> {
    fn on_update(&self, conversation: &ConversationStore, change: &ConversationChange) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Err(e) = Self::render(&mut state, conversation, change) {
            tracing::debug!(error = %e, "failed to write to terminal");
        }
    }
}

/// First line of a tool result, shortened, with the line count when there
/// is more than one.
fn summarize(item: &ConversationItem) -> String {
    let content = item.content.trim_end();
    let first = content.lines().next().unwrap_or("");
    let mut summary: String = first.chars().take(SUMMARY_CHARS).collect();
    if first.chars().count() > SUMMARY_CHARS {
        summary.push_str("...");
    }
    let lines = content.lines().count();
    if lines > 1 {
        summary.push_str(&format!(" ({lines} lines)"));
    }
    summary
}

// ---------------------------------------------------------------------------
// Session setup
// ---------------------------------------------------------------------------

/// A session plus what the banner shows about it.
pub struct ChatSession {
    pub session: Session,
    pub client_name: String,
    pub client_type: String,
}

/// Build a session from the configured client named in `args`.
pub fn build_session(
    store: &ConfigStore,
    args: &SessionArgs,
    observer: Arc<dyn SessionObserver>,
) -> Result<ChatSession> {
    let config = store.load()?;
    let (client_name, entry) = config.select(args.client.as_deref())?;

    let factory = catalog::lookup(&entry.client_type)
        .with_context(|| format!("client '{client_name}' has an unusable type"))?;
    let adapter = factory
        .create(&entry.options)
        .with_context(|| format!("failed to create client '{client_name}'"))?;

    let cwd = std::env::current_dir().context("failed to get current directory")?;
    let registry = toolchat_tools::build_registry(&args.tools, &cwd)?;

    let system_prompt = match &args.system {
        Some(text) => text.clone(),
        None => default_system_prompt(&cwd, &registry.names()),
    };

    info!(
        client = client_name,
        model = adapter.model(),
        tools = ?registry.names(),
        "session ready"
    );

    let session = Session::new(
        adapter,
        registry,
        SessionConfig {
            system_prompt: Some(system_prompt),
            max_rounds: args.max_rounds,
        },
    )
    .with_observer(observer);

    Ok(ChatSession {
        session,
        client_name: client_name.to_owned(),
        client_type: entry.client_type.clone(),
    })
}

/// Run one turn; Ctrl+C while it runs cancels it.
async fn submit_interruptible(session: &mut Session, text: &str) -> Result<TurnOutcome> {
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let result = session.submit_with_cancel(text, cancel).await;
    watcher.abort();
    Ok(result?)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Run the interactive REPL.
pub async fn cmd_chat(store: &ConfigStore, args: &SessionArgs) -> Result<()> {
    let chat = build_session(store, args, Arc::new(TerminalRenderer::stdout()))?;
    let mut session = chat.session;

    let tool_names: Vec<&str> = session.tools().iter().map(|t| t.name.as_str()).collect();
    let tools = if tool_names.is_empty() {
        "none".to_owned()
    } else {
        tool_names.join(", ")
    };
    println!();
    println!("  toolchat v{}", env!("CARGO_PKG_VERSION"));
    println!("  Client: {} ({})", chat.client_name, chat.client_type);
    println!("  Tools: {tools}");
    println!("  Type your message, or 'exit' to quit. Ctrl+C cancels a running turn.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        io::stdout().flush().ok();

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read input")?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                // The stdin reader thread would keep the runtime from shutting down.
                std::process::exit(0);
            }
        };

        let Some(line) = line else {
            println!();
            info!("EOF received, exiting");
            break;
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "quit" || trimmed == "exit" {
            info!("user requested exit");
            break;
        }

        match submit_interruptible(&mut session, trimmed).await {
            Ok(outcome) => {
                if outcome.status == TurnStatus::Cancelled {
                    println!("  (cancelled)");
                }
                info!(
                    rounds = outcome.rounds,
                    input_tokens = outcome.usage.input_tokens,
                    output_tokens = outcome.usage.output_tokens,
                    "turn finished"
                );
            }
            Err(e) => eprintln!("  Error: {e:#}"),
        }
        println!();
    }

    Ok(())
}

/// Send one prompt, print the answer, and exit.
pub async fn cmd_ask(store: &ConfigStore, args: &SessionArgs, prompt: &[String]) -> Result<()> {
    let chat = build_session(store, args, Arc::new(TerminalRenderer::stdout()))?;
    let mut session = chat.session;

    let outcome = submit_interruptible(&mut session, &prompt.join(" ")).await?;
    if outcome.status == TurnStatus::Cancelled {
        bail!("cancelled");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use toolchat_agent::{
        AdapterResult, EventStream, StreamEvent, ToolRegistry, TurnRequest, Usage, Vendor,
        VendorAdapter,
    };

    struct Scripted {
        rounds: Mutex<VecDeque<Vec<StreamEvent>>>,
    }

    #[async_trait]
    impl VendorAdapter for Scripted {
        fn vendor(&self) -> Vendor {
            Vendor::Anthropic
        }

        fn model(&self) -> &str {
            "scripted"
        }

        fn build_request_body(&self, _request: &TurnRequest<'_>) -> Value {
            json!({})
        }

        async fn stream(&self, _request: &TurnRequest<'_>) -> AdapterResult<EventStream> {
            let events = self.rounds.lock().unwrap().pop_front().unwrap();
            Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
        }
    }

    impl TerminalRenderer<Vec<u8>> {
        fn output(&self) -> String {
            String::from_utf8(self.state.lock().unwrap().out.clone()).unwrap()
        }
    }

    fn text(s: &str) -> StreamEvent {
        StreamEvent::TextFragment(s.into())
    }

    fn done() -> StreamEvent {
        StreamEvent::TurnComplete {
            usage: Usage::default(),
        }
    }

    #[tokio::test]
    async fn renders_text_and_tool_notices() {
        let adapter = Arc::new(Scripted {
            rounds: Mutex::new(VecDeque::from([
                vec![
                    text("Let me "),
                    text("look."),
                    StreamEvent::ToolCallStarted {
                        index: 0,
                        id: "call_1".into(),
                        name: "grep".into(),
                    },
                    StreamEvent::ToolCallArgumentFragment {
                        index: 0,
                        fragment: r#"{"q":"x"}"#.into(),
                    },
                    done(),
                ],
                vec![text("Nothing found."), done()],
            ])),
        });
        let renderer = Arc::new(TerminalRenderer::new(Vec::new()));
        let mut session = Session::new(adapter, ToolRegistry::empty(), SessionConfig::default())
            .with_observer(renderer.clone());

        session.submit("find x").await.unwrap();

        assert_eq!(
            renderer.output(),
            "Let me look.\n  -> grep {\"q\":\"x\"}\n  <- Error: unknown tool: grep\nNothing found.\n"
        );
    }

    #[test]
    fn summary_is_first_line_with_count() {
        let item = ConversationItem::tool_result("c", "a.txt\nb.txt\nc.txt\n");
        assert_eq!(summarize(&item), "a.txt (3 lines)");

        let long = ConversationItem::tool_result("c", "x".repeat(100));
        assert_eq!(summarize(&long), format!("{}...", "x".repeat(80)));
    }
}
