//! The conversation store.
//!
//! Holds the finalized history of a session plus at most one *streaming*
//! assistant item that is still being filled by the current model turn.
//! Presentation layers get read-only access; only the session mutates it.

use crate::error::{AgentError, Result};
use crate::llm::types::{ConversationItem, Role};

/// What changed in the store, reported to observers after each mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationChange {
    /// A finalized item was appended at this index.
    Appended(usize),
    /// A new streaming assistant item was opened.
    StreamingStarted,
    /// The streaming item received text or tool call data.
    StreamingExtended,
    /// The streaming item was finalized at this index.
    StreamingFinalized(usize),
    /// The streaming item was dropped without being finalized.
    StreamingDiscarded,
}

/// Ordered conversation history.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    items: Vec<ConversationItem>,
    streaming: Option<ConversationItem>,
}

impl ConversationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The finalized items, in order.
    pub fn items(&self) -> &[ConversationItem] {
        &self.items
    }

    /// Number of finalized items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether there are no finalized items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The most recent finalized item.
    pub fn last(&self) -> Option<&ConversationItem> {
        self.items.last()
    }

    /// The assistant item currently being streamed, if any.
    pub fn streaming(&self) -> Option<&ConversationItem> {
        self.streaming.as_ref()
    }

    /// Finalized items followed by the streaming item, for rendering.
    pub fn iter_with_streaming(&self) -> impl Iterator<Item = &ConversationItem> {
        self.items.iter().chain(self.streaming.iter())
    }

    /// Id of the next tool call that still needs a result, if any.
    ///
    /// Looks at the most recent assistant item and counts the tool items that
    /// follow it.
    pub fn next_unanswered_call(&self) -> Option<&str> {
        let (position, assistant) = self
            .items
            .iter()
            .enumerate()
            .rev()
            .find(|(_, item)| item.role == Role::Assistant)?;
        let answered = self.items[position + 1..]
            .iter()
            .filter(|item| item.role == Role::Tool)
            .count();
        assistant
            .tool_calls
            .get(answered)
            .map(|call| call.id.as_str())
    }

    // -- Mutation (session only) ---------------------------------------------

    /// Append a user or assistant item.
    pub(crate) fn append(&mut self, item: ConversationItem) -> Result<usize> {
        if self.streaming.is_some() {
            return Err(AgentError::Internal(
                "cannot append while an item is streaming".into(),
            ));
        }
        if item.role == Role::Tool {
            return self.append_tool_result(item);
        }
        self.items.push(item);
        Ok(self.items.len() - 1)
    }

    /// Append a tool-result item, which must answer the next unanswered call.
    fn append_tool_result(&mut self, item: ConversationItem) -> Result<usize> {
        let expected = self.next_unanswered_call();
        if expected.is_none() || expected != item.tool_call_id.as_deref() {
            return Err(AgentError::Internal(format!(
                "tool result for {:?} does not answer the next pending call {:?}",
                item.tool_call_id, expected
            )));
        }
        self.items.push(item);
        Ok(self.items.len() - 1)
    }

    /// Open an empty streaming assistant item.
    pub(crate) fn begin_streaming(&mut self) -> Result<()> {
        if self.streaming.is_some() {
            return Err(AgentError::Internal(
                "a streaming item is already open".into(),
            ));
        }
        self.streaming = Some(ConversationItem::assistant(String::new()));
        Ok(())
    }

    /// Mutable access to the streaming item.
    pub(crate) fn streaming_mut(&mut self) -> Result<&mut ConversationItem> {
        self.streaming
            .as_mut()
            .ok_or_else(|| AgentError::Internal("no streaming item is open".into()))
    }

    /// Move the streaming item into the finalized history.
    pub(crate) fn finalize_streaming(&mut self) -> Result<usize> {
        let item = self
            .streaming
            .take()
            .ok_or_else(|| AgentError::Internal("no streaming item to finalize".into()))?;
        self.items.push(item);
        Ok(self.items.len() - 1)
    }

    /// Drop the streaming item.  Returns whether one was open.
    pub(crate) fn discard_streaming(&mut self) -> bool {
        self.streaming.take().is_some()
    }
}
