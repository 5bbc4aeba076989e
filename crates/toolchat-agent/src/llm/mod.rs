//! LLM integration layer.
//!
//! This module provides the interface between the session loop and model
//! vendors.  It is organized into:
//!
//! - [`types`] -- Canonical conversation items, tool descriptors, stream events.
//! - [`sse`] -- Server-Sent Events framing shared by every vendor.
//! - [`accumulator`] -- The delta accumulator contract and stream driver.
//! - [`streaming_anthropic`] -- Block-lifecycle accumulator (Anthropic).
//! - [`streaming_openai`] -- Indexed-delta accumulator (OpenAI).
//! - [`streaming_gemini`] -- Chunked function-call accumulator (Gemini).
//! - [`client`] -- The vendor adapter trait, client options, HTTP plumbing.
//! - [`anthropic`], [`openai`], [`gemini`] -- Concrete vendor adapters.

pub mod accumulator;
pub mod anthropic;
pub mod client;
pub mod gemini;
pub mod openai;
pub mod sse;
pub mod streaming_anthropic;
pub mod streaming_gemini;
pub mod streaming_openai;
pub mod types;

use std::sync::Arc;

use crate::error::AdapterResult;

// Re-export the most commonly used types for convenience.
pub use accumulator::{DeltaAccumulator, EventStream, normalize_stream};
pub use anthropic::AnthropicAdapter;
pub use client::{ClientConfig, ClientOptions, TurnRequest, Vendor, VendorAdapter};
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use streaming_anthropic::BlockAccumulator;
pub use streaming_gemini::ChunkAccumulator;
pub use streaming_openai::IndexedDeltaAccumulator;
pub use types::{
    ConversationItem, Role, StreamEvent, ToolCallRecord, ToolDescriptor, Usage,
    parse_arguments_text,
};

/// Build the adapter for the vendor named in `config`.
pub fn build_adapter(config: ClientConfig) -> AdapterResult<Arc<dyn VendorAdapter>> {
    let adapter: Arc<dyn VendorAdapter> = match config.vendor {
        Vendor::Anthropic => Arc::new(AnthropicAdapter::new(config)?),
        Vendor::OpenAi => Arc::new(OpenAiAdapter::new(config)?),
        Vendor::Gemini => Arc::new(GeminiAdapter::new(config)?),
    };
    Ok(adapter)
}
