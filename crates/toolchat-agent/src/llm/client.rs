//! Vendor adapter contract and shared HTTP plumbing.
//!
//! A [`VendorAdapter`] serializes the canonical history into one vendor's
//! request format, opens a streaming HTTP request, and hands back an
//! [`EventStream`] of normalized events.  The three concrete adapters live in
//! [`super::anthropic`], [`super::openai`] and [`super::gemini`]; this module
//! holds what they share: connection settings, option validation, and the
//! request/status handling.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AdapterError, AdapterResult};
use crate::llm::accumulator::{DeltaAccumulator, EventStream, normalize_stream};
use crate::llm::types::{ConversationItem, ToolDescriptor};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default Anthropic API base URL.
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Gemini API base URL.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Anthropic's `max_tokens` when the client options set none; the field is
/// mandatory there.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Connect timeout for vendor requests.  There is no overall timeout because
/// a streamed turn may legitimately run for minutes.
const CONNECT_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Vendor enum
// ---------------------------------------------------------------------------

/// Identifies which vendor API an adapter targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    /// Anthropic Messages API.
    Anthropic,
    /// OpenAI Chat Completions API (also covers OpenAI-compatible endpoints).
    OpenAi,
    /// Google Gemini `generateContent` API.
    Gemini,
}

impl Vendor {
    /// Short lowercase name used in logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    /// Environment variable consulted when no API key is configured.
    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Base URL used when the options do not override it.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Anthropic => ANTHROPIC_BASE_URL,
            Self::OpenAi => OPENAI_BASE_URL,
            Self::Gemini => GEMINI_BASE_URL,
        }
    }

    /// Model used when the options do not name one.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::OpenAi => "gpt-4o-mini",
            Self::Gemini => "gemini-2.5-flash",
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Client options
// ---------------------------------------------------------------------------

/// User-supplied options for a configured client.
///
/// This is the schema every client factory validates against; unknown keys
/// are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientOptions {
    /// API key; falls back to the vendor's environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override of the vendor base URL (e.g. a local OpenAI-compatible server).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Maximum tokens per response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ClientOptions {
    /// Deserialize and validate options from a JSON value.
    pub fn from_value(value: Value) -> AdapterResult<Self> {
        let options: Self =
            serde_json::from_value(value).map_err(|e| AdapterError::InvalidOptions {
                reason: e.to_string(),
            })?;
        options.validate()?;
        Ok(options)
    }

    /// Semantic checks beyond the serde schema.
    pub fn validate(&self) -> AdapterResult<()> {
        if let Some(base_url) = &self.base_url {
            let parsed = url::Url::parse(base_url).map_err(|e| AdapterError::InvalidOptions {
                reason: format!("base_url `{base_url}` is not a valid URL: {e}"),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AdapterError::InvalidOptions {
                    reason: format!("base_url `{base_url}` must use http or https"),
                });
            }
        }
        if self.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(AdapterError::InvalidOptions {
                reason: "model must not be empty".into(),
            });
        }
        if self.max_tokens == Some(0) {
            return Err(AdapterError::InvalidOptions {
                reason: "max_tokens must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// Resolved settings for connecting to a single vendor endpoint.
#[derive(Clone)]
pub struct ClientConfig {
    /// Which vendor this configuration targets.
    pub vendor: Vendor,
    /// API key for authentication.
    pub api_key: String,
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Maximum tokens per response.  `None` leaves the vendor's default in
    /// place, except on Anthropic where [`DEFAULT_MAX_TOKENS`] is sent.
    pub max_tokens: Option<u32>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("vendor", &self.vendor)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ClientConfig {
    /// Create a configuration with the vendor's default base URL.
    pub fn new(vendor: Vendor, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            vendor,
            api_key: api_key.into(),
            base_url: vendor.default_base_url().to_owned(),
            model: model.into(),
            max_tokens: None,
        }
    }

    /// Point the configuration at a different endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Resolve options against defaults and the process environment.
    pub fn resolve(vendor: Vendor, options: &ClientOptions) -> AdapterResult<Self> {
        Self::resolve_with(vendor, options, |name| std::env::var(name).ok())
    }

    /// Resolve options using `env` to look up the fallback API key.
    pub fn resolve_with(
        vendor: Vendor,
        options: &ClientOptions,
        env: impl Fn(&str) -> Option<String>,
    ) -> AdapterResult<Self> {
        options.validate()?;

        let api_key = options
            .api_key
            .clone()
            .or_else(|| env(vendor.api_key_env()))
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AdapterError::MissingApiKey {
                vendor: vendor.name().into(),
                env_var: vendor.api_key_env().into(),
            })?;

        let model = options
            .model
            .clone()
            .unwrap_or_else(|| vendor.default_model().to_owned());

        let mut config = Self::new(vendor, api_key, model);
        if let Some(base_url) = &options.base_url {
            config = config.with_base_url(base_url.as_str());
        }
        config.max_tokens = options.max_tokens;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Adapter contract
// ---------------------------------------------------------------------------

/// Everything an adapter needs to produce one model turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    /// Session-level instructions, sent outside the history.
    pub system_prompt: Option<&'a str>,
    /// The finalized conversation so far.  Never mutated by adapters.
    pub history: &'a [ConversationItem],
    /// Tools the model may call.
    pub tools: &'a [ToolDescriptor],
}

/// Translate canonical conversations to one vendor and back.
#[async_trait]
pub trait VendorAdapter: Send + Sync {
    /// Which vendor this adapter talks to.
    fn vendor(&self) -> Vendor;

    /// The model this adapter requests.
    fn model(&self) -> &str;

    /// Serialize a turn request into the vendor's JSON body.
    fn build_request_body(&self, request: &TurnRequest<'_>) -> Value;

    /// Start a streaming turn.
    ///
    /// Errors returned here (transport, status) happen before any event; the
    /// returned stream may still yield an error later.
    async fn stream(&self, request: &TurnRequest<'_>) -> AdapterResult<EventStream>;
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

/// Shared HTTP client used by the concrete adapters.
#[derive(Debug, Clone)]
pub(crate) struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub(crate) fn new() -> AdapterResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AdapterError::Request {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http })
    }

    /// POST `body` to `url` and drive `accumulator` over the SSE response.
    pub(crate) async fn open_stream<A>(
        &self,
        vendor: Vendor,
        url: &str,
        mut headers: HeaderMap,
        body: &Value,
        accumulator: A,
    ) -> AdapterResult<EventStream>
    where
        A: DeltaAccumulator + 'static,
    {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        tracing::debug!(url = %url, model = %body["model"], vendor = vendor.name(), "sending LLM request");

        let resp = self.http.post(url).headers(headers).json(body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(vendor = vendor.name(), status = status.as_u16(), "LLM request rejected");
            return Err(AdapterError::Status {
                vendor: vendor.name().into(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(normalize_stream(resp.bytes_stream(), accumulator))
    }
}

/// Build a header value, mapping invalid characters to a request error.
pub(crate) fn header_value(name: &str, value: &str) -> AdapterResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| AdapterError::Request {
        reason: format!("invalid {name} header: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
