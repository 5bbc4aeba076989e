//! Client catalog.
//!
//! Maps `plugin:clientType` keys to the factories that validate options and
//! build vendor adapters.  The plugin part may carry the `toolchat-` prefix.

use std::sync::Arc;

use anyhow::{Result, bail};
use serde_json::Value;
use toolchat_agent::{
    AdapterResult, ClientConfig, ClientOptions, Vendor, VendorAdapter, build_adapter,
};

/// Prefix users may put in front of a plugin name.
const PLUGIN_PREFIX: &str = "toolchat-";

/// Builds adapters for one `plugin:clientType` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientFactory {
    pub plugin: &'static str,
    pub client_type: &'static str,
    pub vendor: Vendor,
}

/// Every known client factory.
pub const FACTORIES: &[ClientFactory] = &[
    ClientFactory {
        plugin: "openai",
        client_type: "/v1/chat/completions",
        vendor: Vendor::OpenAi,
    },
    ClientFactory {
        plugin: "anthropic",
        client_type: "/v1/messages",
        vendor: Vendor::Anthropic,
    },
    ClientFactory {
        plugin: "google-genai",
        client_type: "ai.models.generateContent",
        vendor: Vendor::Gemini,
    },
];

impl ClientFactory {
    /// The full `plugin:clientType` key.
    pub fn key(&self) -> String {
        format!("{}:{}", self.plugin, self.client_type)
    }

    /// Check raw options against the options schema.
    pub fn validate_options(&self, options: Value) -> AdapterResult<ClientOptions> {
        ClientOptions::from_value(options)
    }

    /// Build an adapter from validated options.
    pub fn create(&self, options: &ClientOptions) -> AdapterResult<Arc<dyn VendorAdapter>> {
        let config = ClientConfig::resolve(self.vendor, options)?;
        tracing::debug!(client_type = %self.key(), ?config, "creating client");
        build_adapter(config)
    }
}

/// Find the factory for a `plugin:clientType` key.
pub fn lookup(type_key: &str) -> Result<&'static ClientFactory> {
    let Some((plugin, client_type)) = type_key.split_once(':') else {
        bail!("Type must be in the format plugin:type");
    };
    let plugin = plugin.strip_prefix(PLUGIN_PREFIX).unwrap_or(plugin);

    let candidates: Vec<&'static ClientFactory> =
        FACTORIES.iter().filter(|f| f.plugin == plugin).collect();
    if candidates.is_empty() {
        let mut plugins: Vec<&str> = FACTORIES.iter().map(|f| f.plugin).collect();
        plugins.dedup();
        bail!(
            "Plugin '{plugin}' not found. Available plugins: {}",
            plugins.join(", ")
        );
    }

    match candidates.iter().copied().find(|f| f.client_type == client_type) {
        Some(factory) => Ok(factory),
        None => bail!(
            "Plugin '{plugin}' does not support client type '{client_type}'. Available types: {}",
            candidates
                .iter()
                .map(|f| f.client_type)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolchat_agent::AdapterError;

    #[test]
    fn keys_resolve_with_or_without_prefix() {
        assert_eq!(
            lookup("openai:/v1/chat/completions").unwrap().vendor,
            Vendor::OpenAi
        );
        assert_eq!(
            lookup("toolchat-anthropic:/v1/messages").unwrap().vendor,
            Vendor::Anthropic
        );
        assert_eq!(
            lookup("google-genai:ai.models.generateContent").unwrap().vendor,
            Vendor::Gemini
        );
    }

    #[test]
    fn malformed_and_unknown_keys() {
        assert_eq!(
            lookup("openai").unwrap_err().to_string(),
            "Type must be in the format plugin:type"
        );
        assert!(
            lookup("mistral:/v1/chat")
                .unwrap_err()
                .to_string()
                .contains("Available plugins: openai, anthropic, google-genai")
        );
        assert_eq!(
            lookup("anthropic:/v1/complete").unwrap_err().to_string(),
            "Plugin 'anthropic' does not support client type '/v1/complete'. Available types: /v1/messages"
        );
    }

    #[test]
    fn options_schema_rejects_bad_input() {
        let factory = lookup("openai:/v1/chat/completions").unwrap();
        assert!(matches!(
            factory.validate_options(json!({"base_url": "ftp://example.com"})),
            Err(AdapterError::InvalidOptions { .. })
        ));
        assert!(factory.validate_options(json!({"apiKey": "x"})).is_err());

        let options = factory
            .validate_options(json!({"base_url": "http://localhost:11434/v1", "model": "llama3"}))
            .unwrap();
        assert_eq!(options.model.as_deref(), Some("llama3"));
    }

    #[test]
    fn create_builds_the_vendor_adapter() {
        let factory = lookup("google-genai:ai.models.generateContent").unwrap();
        let options = ClientOptions {
            api_key: Some("key".into()),
            ..ClientOptions::default()
        };
        let adapter = factory.create(&options).unwrap();
        assert_eq!(adapter.vendor(), Vendor::Gemini);
        assert_eq!(adapter.model(), "gemini-2.5-flash");
    }
}
