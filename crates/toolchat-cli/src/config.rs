//! On-disk client configuration (`config.toml`).
//!
//! ```toml
//! [clients.work]
//! type = "anthropic:/v1/messages"
//!
//! [clients.work.options]
//! model = "claude-sonnet-4-20250514"
//! ```
//!
//! The file lives in the configuration directory: `$TOOLCHAT_CONFIG_DIR`,
//! else `$XDG_CONFIG_HOME/toolchat`, else `$HOME/.config/toolchat`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use toolchat_agent::ClientOptions;

/// File name inside the configuration directory.
const CONFIG_FILE: &str = "config.toml";

/// One configured client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEntry {
    /// Catalog key, `plugin:clientType`.
    #[serde(rename = "type")]
    pub client_type: String,

    /// Options validated against the client factory.
    #[serde(default)]
    pub options: ClientOptions,
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Clients by name, kept sorted.
    #[serde(default)]
    pub clients: BTreeMap<String, ClientEntry>,
}

impl ConfigFile {
    /// The named client, or the first one alphabetically.
    pub fn select(&self, name: Option<&str>) -> Result<(&str, &ClientEntry)> {
        match name {
            Some(name) => self
                .clients
                .get_key_value(name)
                .map(|(k, v)| (k.as_str(), v))
                .with_context(|| format!("Client '{name}' not found.")),
            None => self
                .clients
                .iter()
                .next()
                .map(|(k, v)| (k.as_str(), v))
                .context("No client configured. Create one with `toolchat clients create`."),
        }
    }
}

/// Reads and writes `config.toml` in one directory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// A store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join(CONFIG_FILE),
        }
    }

    /// A store in the directory resolved from the process environment.
    pub fn from_env() -> Result<Self> {
        let dir = resolve_config_dir(|name| std::env::var(name).ok())
            .context("cannot locate a configuration directory; set TOOLCHAT_CONFIG_DIR")?;
        Ok(Self::new(dir))
    }

    /// Path of the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the configuration file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the file; a missing file is an empty configuration.
    pub fn load(&self) -> Result<ConfigFile> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ConfigFile::default()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read {}", self.path.display()));
            }
        };
        toml::from_str(&content).with_context(|| format!("invalid {}", self.path.display()))
    }

    /// Write the file, creating the directory if needed.
    pub fn save(&self, config: &ConfigFile) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(config).context("failed to serialize config")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), clients = config.clients.len(), "config saved");
        Ok(())
    }

    /// Add a client, refusing duplicate names.
    pub fn insert(&self, name: &str, entry: ClientEntry) -> Result<()> {
        let mut config = self.load()?;
        if config.clients.contains_key(name) {
            bail!("Client '{name}' already exists");
        }
        config.clients.insert(name.to_owned(), entry);
        self.save(&config)
    }

    /// Remove a client.
    pub fn remove(&self, name: &str) -> Result<ClientEntry> {
        if !self.exists() {
            bail!("Configuration file not found. No clients to destroy.");
        }
        let mut config = self.load()?;
        let entry = config
            .clients
            .remove(name)
            .with_context(|| format!("Client '{name}' not found."))?;
        self.save(&config)?;
        Ok(entry)
    }
}

/// Resolve the configuration directory using `env` for variable lookup.
pub fn resolve_config_dir(env: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    let non_empty = |name: &str| env(name).filter(|v| !v.is_empty());

    if let Some(dir) = non_empty("TOOLCHAT_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Some(xdg) = non_empty("XDG_CONFIG_HOME") {
        return Some(Path::new(&xdg).join("toolchat"));
    }
    non_empty("HOME").map(|home| Path::new(&home).join(".config").join("toolchat"))
}
