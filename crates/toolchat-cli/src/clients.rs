//! Subcommand: `toolchat clients` -- list, create and destroy client
//! configurations.

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::catalog;
use crate::config::{ClientEntry, ConfigStore};
use crate::helpers::redacted_options;

/// Print the configured clients as a table, or as JSON with `json`.
pub fn cmd_list(store: &ConfigStore, json: bool) -> Result<()> {
    let config = store.load()?;

    if json {
        let clients: Vec<Value> = config
            .clients
            .iter()
            .map(|(name, entry)| {
                json!({
                    "name": name,
                    "type": entry.client_type,
                    "options": entry.options,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&clients)?);
        return Ok(());
    }

    print!("{}", render_table(store)?);
    Ok(())
}

fn render_table(store: &ConfigStore) -> Result<String> {
    let config = store.load()?;
    let rows: Vec<(&str, &str, String)> = config
        .clients
        .iter()
        .map(|(name, entry)| {
            (
                name.as_str(),
                entry.client_type.as_str(),
                redacted_options(&entry.options).to_string(),
            )
        })
        .collect();

    let name_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(0).max(4);
    let type_width = rows.iter().map(|r| r.1.len()).max().unwrap_or(0).max(4);

    let mut out = format!("{:<name_width$}  {:<type_width$}  OPTIONS\n", "NAME", "TYPE");
    for (name, client_type, options) in rows {
        out.push_str(&format!(
            "{name:<name_width$}  {client_type:<type_width$}  {options}\n"
        ));
    }
    Ok(out)
}

/// Validate and store a new client.
pub fn cmd_create(
    store: &ConfigStore,
    name: &str,
    client_type: &str,
    options: Option<&str>,
) -> Result<()> {
    let raw: Value = match options {
        Some(text) => serde_json::from_str(text).context("Invalid JSON in options")?,
        None => json!({}),
    };

    let factory = catalog::lookup(client_type)?;
    let options = factory
        .validate_options(raw)
        .context("Invalid configuration")?;

    store.insert(
        name,
        ClientEntry {
            client_type: client_type.to_owned(),
            options,
        },
    )?;

    tracing::info!(client = name, client_type, "client created");
    println!("Client '{name}' created.");
    Ok(())
}

/// Remove a stored client.
pub fn cmd_destroy(store: &ConfigStore, name: &str) -> Result<()> {
    store.remove(name)?;
    println!("Client '{name}' destroyed.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_validates_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());

        assert!(cmd_create(&store, "a", "openai", None).is_err());
        assert!(cmd_create(&store, "a", "openai:/v1/chat/completions", Some("{oops")).is_err());
        assert!(
            cmd_create(
                &store,
                "a",
                "openai:/v1/chat/completions",
                Some(r#"{"max_tokens": 0}"#)
            )
            .is_err()
        );
        assert!(!store.exists());

        cmd_create(
            &store,
            "a",
            "openai:/v1/chat/completions",
            Some(r#"{"api_key": "sk-test", "model": "gpt-4o"}"#),
        )
        .unwrap();
        let entry = &store.load().unwrap().clients["a"];
        assert_eq!(entry.options.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn table_redacts_api_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        cmd_create(
            &store,
            "work",
            "anthropic:/v1/messages",
            Some(r#"{"api_key": "sk-ant-secret"}"#),
        )
        .unwrap();

        let table = render_table(&store).unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("NAME"));
        assert!(lines[1].starts_with("work  anthropic:/v1/messages"));
        assert!(lines[1].contains("<redacted>"));
        assert!(!table.contains("sk-ant-secret"));
    }

    #[test]
    fn destroy_removes_the_client() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        assert!(cmd_destroy(&store, "a").is_err());
        cmd_create(&store, "a", "anthropic:/v1/messages", None).unwrap();
        cmd_destroy(&store, "a").unwrap();
        assert!(store.load().unwrap().clients.is_empty());
    }
}
