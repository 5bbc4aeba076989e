//! Directory listing tool.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Value, json};
use toolchat_agent::{Tool, ToolError};

use crate::shell::{DEFAULT_TIMEOUT_SECS, run_shell};

/// Arguments used when the model passes none.
const DEFAULT_LS_ARGS: &str = "-la";

/// Runs `ls` in the working directory.
#[derive(Debug, Clone)]
pub struct LsTool {
    working_dir: PathBuf,
}

impl LsTool {
    /// Create an `ls` tool rooted at `working_dir`.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for LsTool {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "Lists the contents of the current directory"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "args": {
                    "type": "string",
                    "description": "Arguments passed to ls, e.g. \"-la\" or a path. Defaults to \"-la\"."
                }
            }
        })
    }

    async fn run(&self, arguments: Value) -> Result<String, ToolError> {
        let args = match arguments.get("args") {
            None | Some(Value::Null) => "",
            Some(Value::String(s)) => s.trim(),
            Some(_) => {
                return Err(ToolError::InvalidArguments("`args` must be a string".into()));
            }
        };
        let args = if args.is_empty() { DEFAULT_LS_ARGS } else { args };

        let output = run_shell(
            &format!("ls {args}"),
            &self.working_dir,
            DEFAULT_TIMEOUT_SECS,
        )
        .await?;
        Ok(output.into_text())
    }
}
