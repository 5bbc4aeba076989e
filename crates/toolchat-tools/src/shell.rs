//! Shell tool -- run a command through `sh -c` in the working directory.
//!
//! Commands run with a timeout and `kill_on_drop`, so a cancelled or timed
//! out call never leaves the child behind.  Stdout and stderr are each
//! truncated to [`MAX_OUTPUT_BYTES`] (100 KB).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use toolchat_agent::{Tool, ToolError};
use tracing::{debug, warn};

/// Default command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum output size in bytes (100 KB), applied to stdout and stderr
/// independently.
pub const MAX_OUTPUT_BYTES: usize = 100 * 1024;

/// Captured result of one shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Text handed back to the model.
    ///
    /// A successful command yields stdout, or stderr when stdout is empty.  A
    /// failed command yields both streams concatenated, or a status line when
    /// it printed nothing.
    pub fn into_text(self) -> String {
        if self.success() {
            if !self.stdout.is_empty() {
                return self.stdout;
            }
            return self.stderr;
        }
        if self.stdout.is_empty() && self.stderr.is_empty() {
            return match self.exit_code {
                Some(code) => format!("command exited with status {code}"),
                None => "command terminated by signal".to_owned(),
            };
        }
        self.stdout + &self.stderr
    }
}

/// Run `command` with `sh -c` in `working_dir`.
pub(crate) async fn run_shell(
    command: &str,
    working_dir: &Path,
    timeout_secs: u64,
) -> Result<CommandOutput, ToolError> {
    debug!(
        command = command,
        working_dir = %working_dir.display(),
        timeout_secs = timeout_secs,
        "executing shell command"
    );

    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(working_dir)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    // On timeout the child is dropped and killed via `kill_on_drop(true)`.
    let result =
        tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await;

    match result {
        Ok(Ok(output)) => {
            let exit_code = output.status.code();
            let (stdout, stdout_truncated) = truncate_output(&output.stdout);
            let (stderr, stderr_truncated) = truncate_output(&output.stderr);
            debug!(
                exit_code = ?exit_code,
                stdout_truncated = stdout_truncated,
                stderr_truncated = stderr_truncated,
                "command completed"
            );
            Ok(CommandOutput {
                exit_code,
                stdout,
                stderr,
            })
        }
        Ok(Err(e)) => Err(ToolError::Io(e)),
        Err(_) => {
            warn!(
                command = command,
                timeout_secs = timeout_secs,
                "command timed out"
            );
            Err(ToolError::Timeout {
                seconds: timeout_secs,
            })
        }
    }
}

/// Truncate raw command output to [`MAX_OUTPUT_BYTES`], converting to a
/// lossy UTF-8 string.  Returns `(output_string, was_truncated)`.
fn truncate_output(raw: &[u8]) -> (String, bool) {
    if raw.len() <= MAX_OUTPUT_BYTES {
        (String::from_utf8_lossy(raw).into_owned(), false)
    } else {
        let truncated = &raw[..MAX_OUTPUT_BYTES];
        let mut s = String::from_utf8_lossy(truncated).into_owned();
        s.push_str("\n... [output truncated at 100 KB]");
        (s, true)
    }
}

// ---------------------------------------------------------------------------
// bash
// ---------------------------------------------------------------------------

/// Executes arbitrary shell commands on the host.  There is no sandbox.
#[derive(Debug, Clone)]
pub struct BashTool {
    working_dir: PathBuf,
    timeout_secs: u64,
}

impl BashTool {
    /// Create a bash tool that runs commands in `working_dir`.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set the command timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute bash commands on the host system."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to execute."
                }
            },
            "required": ["command"]
        })
    }

    async fn run(&self, arguments: Value) -> Result<String, ToolError> {
        let command = arguments
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ToolError::InvalidArguments("missing required string field `command`".into())
            })?;

        let output = run_shell(command, &self.working_dir, self.timeout_secs).await?;
        Ok(output.into_text())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
