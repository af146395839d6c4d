//! Shell tool: runs the block body with `bash -c`.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tandem_types::{
    Message, Tool, ToolContext, ToolError, ToolSpec, ToolUse, codeblock, shorten,
    truncate_string,
};
use tokio::process::Command;

/// Maximum length of each output stream before truncation.
const MAX_OUTPUT_BYTES: usize = 30_000;

/// Default timeout in milliseconds.
const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Tool for executing shell commands with timeout and output truncation.
pub struct ShellTool {
    /// Persistent working directory across calls.
    cwd: Mutex<Option<PathBuf>>,
    timeout_ms: u64,
}

impl Default for ShellTool {
    fn default() -> Self {
        Self {
            cwd: Mutex::new(None),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl ShellTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    async fn run(&self, command: &str, ctx: &ToolContext) -> Result<Message, ToolError> {
        let cwd = self
            .cwd
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| ctx.cwd.clone());

        tracing::debug!("Running shell command in {}: {}", cwd.display(), shorten(command, 80));
        let result = tokio::time::timeout(
            Duration::from_millis(self.timeout_ms),
            Command::new("bash")
                .arg("-c")
                .arg(command)
                .current_dir(&cwd)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed(format!(
                    "Failed to spawn command: {e}"
                )));
            }
            Err(_) => {
                return Err(ToolError::Timeout {
                    timeout_ms: self.timeout_ms,
                });
            }
        };

        if let Some(dir) = extract_cd_target(command) {
            let new_cwd = if dir.starts_with('/') {
                PathBuf::from(dir)
            } else {
                cwd.join(dir)
            };
            if new_cwd.is_dir() {
                *self.cwd.lock().unwrap_or_else(PoisonError::into_inner) = Some(new_cwd);
            }
        }

        let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code().unwrap_or(-1);

        let mut text = format!("Ran command: `{}`\n", command.trim());
        for (label, stream) in [("stdout", &mut stdout), ("stderr", &mut stderr)] {
            if stream.trim().is_empty() {
                continue;
            }
            if stream.len() > MAX_OUTPUT_BYTES {
                truncate_string(stream, MAX_OUTPUT_BYTES);
                stream.push_str("\n(output truncated)");
            }
            text.push('\n');
            text.push_str(&codeblock(label, stream.trim_end()));
            text.push('\n');
        }
        if stdout.trim().is_empty() && stderr.trim().is_empty() {
            text.push_str("\nNo output\n");
        }
        if exit_code != 0 {
            text.push_str(&format!("\nReturn code: {exit_code}"));
        }
        Ok(Message::system(text.trim_end()))
    }
}

impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "shell".to_string(),
            description: "Execute a bash command. The working directory persists between calls. \
                          Output is truncated at 30K characters. Commands time out after 2 minutes."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "required": ["command"],
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The bash command to execute"
                    }
                }
            }),
            arg_fields: Vec::new(),
            body_field: Some("command".to_string()),
        }
    }

    fn block_types(&self) -> Vec<&str> {
        vec!["shell", "bash", "sh"]
    }

    fn execute(
        &self,
        tool_use: ToolUse,
        ctx: ToolContext,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<Message>, ToolError>> + Send + '_>>
    {
        Box::pin(async move {
            let command = tool_use.content.trim();
            if command.is_empty() {
                return Err(ToolError::InvalidInput {
                    tool: "shell".into(),
                    message: "empty command".into(),
                });
            }
            if !ctx.confirm.confirm(&format!("Run command?\n{command}")).await {
                return Ok(vec![Message::system("Command not run: declined by user.")]);
            }
            Ok(vec![self.run(command, &ctx).await?])
        })
    }
}

/// Extract the target directory from a simple `cd` command.
fn extract_cd_target(command: &str) -> Option<&str> {
    let trimmed = command.trim();
    let target = trimmed.strip_prefix("cd ")?.trim();
    // Only handle simple cases, not `cd foo && something`
    if target.contains(['&', ';', '|', '\n']) {
        return None;
    }
    Some(target)
}
