//! Save and append tools: write the block body to the path on the info line.

use crate::resolve_path;
use tandem_types::{Message, Tool, ToolContext, ToolError, ToolSpec, ToolUse};
use tokio::io::AsyncWriteExt;

/// Whether the block body replaces or extends the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Overwrite,
    Append,
}

/// Tool for creating, overwriting or appending to files.
pub struct SaveTool {
    mode: SaveMode,
}

impl SaveTool {
    pub fn save() -> Self {
        Self {
            mode: SaveMode::Overwrite,
        }
    }

    pub fn append() -> Self {
        Self {
            mode: SaveMode::Append,
        }
    }
}

impl Tool for SaveTool {
    fn name(&self) -> &str {
        match self.mode {
            SaveMode::Overwrite => "save",
            SaveMode::Append => "append",
        }
    }

    fn spec(&self) -> ToolSpec {
        let description = match self.mode {
            SaveMode::Overwrite => {
                "Write content to a file. Creates the file and any parent directories \
                 if they don't exist. Overwrites existing files."
            }
            SaveMode::Append => {
                "Append content to the end of a file, creating it if it doesn't exist."
            }
        };
        ToolSpec {
            name: self.name().to_string(),
            description: description.to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "required": ["path", "content"],
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the file, relative to the working directory"
                    },
                    "content": {
                        "type": "string",
                        "description": "The content to write"
                    }
                }
            }),
            arg_fields: vec!["path".to_string()],
            body_field: Some("content".to_string()),
        }
    }

    fn execute(
        &self,
        tool_use: ToolUse,
        ctx: ToolContext,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<Message>, ToolError>> + Send + '_>>
    {
        Box::pin(async move {
            let Some(raw_path) = tool_use.args.first() else {
                return Err(ToolError::InvalidInput {
                    tool: self.name().into(),
                    message: "missing file path".into(),
                });
            };
            let path = resolve_path(raw_path, &ctx.cwd);

            let mut content = tool_use.content;
            if !content.ends_with('\n') {
                content.push('\n');
            }

            let verb = match self.mode {
                SaveMode::Overwrite => "Save to",
                SaveMode::Append => "Append to",
            };
            if !ctx.confirm.confirm(&format!("{verb} {}?", path.display())).await {
                return Ok(vec![Message::system(format!(
                    "{verb} {raw_path} cancelled: declined by user."
                ))]);
            }

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    ToolError::ExecutionFailed(format!("Failed to create dirs: {e}"))
                })?;
            }

            let io_err = |e: std::io::Error| ToolError::ExecutionFailed(format!("{raw_path}: {e}"));
            match self.mode {
                SaveMode::Overwrite => {
                    tokio::fs::write(&path, &content).await.map_err(io_err)?;
                    tracing::debug!("Saved {} bytes to {}", content.len(), path.display());
                    Ok(vec![Message::system(format!("Saved to {raw_path}"))])
                }
                SaveMode::Append => {
                    let mut file = tokio::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)
                        .await
                        .map_err(io_err)?;
                    file.write_all(content.as_bytes()).await.map_err(io_err)?;
                    file.flush().await.map_err(io_err)?;
                    tracing::debug!("Appended {} bytes to {}", content.len(), path.display());
                    Ok(vec![Message::system(format!("Appended to {raw_path}"))])
                }
            }
        })
    }
}
