//! Messages API wire types and conversion from conversation messages.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tandem_types::{Message, Role, ToolSpec};

/// A request to the Messages API.
#[derive(Debug, Clone, Serialize)]
pub struct WireRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,
    pub stream: bool,
}

/// A user or assistant turn on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    pub role: WireRole,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    User,
    Assistant,
}

/// A block of content within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Block types this client does not use (thinking, server tools).
    #[serde(other)]
    Unknown,
}

/// Base64-encoded image data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

/// A tool definition sent to the API.
#[derive(Debug, Clone, Serialize)]
pub struct WireTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl From<&ToolSpec> for WireTool {
    fn from(spec: &ToolSpec) -> Self {
        Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            input_schema: spec.input_schema.clone(),
        }
    }
}

/// A non-streaming response from the Messages API.
#[derive(Debug, Clone, Deserialize)]
pub struct WireResponse {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// Convert conversation messages into the `system` parameter and wire turns.
///
/// Leading system messages form the `system` parameter. Later system
/// messages (tool output, notices) become user text wrapped in `<system>`
/// tags. Consecutive turns with the same role are merged. Image files are
/// attached as base64 blocks; relative paths resolve against `file_root`.
pub async fn to_wire(messages: &[Message], file_root: &Path) -> (Option<String>, Vec<WireMessage>) {
    let leading = messages
        .iter()
        .take_while(|m| m.role == Role::System)
        .count();
    let system = (leading > 0).then(|| {
        messages[..leading]
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    });

    let mut turns: Vec<WireMessage> = Vec::new();
    for msg in &messages[leading..] {
        let (role, text) = match msg.role {
            Role::System => (WireRole::User, format!("<system>\n{}\n</system>", msg.content)),
            Role::User => (WireRole::User, msg.content.clone()),
            Role::Assistant => (WireRole::Assistant, msg.content.clone()),
        };

        let mut blocks = Vec::new();
        if !text.trim().is_empty() {
            blocks.push(ContentBlock::Text { text });
        }
        for file in &msg.files {
            if let Some(block) = image_block(&file_root.join(file)).await {
                blocks.push(block);
            }
        }
        if blocks.is_empty() {
            continue;
        }

        match turns.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => turns.push(WireMessage {
                role,
                content: blocks,
            }),
        }
    }
    (system, turns)
}

async fn image_block(path: &Path) -> Option<ContentBlock> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let media_type = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => {
            tracing::warn!("Skipping unsupported attachment {}", path.display());
            return None;
        }
    };
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(ContentBlock::Image {
            source: ImageSource {
                source_type: "base64".to_string(),
                media_type: media_type.to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
        }),
        Err(e) => {
            tracing::warn!("Failed to read attachment {}: {}", path.display(), e);
            None
        }
    }
}
