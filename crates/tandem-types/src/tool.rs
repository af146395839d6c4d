//! Tool trait, tool engine contract and related types.

use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use crate::{FENCE, Message, ToolError};

/// A lazily produced sequence of tool result messages.
pub type MessageStream<'a> = Pin<Box<dyn Stream<Item = Message> + Send + 'a>>;

/// A tool invocation found in an assistant message.
///
/// In markdown form this is a fenced block whose info line starts with the
/// tool name, e.g. ```` ```save notes.txt ````: `tool = "save"`,
/// `args = ["notes.txt"]`, `content` is the block body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolUse {
    pub tool: String,
    pub args: Vec<String>,
    pub content: String,
}

/// Description of a tool, used for prompting and structured tool calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the structured call input.
    pub input_schema: serde_json::Value,
    /// Input fields rendered on the block's info line, in order.
    #[serde(default)]
    pub arg_fields: Vec<String>,
    /// Input field rendered as the block body.
    #[serde(default)]
    pub body_field: Option<String>,
}

impl ToolSpec {
    /// Render a structured call as the equivalent markdown tool block, so
    /// structured and markdown tool formats produce the same log content.
    pub fn render_call(&self, input: &serde_json::Value) -> String {
        let field = |name: &str| match input.get(name) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let mut info = self.name.clone();
        for arg in &self.arg_fields {
            let value = field(arg);
            if !value.is_empty() {
                info.push(' ');
                info.push_str(&value);
            }
        }
        let body = self.body_field.as_deref().map(field).unwrap_or_default();
        format!("{FENCE}{info}\n{body}\n{FENCE}")
    }
}

/// How tools are exposed to the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolFormat {
    /// Tools are invoked through fenced code blocks in the response text.
    #[default]
    Markdown,
    /// Tools are passed to the backend as structured specifications.
    Tool,
}

impl std::str::FromStr for ToolFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" => Ok(Self::Markdown),
            "tool" => Ok(Self::Tool),
            other => Err(format!("unknown tool format '{other}' (expected markdown or tool)")),
        }
    }
}

/// Asks whether a proposed action may proceed.
///
/// Uses `Pin<Box<dyn Future>>` for dyn-compatibility, matching the Tool trait pattern.
pub trait Confirm: Send + Sync {
    fn confirm<'a>(&'a self, action: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

/// Approves every action (`--no-confirm`).
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    fn confirm<'a>(&'a self, _action: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async { true })
    }
}

/// Context provided to tools during execution.
#[derive(Clone)]
pub struct ToolContext {
    /// Working directory for tools that operate on the filesystem.
    pub cwd: PathBuf,
    /// Confirmation callback supplied by the chat loop.
    pub confirm: Arc<dyn Confirm>,
}

/// Trait that all tools must implement.
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// The tool specification (description, input schema, block rendering).
    fn spec(&self) -> ToolSpec;

    /// Code block languages that invoke this tool. Defaults to the name.
    fn block_types(&self) -> Vec<&str> {
        vec![self.name()]
    }

    /// Execute the tool, producing zero or more result messages.
    ///
    /// The context is passed by value to avoid lifetime issues with dyn dispatch.
    fn execute(
        &self,
        tool_use: ToolUse,
        ctx: ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>, ToolError>> + Send + '_>>;
}

/// Executes the tool uses embedded in a model response.
pub trait ToolEngine: Send + Sync {
    /// Lazily execute every runnable tool use in `message`.
    fn execute<'a>(&'a self, message: &'a Message, confirm: Arc<dyn Confirm>) -> MessageStream<'a>;

    /// Whether `content` contains at least one runnable tool use.
    fn has_runnable(&self, content: &str) -> bool;

    /// Specifications of all registered tools.
    fn specs(&self) -> Vec<ToolSpec>;

    /// Check if a tool exists by name.
    fn has_tool(&self, name: &str) -> bool;
}

/// Fetches a URL as text for content inclusion.
pub trait UrlFetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>>;
}
