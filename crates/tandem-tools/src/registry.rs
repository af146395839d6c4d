//! Tool registry: dispatch fenced blocks to tools by block type.

use crate::parse::parse_tool_uses;
use crate::{SaveTool, ShellTool};
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tandem_types::{
    Confirm, Message, MessageStream, Tool, ToolContext, ToolEngine, ToolSpec, ToolUse,
};

/// Registry of available tools, keyed by name and by block type.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Block type → tool name.
    blocks: HashMap<String, String>,
    cwd: PathBuf,
}

impl ToolRegistry {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            tools: HashMap::new(),
            blocks: HashMap::new(),
            cwd: cwd.into(),
        }
    }

    /// Create a registry with the local built-in tools (shell, save, append).
    ///
    /// The browse tool needs an HTTP client and is registered separately.
    pub fn with_builtins(cwd: impl Into<PathBuf>) -> Self {
        let mut registry = Self::new(cwd);
        registry.register(Arc::new(ShellTool::new()));
        registry.register(Arc::new(SaveTool::save()));
        registry.register(Arc::new(SaveTool::append()));
        registry
    }

    /// Directory tools run in.
    pub fn set_cwd(&mut self, cwd: impl Into<PathBuf>) {
        self.cwd = cwd.into();
    }

    /// Register a tool in the registry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        for block in tool.block_types() {
            self.blocks.insert(block.to_string(), name.clone());
        }
        self.tools.insert(name, tool);
    }

    /// Tool uses in `content` whose block type belongs to a registered tool.
    pub fn runnable_uses(&self, content: &str) -> Vec<ToolUse> {
        parse_tool_uses(content)
            .into_iter()
            .filter(|u| self.blocks.contains_key(&u.tool))
            .collect()
    }

    /// Execute one tool use. Failures become a system message so the model
    /// sees them.
    pub async fn execute_use(&self, tool_use: ToolUse, ctx: ToolContext) -> Vec<Message> {
        let Some(tool) = self
            .blocks
            .get(&tool_use.tool)
            .and_then(|name| self.tools.get(name))
        else {
            tracing::warn!("No tool for block type '{}'", tool_use.tool);
            return Vec::new();
        };

        let block = tool_use.tool.clone();
        tracing::info!("Executing {} ({})", tool.name(), block);
        match tool.execute(tool_use, ctx).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("Tool {} failed: {}", block, e);
                vec![Message::system(format!("Error: {e}"))]
            }
        }
    }
}

impl ToolEngine for ToolRegistry {
    fn execute<'a>(&'a self, message: &'a Message, confirm: Arc<dyn Confirm>) -> MessageStream<'a> {
        let uses = self.runnable_uses(&message.content);
        let ctx = ToolContext {
            cwd: self.cwd.clone(),
            confirm,
        };
        Box::pin(
            stream::iter(uses)
                .then(move |tool_use| self.execute_use(tool_use, ctx.clone()))
                .flat_map(stream::iter),
        )
    }

    fn has_runnable(&self, content: &str) -> bool {
        parse_tool_uses(content)
            .iter()
            .any(|u| self.blocks.contains_key(&u.tool))
    }

    fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}
