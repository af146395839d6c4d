//! Context window tracking and token estimation.

use tandem_types::{Message, Role};

/// Fixed per-message overhead (role, separators).
const MESSAGE_OVERHEAD_TOKENS: u64 = 4;

/// Rough estimate for an attached file that is not inlined.
const FILE_TOKENS: u64 = 1000;

/// Information about current context window usage.
#[derive(Debug, Clone)]
pub struct ContextInfo {
    pub estimated_tokens: u64,
    pub context_window: u64,
    pub messages: usize,
    pub system_tokens: u64,
    pub user_tokens: u64,
    pub assistant_tokens: u64,
}

impl ContextInfo {
    /// Usage as a percentage of the context window.
    pub fn usage_percent(&self) -> f64 {
        if self.context_window == 0 {
            return 0.0;
        }
        (self.estimated_tokens as f64 / self.context_window as f64) * 100.0
    }
}

/// Tracks context window usage for a conversation.
pub struct ContextTracker {
    context_window: u64,
}

impl ContextTracker {
    /// Create a tracker for the given model.
    pub fn new(model: &str) -> Self {
        Self {
            context_window: model_context_window(model),
        }
    }

    pub fn context_window(&self) -> u64 {
        self.context_window
    }

    /// Estimate token usage for the given messages.
    pub fn estimate(&self, messages: &[Message]) -> ContextInfo {
        let mut system_tokens = 0u64;
        let mut user_tokens = 0u64;
        let mut assistant_tokens = 0u64;

        for msg in messages {
            let msg_tokens = estimate_message_tokens(msg);
            match msg.role {
                Role::System => system_tokens += msg_tokens,
                Role::User => user_tokens += msg_tokens,
                Role::Assistant => assistant_tokens += msg_tokens,
            }
        }

        ContextInfo {
            estimated_tokens: system_tokens + user_tokens + assistant_tokens,
            context_window: self.context_window,
            messages: messages.len(),
            system_tokens,
            user_tokens,
            assistant_tokens,
        }
    }

    /// Format a brief one-line context summary.
    pub fn format_brief(&self, info: &ContextInfo) -> String {
        let est_k = info.estimated_tokens as f64 / 1000.0;
        let win_k = info.context_window as f64 / 1000.0;
        format!(
            "Context: {est_k:.1}k/{win_k:.0}k tokens ({:.0}%)",
            info.usage_percent()
        )
    }

    /// Format a detailed multi-line context breakdown.
    pub fn format_detailed(&self, info: &ContextInfo) -> String {
        let est_k = info.estimated_tokens as f64 / 1000.0;
        let win_k = info.context_window as f64 / 1000.0;
        [
            format!(
                "Context window: {est_k:.1}k / {win_k:.0}k tokens ({:.1}%), {} messages",
                info.usage_percent(),
                info.messages
            ),
            format!("  System:    ~{} tokens", info.system_tokens),
            format!("  User:      ~{} tokens", info.user_tokens),
            format!("  Assistant: ~{} tokens", info.assistant_tokens),
        ]
        .join("\n")
    }
}

/// Estimate tokens for a text string (bytes / 4 heuristic).
pub fn estimate_text_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Estimate tokens for a single message, including attached files.
pub fn estimate_message_tokens(msg: &Message) -> u64 {
    MESSAGE_OVERHEAD_TOKENS + estimate_text_tokens(&msg.content) + FILE_TOKENS * msg.files.len() as u64
}

/// Estimate tokens for a sequence of messages.
pub fn estimate_tokens(messages: &[Message]) -> u64 {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Look up the context window size for a model.
pub fn model_context_window(model: &str) -> u64 {
    if model.to_lowercase().contains("claude") {
        200_000
    } else {
        128_000
    }
}
