//! Conversation message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Content of the system message appended when a cycle is cancelled.
pub const INTERRUPTED: &str = "Interrupted";

/// Markdown code fence delimiter.
pub const FENCE: &str = "```";

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation.
///
/// Messages are values: once appended to a log they are never edited in
/// place. The `with_*` builders return a modified copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Files attached to the message but not inlined into `content`.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Excluded from default display.
    #[serde(default)]
    pub hide: bool,
    /// Not echoed when appended, but still persisted.
    #[serde(default)]
    pub quiet: bool,
    /// Exempt from context reduction and limiting.
    #[serde(default)]
    pub pinned: bool,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            files: Vec::new(),
            hide: false,
            quiet: false,
            pinned: false,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// The sentinel recorded when a cycle is cancelled.
    pub fn interrupted() -> Self {
        Self::system(INTERRUPTED)
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.files = files;
        self
    }

    pub fn with_hide(mut self, hide: bool) -> Self {
        self.hide = hide;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_interrupted(&self) -> bool {
        self.role == Role::System && self.content == INTERRUPTED
    }

    /// Inner text of the last paired code block in this message, if any.
    pub fn last_code_block(&self) -> Option<&str> {
        last_code_block(&self.content)
    }
}

/// Wrap `content` in a fenced code block labelled with `label`.
pub fn codeblock(label: &str, content: &str) -> String {
    format!("{FENCE}{label}\n{content}\n{FENCE}")
}

/// Inner text of the last paired code block in `content`.
///
/// The language/label line of the block is dropped. Returns `None` when the
/// content holds fewer than two fences.
pub fn last_code_block(content: &str) -> Option<&str> {
    if content.matches(FENCE).count() < 2 {
        return None;
    }
    let parts: Vec<&str> = content.split(FENCE).collect();
    let inner = parts[parts.len() - 2];
    Some(inner.split_once('\n').map_or(inner, |(_, body)| body))
}
