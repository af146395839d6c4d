//! Conversation log persistence and context preparation for Tandem.

pub mod context;
pub mod error;
pub mod log;
pub mod names;
pub mod prepare;

pub use context::{ContextInfo, ContextTracker, estimate_message_tokens, estimate_tokens};
pub use error::LogError;
pub use log::{CONVERSATION_FILE, ConversationLog, ConversationSummary, list_conversations};
pub use names::{generate_name, is_generated_name};
pub use prepare::ContextPreparer;
