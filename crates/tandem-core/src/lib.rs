//! Conversation loop, interruption and content inclusion for Tandem.

mod chat;
pub mod commands;
pub mod error;
pub mod include;
pub mod input;
pub mod interrupt;
pub mod prompts;
pub mod workspace;

pub use chat::{Chat, ChatOptions, MAX_CYCLES_PER_PROMPT, needs_response};
pub use commands::{CommandOutcome, CommandRegistry};
pub use error::ChatError;
pub use include::{IncludeContext, include_paths};
pub use input::{InputError, InputSource, QueuedInput};
pub use interrupt::{Armed, InterruptController};
pub use prompts::initial_prompt;
pub use workspace::{WorkspaceError, add_workspace_prompt, resolve_workspace};
