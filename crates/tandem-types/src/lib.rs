//! Shared message types, collaborator traits and error hierarchy for Tandem.

pub mod display;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod util;

pub use display::{MessageSink, NullSink};
pub use error::{ApiError, ConfigError, TandemError, ToolError};
pub use message::*;
pub use tool::*;
pub use util::{shorten, truncate_str, truncate_string};
