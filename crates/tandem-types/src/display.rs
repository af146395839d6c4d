//! Display surface for messages and user-visible notices.

use crate::Message;

/// Where appended messages and notices are shown to the user.
///
/// The terminal implementation lives in the CLI; libraries and tests use
/// [`NullSink`] or a recording sink.
pub trait MessageSink: Send + Sync {
    /// Show a conversation message.
    fn show(&self, message: &Message);

    /// Show an out-of-band notice (warnings, command feedback).
    fn notice(&self, text: &str);
}

/// A sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn show(&self, _message: &Message) {}

    fn notice(&self, _text: &str) {}
}
