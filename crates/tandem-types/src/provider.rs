//! Model backend trait.

use crate::{ApiError, Message, ToolSpec};
use std::future::Future;
use std::pin::Pin;

/// A request for one model response.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Prepared (reduced and limited) conversation.
    pub messages: Vec<Message>,
    pub model: String,
    pub stream: bool,
    /// Tool specifications, when tools are exposed structurally.
    pub tools: Option<Vec<ToolSpec>>,
}

/// Trait for model-calling backends.
///
/// Given prepared messages, a backend returns exactly one assistant message.
/// Streaming backends are responsible for showing partial output as it
/// arrives; the returned message is the complete response. Cancellation is
/// done by dropping the returned future. Dyn-compatible so the chat loop
/// works with `Arc<dyn ModelBackend>`.
pub trait ModelBackend: Send + Sync {
    fn generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Message, ApiError>> + Send + 'a>>;

    /// Whether `stream: true` is honoured.
    fn supports_streaming(&self) -> bool {
        true
    }

    /// Backend name for logging/display (e.g., "anthropic").
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn backend_is_dyn_compatible() {
        fn _accept(_b: &dyn ModelBackend) {}
    }

    #[test]
    fn arc_backend_is_send_sync() {
        fn _assert_send_sync<T: Send + Sync>() {}
        _assert_send_sync::<Arc<dyn ModelBackend>>();
    }
}
