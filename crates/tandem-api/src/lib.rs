//! Anthropic Messages API model backend with SSE streaming for Tandem.

mod backend;
mod client;
mod retry;
mod sse;
mod stream;
mod wire;

pub use backend::{AnthropicBackend, Delta, DeltaCallback};
pub use client::ApiClient;
pub use retry::RetryConfig;
pub use stream::{EventStream, StreamEvent};
pub use wire::{ContentBlock, WireMessage, WireRequest, WireResponse, to_wire};
