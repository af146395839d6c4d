//! Async stream that converts SSE events into typed stream events.

use crate::sse::SseParser;
use crate::wire::ContentBlock;
use futures_core::Stream;
use pin_project_lite::pin_project;
use serde::Deserialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tandem_types::ApiError;

/// A typed event from a streaming Messages API response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    MessageStart,
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: ContentDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        stop_reason: Option<String>,
    },
    MessageStop,
    Ping,
    Error {
        error_type: String,
        message: String,
    },
}

/// Incremental content within a block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>;

pin_project! {
    /// An async stream of typed [`StreamEvent`]s.
    pub struct EventStream {
        #[pin]
        inner: ByteStream,
        parser: SseParser,
        pending: VecDeque<Result<StreamEvent, ApiError>>,
    }
}

impl EventStream {
    /// Create a new event stream from a reqwest byte stream.
    pub fn new(
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            parser: SseParser::new(),
            pending: VecDeque::new(),
        }
    }
}

impl Stream for EventStream {
    type Item = Result<StreamEvent, ApiError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    for sse in this.parser.feed(&bytes) {
                        match parse_stream_event(sse.event_type.as_deref(), &sse.data) {
                            Ok(Some(event)) => this.pending.push_back(Ok(event)),
                            Ok(None) => {}
                            Err(e) => this.pending.push_back(Err(e)),
                        }
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    let err = if e.is_timeout() {
                        ApiError::Timeout
                    } else {
                        ApiError::Network(e.to_string())
                    };
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Parse an SSE event into a typed event. Unknown event types yield `None`.
fn parse_stream_event(event_type: Option<&str>, data: &str) -> Result<Option<StreamEvent>, ApiError> {
    let Some(event_type) = event_type else {
        return Ok(None);
    };
    let parse_err = |e: serde_json::Error| ApiError::StreamParse(format!("{event_type}: {e}"));

    let event = match event_type {
        "message_start" => StreamEvent::MessageStart,
        "content_block_start" => {
            #[derive(Deserialize)]
            struct Wrapper {
                index: usize,
                content_block: ContentBlock,
            }
            let w: Wrapper = serde_json::from_str(data).map_err(parse_err)?;
            StreamEvent::ContentBlockStart {
                index: w.index,
                content_block: w.content_block,
            }
        }
        "content_block_delta" => {
            #[derive(Deserialize)]
            struct Wrapper {
                index: usize,
                delta: ContentDelta,
            }
            let w: Wrapper = serde_json::from_str(data).map_err(parse_err)?;
            StreamEvent::ContentBlockDelta {
                index: w.index,
                delta: w.delta,
            }
        }
        "content_block_stop" => {
            #[derive(Deserialize)]
            struct Wrapper {
                index: usize,
            }
            let w: Wrapper = serde_json::from_str(data).map_err(parse_err)?;
            StreamEvent::ContentBlockStop { index: w.index }
        }
        "message_delta" => {
            #[derive(Deserialize)]
            struct Delta {
                stop_reason: Option<String>,
            }
            #[derive(Deserialize)]
            struct Wrapper {
                delta: Delta,
            }
            let w: Wrapper = serde_json::from_str(data).map_err(parse_err)?;
            StreamEvent::MessageDelta {
                stop_reason: w.delta.stop_reason,
            }
        }
        "message_stop" => StreamEvent::MessageStop,
        "ping" => StreamEvent::Ping,
        "error" => {
            #[derive(Deserialize)]
            struct Detail {
                #[serde(rename = "type")]
                error_type: String,
                message: String,
            }
            #[derive(Deserialize)]
            struct Wrapper {
                error: Detail,
            }
            let w: Wrapper = serde_json::from_str(data).map_err(parse_err)?;
            StreamEvent::Error {
                error_type: w.error.error_type,
                message: w.error.message,
            }
        }
        _ => {
            tracing::debug!("Unknown SSE event type: {event_type}");
            return Ok(None);
        }
    };
    Ok(Some(event))
}
