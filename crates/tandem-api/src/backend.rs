//! [`ModelBackend`] implementation for the Anthropic Messages API.

use crate::client::ApiClient;
use crate::retry::RetryConfig;
use crate::stream::{ContentDelta, StreamEvent};
use crate::wire::{ContentBlock, WireRequest, WireTool, to_wire};
use futures_core::Stream;
use futures_util::StreamExt;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tandem_types::provider::{GenerateRequest, ModelBackend};
use tandem_types::{ApiError, Message, ToolSpec, codeblock};

/// Default response token limit.
const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Progress of a response, for live display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta<'a> {
    /// Generation started.
    Start,
    /// A chunk of response text.
    Text(&'a str),
    /// Generation finished.
    Done,
}

/// Receives response text as it is produced.
pub type DeltaCallback = Arc<dyn Fn(Delta<'_>) + Send + Sync>;

/// Anthropic Messages API backend.
///
/// Retry logic stays in [`ApiClient`]; this type converts between the
/// conversation and wire formats and assembles the response text.
#[derive(Clone)]
pub struct AnthropicBackend {
    client: ApiClient,
    max_tokens: u32,
    /// Directory that relative attachment paths resolve against.
    file_root: PathBuf,
    on_delta: Option<DeltaCallback>,
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self {
            client: ApiClient::new(api_key, base_url)?,
            max_tokens: DEFAULT_MAX_TOKENS,
            file_root: PathBuf::from("."),
            on_delta: None,
        })
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.client = self.client.with_retry_config(config);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_file_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.file_root = root.into();
        self
    }

    pub fn with_on_delta(mut self, callback: DeltaCallback) -> Self {
        self.on_delta = Some(callback);
        self
    }

    fn emit(&self, delta: Delta<'_>) {
        if let Some(callback) = &self.on_delta {
            callback(delta);
        }
    }

    async fn build_request(&self, request: &GenerateRequest) -> WireRequest {
        let (system, messages) = to_wire(&request.messages, &self.file_root).await;
        WireRequest {
            model: request.model.clone(),
            max_tokens: self.max_tokens,
            system,
            messages,
            tools: request
                .tools
                .iter()
                .flatten()
                .map(WireTool::from)
                .collect(),
            stream: request.stream,
        }
    }

    async fn generate_text(&self, request: &GenerateRequest) -> Result<String, ApiError> {
        let wire = self.build_request(request).await;
        let tools = request.tools.as_deref().unwrap_or_default();
        tracing::debug!(
            "Requesting {} ({} messages, stream={})",
            wire.model,
            wire.messages.len(),
            wire.stream
        );

        self.emit(Delta::Start);
        let text = if wire.stream {
            let stream = self.client.create_message_stream(&wire).await?;
            collect_stream(stream, tools, |t| self.emit(Delta::Text(t))).await?
        } else {
            let response = self.client.create_message(&wire).await?;
            if response.stop_reason.as_deref() == Some("max_tokens") {
                tracing::warn!("Response truncated at max_tokens ({})", self.max_tokens);
            }
            let mut builder = ResponseBuilder::default();
            for (index, block) in response.content.into_iter().enumerate() {
                builder.start_block(index, block);
            }
            let text = builder.finish(tools)?;
            self.emit(Delta::Text(&text));
            text
        };
        self.emit(Delta::Done);

        if text.trim().is_empty() {
            return Err(ApiError::EmptyResponse);
        }
        Ok(text)
    }
}

impl ModelBackend for AnthropicBackend {
    fn generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Message, ApiError>> + Send + 'a>> {
        Box::pin(async move {
            let text = self.generate_text(request).await?;
            Ok(Message::assistant(text))
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Consume a response event stream into the final message text.
///
/// Text deltas are passed to `on_text` as they arrive; structured tool
/// calls are rendered as fenced tool blocks after the text.
async fn collect_stream<S>(
    mut stream: S,
    tools: &[ToolSpec],
    mut on_text: impl FnMut(&str),
) -> Result<String, ApiError>
where
    S: Stream<Item = Result<StreamEvent, ApiError>> + Unpin,
{
    let mut builder = ResponseBuilder::default();
    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => builder.start_block(index, content_block),
            StreamEvent::ContentBlockDelta {
                index,
                delta: ContentDelta::TextDelta { text },
            } => {
                on_text(&text);
                builder.text.push_str(&text);
                tracing::trace!("text delta for block {index}");
            }
            StreamEvent::ContentBlockDelta {
                index,
                delta: ContentDelta::InputJsonDelta { partial_json },
            } => {
                if let Some(call) = builder.calls.get_mut(&index) {
                    call.input_json.push_str(&partial_json);
                }
            }
            StreamEvent::MessageDelta {
                stop_reason: Some(reason),
            } if reason == "max_tokens" => {
                tracing::warn!("Response truncated at max_tokens");
            }
            StreamEvent::Error {
                error_type,
                message,
            } => return Err(stream_error(&error_type, message)),
            StreamEvent::MessageStop => break,
            _ => {}
        }
    }

    let text_len = builder.text.len();
    let text = builder.finish(tools)?;
    if text.len() > text_len {
        on_text(&text[text_len..]);
    }
    Ok(text)
}

fn stream_error(error_type: &str, message: String) -> ApiError {
    match error_type {
        "overloaded_error" => ApiError::Overloaded,
        "rate_limit_error" => ApiError::RateLimited {
            retry_after_ms: None,
        },
        "authentication_error" => ApiError::Auth { message },
        "invalid_request_error" => ApiError::BadRequest { message },
        _ => ApiError::Server {
            status: 500,
            message: format!("{error_type}: {message}"),
        },
    }
}

/// A structured tool call being assembled.
struct PendingCall {
    name: String,
    input: serde_json::Value,
    input_json: String,
}

/// Accumulates response text and structured tool calls.
#[derive(Default)]
struct ResponseBuilder {
    text: String,
    calls: BTreeMap<usize, PendingCall>,
}

impl ResponseBuilder {
    fn start_block(&mut self, index: usize, block: ContentBlock) {
        match block {
            ContentBlock::Text { text } => self.text.push_str(&text),
            ContentBlock::ToolUse { name, input, .. } => {
                self.calls.insert(
                    index,
                    PendingCall {
                        name,
                        input,
                        input_json: String::new(),
                    },
                );
            }
            ContentBlock::Image { .. } | ContentBlock::Unknown => {}
        }
    }

    /// Final text: response text followed by each tool call as a fenced block.
    fn finish(self, tools: &[ToolSpec]) -> Result<String, ApiError> {
        let mut text = self.text;
        for call in self.calls.into_values() {
            let input = if call.input_json.trim().is_empty() {
                call.input
            } else {
                serde_json::from_str(&call.input_json).map_err(|e| {
                    ApiError::StreamParse(format!("tool input for {}: {e}", call.name))
                })?
            };
            let block = match tools.iter().find(|s| s.name == call.name) {
                Some(spec) => spec.render_call(&input),
                None => codeblock(&call.name, &input.to_string()),
            };
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&block);
        }
        Ok(text)
    }
}
