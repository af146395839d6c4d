//! Error hierarchy for Tandem.

use thiserror::Error;

/// Top-level error type for all Tandem operations.
#[derive(Debug, Error)]
pub enum TandemError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Conversation log error: {0}")]
    Log(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Errors from a model backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Server overloaded")]
    Overloaded,

    #[error("Server error: {status} {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream parse error: {0}")]
    StreamParse(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Model returned an empty response")]
    EmptyResponse,
}

/// Errors from tool execution and URL fetching.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid input for tool '{tool}': {message}")]
    InvalidInput { tool: String, message: String },

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Tool timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Fetching {url} failed: {message}")]
    Fetch { url: String, message: String },
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    MissingKey { key: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_display() {
        assert_eq!(TandemError::Cancelled.to_string(), "Operation cancelled");
    }

    #[test]
    fn api_error_converts_into_top_level() {
        let err: TandemError = ApiError::Overloaded.into();
        assert!(matches!(err, TandemError::Api(ApiError::Overloaded)));
        assert_eq!(err.to_string(), "API error: Server overloaded");
    }

    #[test]
    fn fetch_error_mentions_url() {
        let err = ToolError::Fetch {
            url: "https://example.com".into(),
            message: "HTTP 404".into(),
        };
        assert!(err.to_string().contains("https://example.com"));
    }
}
