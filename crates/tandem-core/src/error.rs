//! Conversation loop error types.

use crate::input::InputError;
use tandem_session::LogError;
use tandem_types::ApiError;
use thiserror::Error;

/// Errors that end a conversation run.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Conversation log error: {0}")]
    Log(#[from] LogError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),
}
