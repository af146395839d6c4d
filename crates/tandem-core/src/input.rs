//! User input source abstraction.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use thiserror::Error;

/// Errors reading user input.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("End of input")]
    EndOfInput,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads one line of user input.
///
/// Uses `Pin<Box<dyn Future>>` for dyn-compatibility, matching the Tool trait pattern.
pub trait InputSource: Send + Sync {
    fn read_line<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, InputError>> + Send + 'a>>;
}

/// Input served from a fixed queue of lines, then end of input.
///
/// Used for piped sessions and tests.
#[derive(Default)]
pub struct QueuedInput {
    lines: Mutex<VecDeque<String>>,
}

impl QueuedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: Mutex::new(lines.into_iter().map(Into::into).collect()),
        }
    }
}

impl InputSource for QueuedInput {
    fn read_line<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, InputError>> + Send + 'a>> {
        let next = match self.lines.lock() {
            Ok(mut lines) => lines.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        Box::pin(async move { next.ok_or(InputError::EndOfInput) })
    }
}
