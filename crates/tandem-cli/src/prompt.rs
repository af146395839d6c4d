//! Terminal line input and confirmation prompts.

use crate::display::dim;
use std::future::Future;
use std::io::{self, BufRead, Write};
use std::pin::Pin;
use tandem_core::{InputError, InputSource};
use tandem_types::Confirm;

/// Reads user input lines from stdin.
pub struct StdinInput;

impl InputSource for StdinInput {
    fn read_line<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, InputError>> + Send + 'a>> {
        let prompt = prompt.to_string();
        Box::pin(async move {
            // Use spawn_blocking since we read from stdin
            tokio::task::spawn_blocking(move || {
                let mut err = io::stderr().lock();
                write!(err, "{prompt}")?;
                err.flush()?;

                let mut line = String::new();
                if io::stdin().lock().read_line(&mut line)? == 0 {
                    let _ = writeln!(err);
                    return Err(InputError::EndOfInput);
                }
                Ok(line)
            })
            .await
            .map_err(|e| InputError::Io(io::Error::other(e)))?
        })
    }
}

/// Asks the user in the terminal before a tool acts.
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm<'a>(&'a self, action: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        let action = action.to_string();
        Box::pin(async move {
            let result = tokio::task::spawn_blocking(move || {
                let mut err = io::stderr().lock();
                let _ = writeln!(err);
                for line in action.lines() {
                    let _ = writeln!(err, "  {}", dim(line));
                }
                let _ = write!(err, "  Proceed? [Y/n] > ");
                let _ = err.flush();

                let mut input = String::new();
                if io::stdin().lock().read_line(&mut input).unwrap_or(0) == 0 {
                    return false;
                }
                parse_answer(&input)
            })
            .await;

            result.unwrap_or(false)
        })
    }
}

/// Empty input means yes.
fn parse_answer(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "" | "y" | "yes")
}
