//! Terminal rendering of messages, notices and streamed responses.

use crossterm::style::{Attribute, Color, SetAttribute, SetForegroundColor};
use std::io::{self, Write};
use std::sync::Arc;
use tandem_api::{Delta, DeltaCallback};
use tandem_types::{Message, MessageSink, Role};

/// Wrap text in bold + a foreground color.
fn bold_color(text: &str, color: Color) -> String {
    format!(
        "{}{}{}{}",
        SetForegroundColor(color),
        SetAttribute(Attribute::Bold),
        text,
        SetAttribute(Attribute::Reset)
    )
}

/// Wrap text in dim (faint).
pub fn dim(text: &str) -> String {
    format!(
        "{}{}{}",
        SetAttribute(Attribute::Dim),
        text,
        SetAttribute(Attribute::Reset)
    )
}

fn role_label(role: Role) -> String {
    match role {
        Role::User => bold_color("User:", Color::Green),
        Role::Assistant => bold_color("Assistant:", Color::Blue),
        Role::System => bold_color("System:", Color::Grey),
    }
}

/// Prints messages to stdout and notices to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalSink;

impl MessageSink for TerminalSink {
    fn show(&self, message: &Message) {
        let mut out = io::stdout().lock();
        let body = if message.role == Role::System {
            dim(&message.content)
        } else {
            message.content.clone()
        };
        let _ = writeln!(out, "{} {}", role_label(message.role), body);
        for file in &message.files {
            let _ = writeln!(out, "  {}", dim(&format!("[attached: {}]", file.display())));
        }
        let _ = out.flush();
    }

    fn notice(&self, text: &str) {
        let _ = writeln!(io::stderr(), "{}", dim(text));
    }
}

/// Callback that streams the assistant response to stdout.
pub fn stream_printer() -> DeltaCallback {
    Arc::new(|delta: Delta<'_>| {
        let mut out = io::stdout().lock();
        match delta {
            Delta::Start => {
                let _ = write!(out, "{} ", role_label(Role::Assistant));
            }
            Delta::Text(text) => {
                let _ = write!(out, "{text}");
            }
            Delta::Done => {
                let _ = writeln!(out);
            }
        }
        let _ = out.flush();
    })
}
