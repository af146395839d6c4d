//! Slash commands typed by the user (or produced by tools), e.g. `/undo 2`.
//!
//! Commands live in a fixed table built at startup. A user message is a
//! command when its content is `/<name>` followed by whitespace or the end
//! of the text. Every handler except `undo` first removes its own command
//! message from the log; `undo` relies on the log discarding it.

use crate::chat::Chat;
use crate::error::ChatError;
use futures_util::future::BoxFuture;
use tandem_session::{ContextTracker, ConversationLog, LogError, estimate_tokens, generate_name};
use tandem_types::{Message, Role, shorten};

/// What the loop should do after a command ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command ran; the loop continues with the next prompt or input.
    Handled,
    /// Leave the conversation loop.
    Exit,
}

/// Everything a command handler may touch.
pub struct CommandContext<'a> {
    pub chat: &'a Chat,
    pub log: &'a mut ConversationLog,
    /// Text after the command name, trimmed.
    pub args: &'a str,
}

type Handler = for<'a> fn(CommandContext<'a>) -> BoxFuture<'a, Result<CommandOutcome, ChatError>>;

/// A registered command.
pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
    handler: Handler,
}

/// Fixed name → handler table.
pub struct CommandRegistry {
    commands: Vec<Command>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CommandRegistry {
    /// The built-in command table.
    pub fn builtin() -> Self {
        let commands = vec![
            Command {
                name: "undo",
                usage: "/undo [n]",
                description: "Remove the last n messages (default 1)",
                handler: undo,
            },
            Command {
                name: "log",
                usage: "/log [--hidden]",
                description: "Show the conversation",
                handler: show_log,
            },
            Command {
                name: "rename",
                usage: "/rename [name]",
                description: "Rename the conversation (random name if omitted)",
                handler: rename,
            },
            Command {
                name: "fork",
                usage: "/fork [name]",
                description: "Copy the conversation to a new name and continue there",
                handler: fork,
            },
            Command {
                name: "replay",
                usage: "/replay",
                description: "Re-run the tool uses of the last assistant message",
                handler: replay,
            },
            Command {
                name: "impersonate",
                usage: "/impersonate [text]",
                description: "Add an assistant message and run its tools",
                handler: impersonate,
            },
            Command {
                name: "tokens",
                usage: "/tokens",
                description: "Show context usage",
                handler: tokens,
            },
            Command {
                name: "tools",
                usage: "/tools",
                description: "List available tools",
                handler: tools,
            },
            Command {
                name: "help",
                usage: "/help",
                description: "Show this help",
                handler: help,
            },
            Command {
                name: "exit",
                usage: "/exit",
                description: "Exit the conversation",
                handler: exit,
            },
        ];
        Self { commands }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.commands.iter().map(|c| c.name).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    /// Resolve `msg` to a registered command and its argument text.
    pub fn parse<'m>(&self, msg: &'m Message) -> Option<(&Command, &'m str)> {
        if msg.role != Role::User {
            return None;
        }
        let rest = msg.content.strip_prefix('/')?;
        let (name, args) = match rest.find(char::is_whitespace) {
            Some(i) => (&rest[..i], rest[i..].trim()),
            None => (rest, ""),
        };
        self.get(name).map(|cmd| (cmd, args))
    }

    pub fn is_command(&self, msg: &Message) -> bool {
        self.parse(msg).is_some()
    }

    /// Run `msg` if it is a command. `None` means it was not one.
    pub async fn execute(
        &self,
        msg: &Message,
        chat: &Chat,
        log: &mut ConversationLog,
    ) -> Result<Option<CommandOutcome>, ChatError> {
        let Some((command, args)) = self.parse(msg) else {
            return Ok(None);
        };
        tracing::debug!("Executing command /{} {}", command.name, args);
        let outcome = (command.handler)(CommandContext { chat, log, args }).await?;
        Ok(Some(outcome))
    }
}

fn undo(ctx: CommandContext<'_>) -> BoxFuture<'_, Result<CommandOutcome, ChatError>> {
    Box::pin(async move {
        let n = if ctx.args.is_empty() {
            1
        } else {
            match ctx.args.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    ctx.log.pop().await?;
                    ctx.log.sink().notice("Usage: /undo [n]");
                    return Ok(CommandOutcome::Handled);
                }
            }
        };
        ctx.log.undo(n).await?;
        Ok(CommandOutcome::Handled)
    })
}

fn show_log(ctx: CommandContext<'_>) -> BoxFuture<'_, Result<CommandOutcome, ChatError>> {
    Box::pin(async move {
        ctx.log.pop().await?;
        ctx.log.print(ctx.args.split_whitespace().any(|a| a == "--hidden"));
        Ok(CommandOutcome::Handled)
    })
}

fn rename(ctx: CommandContext<'_>) -> BoxFuture<'_, Result<CommandOutcome, ChatError>> {
    Box::pin(async move {
        ctx.log.pop().await?;
        let name = if ctx.args.is_empty() {
            generate_name()
        } else {
            ctx.args.to_string()
        };
        match ctx.log.rename(&name).await {
            Ok(()) => ctx.log.sink().notice(&format!("Renamed conversation to {name}")),
            Err(e @ (LogError::AlreadyExists { .. } | LogError::InvalidName { .. })) => {
                ctx.log.sink().notice(&e.to_string());
            }
            Err(e) => return Err(e.into()),
        }
        Ok(CommandOutcome::Handled)
    })
}

fn fork(ctx: CommandContext<'_>) -> BoxFuture<'_, Result<CommandOutcome, ChatError>> {
    Box::pin(async move {
        ctx.log.pop().await?;
        let name = if ctx.args.is_empty() {
            generate_name()
        } else {
            ctx.args.to_string()
        };
        match ctx.log.fork(&name).await {
            Ok(()) => ctx.log.sink().notice(&format!(
                "Forked conversation to {}",
                ctx.log.path().display()
            )),
            Err(e @ (LogError::AlreadyExists { .. } | LogError::InvalidName { .. })) => {
                ctx.log.sink().notice(&e.to_string());
            }
            Err(e) => return Err(e.into()),
        }
        Ok(CommandOutcome::Handled)
    })
}

fn replay(ctx: CommandContext<'_>) -> BoxFuture<'_, Result<CommandOutcome, ChatError>> {
    Box::pin(async move {
        ctx.log.pop().await?;
        let last = ctx
            .log
            .messages()
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .cloned();
        match last {
            Some(msg) => {
                ctx.log.sink().notice("Replaying last assistant message");
                ctx.chat.replay_tools(ctx.log, &msg).await
            }
            None => {
                ctx.log.sink().notice("No assistant message to replay.");
                Ok(CommandOutcome::Handled)
            }
        }
    })
}

fn impersonate(ctx: CommandContext<'_>) -> BoxFuture<'_, Result<CommandOutcome, ChatError>> {
    Box::pin(async move {
        ctx.log.pop().await?;
        let content = if ctx.args.is_empty() {
            match ctx.chat.read_line("[impersonate] Assistant: ").await? {
                Some(text) => text,
                None => return Ok(CommandOutcome::Exit),
            }
        } else {
            ctx.args.to_string()
        };
        let msg = Message::assistant(content);
        ctx.log.append(msg.clone()).await?;
        ctx.chat.replay_tools(ctx.log, &msg).await
    })
}

fn tokens(ctx: CommandContext<'_>) -> BoxFuture<'_, Result<CommandOutcome, ChatError>> {
    Box::pin(async move {
        ctx.log.pop().await?;
        let tracker = ContextTracker::new(ctx.chat.model());
        let info = tracker.estimate(ctx.log.messages());
        ctx.log.sink().notice(&tracker.format_detailed(&info));
        let prepared = ctx.chat.preparer().prepare(ctx.log.messages());
        ctx.log.sink().notice(&format!(
            "Prepared for next call: {} messages, ~{} tokens (budget {})",
            prepared.len(),
            estimate_tokens(&prepared),
            ctx.chat.preparer().budget()
        ));
        Ok(CommandOutcome::Handled)
    })
}

fn tools(ctx: CommandContext<'_>) -> BoxFuture<'_, Result<CommandOutcome, ChatError>> {
    Box::pin(async move {
        ctx.log.pop().await?;
        let specs = ctx.chat.tool_specs();
        if specs.is_empty() {
            ctx.log.sink().notice("No tools available.");
        }
        for spec in specs {
            ctx.log
                .sink()
                .notice(&format!("  {:<10} {}", spec.name, shorten(&spec.description, 70)));
        }
        Ok(CommandOutcome::Handled)
    })
}

fn help(ctx: CommandContext<'_>) -> BoxFuture<'_, Result<CommandOutcome, ChatError>> {
    Box::pin(async move {
        ctx.log.pop().await?;
        ctx.log.sink().notice("Available commands:");
        for command in ctx.chat.commands().iter() {
            ctx.log
                .sink()
                .notice(&format!("  {:<22} {}", command.usage, command.description));
        }
        Ok(CommandOutcome::Handled)
    })
}

fn exit(ctx: CommandContext<'_>) -> BoxFuture<'_, Result<CommandOutcome, ChatError>> {
    Box::pin(async move {
        ctx.log.pop().await?;
        Ok(CommandOutcome::Exit)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_requires_exact_name() {
        let registry = CommandRegistry::builtin();
        let msg = Message::user("/undo 3");
        let (cmd, args) = registry.parse(&msg).unwrap();
        assert_eq!(cmd.name, "undo");
        assert_eq!(args, "3");

        assert!(registry.is_command(&Message::user("/exit")));
        assert!(registry.is_command(&Message::user("/log\t--hidden")));
        assert!(!registry.is_command(&Message::user("/undone")));
        assert!(!registry.is_command(&Message::user("/unknown")));
        assert!(!registry.is_command(&Message::user("please /undo")));
    }

    #[test]
    fn only_user_messages_are_commands() {
        let registry = CommandRegistry::builtin();
        assert!(!registry.is_command(&Message::assistant("/exit")));
        assert!(!registry.is_command(&Message::system("/exit")));
    }

    #[test]
    fn impersonate_keeps_raw_argument_text() {
        let registry = CommandRegistry::builtin();
        let msg = Message::user("/impersonate   ```shell\nls\n```  ");
        let (_, args) = registry.parse(&msg).unwrap();
        assert_eq!(args, "```shell\nls\n```");
    }

    #[test]
    fn names_cover_builtin_table() {
        let names = CommandRegistry::builtin().names();
        for name in [
            "undo", "log", "rename", "fork", "replay", "impersonate", "tokens", "tools", "help",
            "exit",
        ] {
            assert!(names.contains(&name), "missing {name}");
        }
    }
}
