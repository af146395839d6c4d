//! Context preparation: fit a conversation into a token budget before a model call.
//!
//! Preparation runs in two stages. Reduction drops empty messages and, while
//! over budget, condenses long code blocks. Limiting then evicts the oldest
//! unprotected messages. System and pinned messages are never touched by
//! either stage.

use crate::context::{estimate_message_tokens, estimate_tokens};
use tandem_types::{FENCE, Message, Role};

/// Code blocks with more body lines than this are condensed during reduction.
pub const MAX_BLOCK_LINES: usize = 60;

/// Lines kept at each end of a condensed block.
pub const KEEP_BLOCK_LINES: usize = 10;

/// Shrinks a message sequence to fit a token budget.
#[derive(Debug, Clone, Copy)]
pub struct ContextPreparer {
    budget: u64,
}

impl ContextPreparer {
    pub fn new(budget: u64) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Reduce, then limit.
    pub fn prepare(&self, messages: &[Message]) -> Vec<Message> {
        let reduced = self.reduce(messages);
        self.limit(&reduced)
    }

    /// Drop blank messages, then condense long code blocks while over budget.
    ///
    /// The result is a fixed point: reducing it again changes nothing.
    pub fn reduce(&self, messages: &[Message]) -> Vec<Message> {
        let before = estimate_tokens(messages);
        let mut out: Vec<Message> = messages
            .iter()
            .filter(|m| is_protected(m) || !m.content.trim().is_empty() || !m.files.is_empty())
            .cloned()
            .collect();

        let mut total = estimate_tokens(&out);
        let last = out.len().saturating_sub(1);
        while total > self.budget {
            let largest = out
                .iter()
                .enumerate()
                .filter(|(i, m)| *i != last && !is_protected(m))
                .filter_map(|(i, m)| condense_blocks(&m.content).map(|c| (i, c)))
                .max_by_key(|(i, _)| estimate_message_tokens(&out[*i]));
            let Some((i, condensed)) = largest else {
                break;
            };
            let old = estimate_message_tokens(&out[i]);
            out[i] = out[i].clone().with_content(condensed);
            total = total - old + estimate_message_tokens(&out[i]);
        }

        if out.len() != messages.len() || total != before {
            tracing::info!(
                "Reduced context from {} to {} messages ({} to {} tokens)",
                messages.len(),
                out.len(),
                before,
                total
            );
        }
        out
    }

    /// Evict the oldest unprotected messages until the estimate fits the budget.
    ///
    /// The most recent message is never evicted. When only protected
    /// messages remain the result may still exceed the budget.
    pub fn limit(&self, messages: &[Message]) -> Vec<Message> {
        let before = estimate_tokens(messages);
        let mut total = before;
        let last = messages.len().saturating_sub(1);
        let mut evict = vec![false; messages.len()];

        for (i, msg) in messages.iter().enumerate() {
            if total <= self.budget {
                break;
            }
            if i == last || is_protected(msg) {
                continue;
            }
            evict[i] = true;
            total -= estimate_message_tokens(msg);
        }

        let out: Vec<Message> = messages
            .iter()
            .zip(evict)
            .filter(|(_, evicted)| !evicted)
            .map(|(m, _)| m.clone())
            .collect();

        if out.len() != messages.len() {
            tracing::info!(
                "Limited context from {} to {} messages ({} to {} tokens)",
                messages.len(),
                out.len(),
                before,
                total
            );
        }
        if total > self.budget {
            tracing::debug!("Context still over budget: {} > {}", total, self.budget);
        }
        out
    }
}

fn is_protected(msg: &Message) -> bool {
    msg.pinned || msg.role == Role::System
}

/// Condense every closed code block longer than [`MAX_BLOCK_LINES`].
///
/// Returns `None` when there is nothing to condense.
fn condense_blocks(content: &str) -> Option<String> {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut changed = false;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        out.push(line.to_string());
        i += 1;
        if !line.trim_start().starts_with(FENCE) {
            continue;
        }

        let Some(close) = lines[i..].iter().position(|l| l.trim() == FENCE) else {
            // Unclosed fence: copy the remainder untouched.
            out.extend(lines[i..].iter().map(|l| l.to_string()));
            break;
        };
        let body = &lines[i..i + close];
        if body.len() > MAX_BLOCK_LINES {
            let omitted = body.len() - 2 * KEEP_BLOCK_LINES;
            out.extend(body[..KEEP_BLOCK_LINES].iter().map(|l| l.to_string()));
            out.push(format!("[... {omitted} lines omitted ...]"));
            out.extend(body[body.len() - KEEP_BLOCK_LINES..].iter().map(|l| l.to_string()));
            changed = true;
        } else {
            out.extend(body.iter().map(|l| l.to_string()));
        }
        out.push(lines[i + close].to_string());
        i += close + 1;
    }

    changed.then(|| out.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_block(lines: usize) -> String {
        let body: Vec<String> = (0..lines).map(|n| format!("line {n}")).collect();
        format!("Here is the output:\n```text\n{}\n```\nDone.", body.join("\n"))
    }

    #[test]
    fn drops_blank_unprotected_messages() {
        let preparer = ContextPreparer::new(100_000);
        let msgs = vec![
            Message::system("   "),
            Message::user("  \n"),
            Message::user("").with_files(vec!["a.png".into()]),
            Message::assistant("").with_pinned(true),
            Message::user("hello"),
        ];
        let out = preparer.reduce(&msgs);
        assert_eq!(out.len(), 4);
        assert_eq!(out.last().map(|m| m.content.as_str()), Some("hello"));
    }

    #[test]
    fn condenses_long_blocks_when_over_budget() {
        let preparer = ContextPreparer::new(50);
        let msgs = vec![Message::system("sys"), Message::user(long_block(200)), Message::user("latest")];
        let out = preparer.reduce(&msgs);
        assert!(out[1].content.contains("[... 180 lines omitted ...]"));
        assert!(out[1].content.contains("line 0\n"));
        assert!(out[1].content.contains("line 199\n```\nDone."));
    }

    #[test]
    fn leaves_blocks_alone_under_budget() {
        let preparer = ContextPreparer::new(1_000_000);
        let msgs = vec![Message::user(long_block(200)), Message::user("latest")];
        assert_eq!(preparer.reduce(&msgs), msgs);
    }

    #[test]
    fn never_condenses_last_pinned_or_system() {
        let preparer = ContextPreparer::new(10);
        let msgs = vec![
            Message::system(long_block(100)),
            Message::user(long_block(100)).with_pinned(true),
            Message::assistant(long_block(100)),
        ];
        assert_eq!(preparer.reduce(&msgs), msgs);
    }

    #[test]
    fn reduction_is_idempotent() {
        let preparer = ContextPreparer::new(200);
        let msgs = vec![
            Message::system("sys"),
            Message::user(""),
            Message::assistant(long_block(120)),
            Message::user(long_block(300)),
            Message::assistant(long_block(80)),
            Message::user("latest"),
        ];
        let once = preparer.reduce(&msgs);
        let twice = preparer.reduce(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn prepare_is_idempotent_across_budgets() {
        let msgs = vec![
            Message::system("sys"),
            Message::user("   "),
            Message::assistant(long_block(120)),
            Message::user(long_block(300)).with_pinned(true),
            Message::assistant(long_block(80)),
            Message::user("x".repeat(900)),
            Message::user("latest"),
        ];
        for budget in [1, 10, 50, 150, 400, 800, 2000, 100_000] {
            let preparer = ContextPreparer::new(budget);
            let once = preparer.prepare(&msgs);
            assert_eq!(preparer.prepare(&once), once, "budget {budget}");
        }
    }

    #[test]
    fn unclosed_fence_is_untouched() {
        let body: Vec<String> = (0..100).map(|n| n.to_string()).collect();
        let content = format!("```text\n{}", body.join("\n"));
        assert!(condense_blocks(&content).is_none());
    }

    #[test]
    fn limit_evicts_oldest_first() {
        let msgs = vec![
            Message::system("system prompt"),
            Message::user("a".repeat(400)),
            Message::assistant("b".repeat(400)),
            Message::user("c".repeat(400)),
        ];
        let budget = estimate_tokens(&msgs) - 50;
        let out = ContextPreparer::new(budget).limit(&msgs);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].role, Role::System);
        assert!(out[1].content.starts_with('b'));
        assert!(estimate_tokens(&out) <= budget);
    }

    #[test]
    fn limit_never_evicts_pinned() {
        let msgs = vec![
            Message::user("pinned ".repeat(100)).with_pinned(true),
            Message::user("x".repeat(400)),
            Message::user("latest"),
        ];
        let out = ContextPreparer::new(1).limit(&msgs);
        assert_eq!(out.len(), 2);
        assert!(out[0].pinned);
        assert_eq!(out[1].content, "latest");
    }

    #[test]
    fn limit_keeps_order_of_survivors() {
        let msgs: Vec<Message> = (0..10).map(|n| Message::user(format!("message {n}"))).collect();
        let out = ContextPreparer::new(30).limit(&msgs);
        let indices: Vec<String> = out.iter().map(|m| m.content.clone()).collect();
        let mut sorted = indices.clone();
        sorted.sort();
        assert_eq!(indices, sorted);
        assert_eq!(out.last().map(|m| m.content.as_str()), Some("message 9"));
    }

    #[test]
    fn prepare_fits_budget_when_possible() {
        let msgs = vec![
            Message::system("sys"),
            Message::user(long_block(500)),
            Message::assistant("ok"),
            Message::user("next"),
        ];
        let preparer = ContextPreparer::new(300);
        let out = preparer.prepare(&msgs);
        assert!(estimate_tokens(&out) <= 300);
        assert_eq!(out[0].role, Role::System);
    }
}
