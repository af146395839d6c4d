//! Initial system prompt seeded into new conversations.

use tandem_types::{FENCE, Message, ToolFormat, ToolSpec};

const BASE_PROMPT: &str = "You are Tandem, a pair-programming assistant running in the user's \
terminal. You can run commands and edit files with the tools below. Keep answers short, \
act on the user's behalf when asked, and prefer one tool use per step so results can \
inform the next step.";

/// Build the hidden, pinned system prompt for a new conversation.
pub fn initial_prompt(tools: &[ToolSpec], format: ToolFormat) -> Vec<Message> {
    let mut text = String::from(BASE_PROMPT);
    if !tools.is_empty() {
        text.push_str("\n\n# Tools\n");
        for spec in tools {
            text.push_str(&format!("\n## {}\n\n{}\n", spec.name, spec.description));
            if format == ToolFormat::Markdown {
                text.push_str(&format!("\nUsage:\n{}\n", usage_block(spec)));
            }
        }
        if format == ToolFormat::Markdown {
            text.push_str(
                "\nTo use a tool, write a fenced code block whose language tag is the tool \
                 name. Results are returned as system messages.\n",
            );
        }
    }
    vec![
        Message::system(text)
            .with_hide(true)
            .with_quiet(true)
            .with_pinned(true),
    ]
}

fn usage_block(spec: &ToolSpec) -> String {
    let mut info = spec.name.clone();
    for arg in &spec.arg_fields {
        info.push_str(&format!(" <{arg}>"));
    }
    let body = spec
        .body_field
        .as_deref()
        .map(|b| format!("<{b}>"))
        .unwrap_or_default();
    format!("{FENCE}{info}\n{body}\n{FENCE}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn save_spec() -> ToolSpec {
        ToolSpec {
            name: "save".into(),
            description: "Write a file.".into(),
            input_schema: serde_json::json!({"type": "object"}),
            arg_fields: vec!["path".into()],
            body_field: Some("content".into()),
        }
    }

    #[test]
    fn prompt_is_hidden_and_pinned() {
        let prompt = initial_prompt(&[], ToolFormat::Markdown);
        assert_eq!(prompt.len(), 1);
        assert!(prompt[0].hide && prompt[0].pinned && prompt[0].quiet);
    }

    #[test]
    fn markdown_format_shows_usage() {
        let prompt = initial_prompt(&[save_spec()], ToolFormat::Markdown);
        assert!(prompt[0].content.contains("```save <path>\n<content>\n```"));
    }

    #[test]
    fn tool_format_omits_block_syntax() {
        let prompt = initial_prompt(&[save_spec()], ToolFormat::Tool);
        assert!(prompt[0].content.contains("## save"));
        assert!(!prompt[0].content.contains("```save"));
    }
}
