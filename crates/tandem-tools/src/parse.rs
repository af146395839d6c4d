//! Extract fenced tool-use blocks from assistant text.

use tandem_types::{FENCE, ToolUse};

/// Parse every closed fenced block that carries an info line.
///
/// The first word of the info line is the block type, the remaining words
/// are arguments. Nested fences inside a block are kept as body text; a
/// block whose closing fence never arrives is ignored.
pub fn parse_tool_uses(content: &str) -> Vec<ToolUse> {
    let mut uses = Vec::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        let Some(info) = line.strip_prefix(FENCE) else {
            continue;
        };
        let mut words = info.split_whitespace();

        let mut body = Vec::new();
        let mut depth = 1usize;
        let mut closed = false;
        for inner in lines.by_ref() {
            if let Some(rest) = inner.trim_end().strip_prefix(FENCE) {
                if rest.is_empty() {
                    depth -= 1;
                    if depth == 0 {
                        closed = true;
                        break;
                    }
                } else if !rest.starts_with('`') {
                    depth += 1;
                }
            }
            body.push(inner);
        }

        if !closed {
            break;
        }
        if let Some(tool) = words.next() {
            uses.push(ToolUse {
                tool: tool.to_string(),
                args: words.map(str::to_string).collect(),
                content: body.join("\n"),
            });
        }
    }
    uses
}
