//! String helpers shared by display, notices and tool output.

/// Find the largest byte index <= `i` that is on a UTF-8 char boundary.
fn floor_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    let mut pos = i;
    while pos > 0 && !s.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Truncate `&str` to at most `max_bytes`, never splitting a UTF-8 codepoint.
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        s
    } else {
        &s[..floor_char_boundary(s, max_bytes)]
    }
}

/// Truncate a `String` in place to at most `max_bytes`, never splitting a UTF-8 codepoint.
pub fn truncate_string(s: &mut String, max_bytes: usize) {
    if s.len() > max_bytes {
        s.truncate(floor_char_boundary(s, max_bytes));
    }
}

/// Collapse whitespace and shorten to `width` characters on a word boundary,
/// appending `...` when anything was dropped.
pub fn shorten(text: &str, width: usize) -> String {
    const PLACEHOLDER: &str = "...";
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= width {
        return collapsed;
    }

    let mut out = String::new();
    for word in collapsed.split(' ') {
        let sep = usize::from(!out.is_empty());
        if out.chars().count() + sep + word.chars().count() + PLACEHOLDER.len() > width {
            break;
        }
        if sep == 1 {
            out.push(' ');
        }
        out.push_str(word);
    }
    out.push_str(PLACEHOLDER);
    out
}
