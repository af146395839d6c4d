//! Server-Sent Events (SSE) parser.
//!
//! Buffers raw bytes so multi-byte characters split across network chunks
//! decode correctly, and accepts both `\n` and `\r\n` line endings.

/// A single SSE event parsed from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

/// Incremental SSE parser that processes bytes into events.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return any complete events.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some((end, sep_len)) = find_block_end(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + sep_len).take(end).collect();
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }
        events
    }
}

/// Position and length of the first blank-line separator.
fn find_block_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Parse the lines of one block into an event. Blocks without data are dropped.
fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event_type = None;
    let mut data_lines = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event_type = Some(value.to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event_type,
        data: data_lines.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"event: ping\n").is_empty());
        let events = parser.feed(b"data: {}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event_type: Some("ping".into()),
                data: "{}".into(),
            }]
        );
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let bytes = "data: caf\u{e9}\n\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut parser = SseParser::new();
        assert!(parser.feed(&bytes[..split]).is_empty());
        let events = parser.feed(&bytes[split..]);
        assert_eq!(events[0].data, "caf\u{e9}");
    }

    #[test]
    fn crlf_line_endings() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: message_stop\r\ndata: {}\r\n\r\nevent: ping\r\ndata: x\r\n\r\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type.as_deref(), Some("message_stop"));
        assert_eq!(events[1].data, "x");
    }

    #[test]
    fn comments_and_dataless_blocks_skipped() {
        let mut parser = SseParser::new();
        let events = parser.feed(b": keepalive\n\nevent: ping\n\ndata: a\ndata: b\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, None);
        assert_eq!(events[0].data, "a\nb");
    }
}
