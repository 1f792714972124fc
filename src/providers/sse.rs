//! Incremental Server-Sent Events framing
//!
//! Both provider APIs stream completions as SSE. This parser accepts raw
//! byte chunks in whatever sizes the transport delivers them and yields the
//! payload of each complete `data:` line. Buffering is done on bytes so a
//! multi-byte UTF-8 sequence split across chunks is never corrupted.

use bytes::BytesMut;

/// Incremental parser for `data:` lines in an SSE byte stream
#[derive(Debug, Default)]
pub struct SseParser {
    buf: BytesMut,
}

impl SseParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning the payloads of all `data:` lines
    /// completed by this chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(|c| c == '\n' || c == '\r');

            if let Some(rest) = line.strip_prefix("data:") {
                let payload = rest.trim_start();
                if !payload.is_empty() {
                    payloads.push(payload.to_string());
                }
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut parser = SseParser::new();
        let payloads = parser.push(b"data: {\"x\":1}\n\n");
        assert_eq!(payloads, vec!["{\"x\":1}".to_string()]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: {\"x\"").is_empty());
        let payloads = parser.push(b":1}\n");
        assert_eq!(payloads, vec!["{\"x\":1}".to_string()]);
    }

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut parser = SseParser::new();
        let payloads = parser.push(b"data: a\n\ndata: b\n\ndata: [DONE]\n\n");
        assert_eq!(payloads, vec!["a", "b", "[DONE]"]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut parser = SseParser::new();
        let payloads = parser.push(b"data: hello\r\n\r\n");
        assert_eq!(payloads, vec!["hello"]);
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let mut parser = SseParser::new();
        let payloads = parser.push(b"event: ping\nid: 7\ndata: payload\n\n");
        assert_eq!(payloads, vec!["payload"]);
    }

    #[test]
    fn test_multibyte_utf8_split_across_chunks() {
        let mut parser = SseParser::new();
        let text = "data: caf\u{e9}\n".as_bytes();
        // Split in the middle of the two-byte 'é' sequence.
        let split = text.len() - 2;
        assert!(parser.push(&text[..split]).is_empty());
        let payloads = parser.push(&text[split..]);
        assert_eq!(payloads, vec!["caf\u{e9}"]);
    }
}
