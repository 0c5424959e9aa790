//! Incremental decoder for the stream endpoint's framed text protocol
//!
//! The body is a sequence of UTF-8 frames separated by a blank line. Each
//! frame carries an `event:` line naming its kind and a `data:` line holding a
//! JSON payload:
//!
//! ```text
//! event: chunk
//! data: {"content":"Chào"}
//!
//! event: complete
//! data: {}
//! ```
//!
//! Reads can end anywhere, including inside a frame or inside a multi-byte
//! character, so undecoded bytes are carried over to the next push.

use crate::types::ChunkPayload;

const SEPARATOR: &[u8] = b"\n\n";

/// A decoded application-level frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Incremental text
    Chunk(ChunkPayload),
    /// Normal end of the response
    Complete(serde_json::Value),
    /// Backend-reported failure
    Error(serde_json::Value),
}

impl Frame {
    /// Check if this frame ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Complete(_) | Frame::Error(_))
    }
}

/// Stateful frame decoder holding the unconsumed remainder between reads
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a separator
    scanned: usize,
    skipped: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes from one read and return every frame completed by them,
    /// in arrival order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut start = 0;
        // A separator may straddle the previous read
        let mut from = self.scanned.saturating_sub(SEPARATOR.len() - 1);
        while let Some(pos) = find_separator(&self.buffer[from..]) {
            let end = from + pos;
            if let Some(frame) = decode_frame(&self.buffer[start..end], &mut self.skipped) {
                frames.push(frame);
            }
            start = end + SEPARATOR.len();
            from = start;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        frames
    }

    /// Bytes received but not yet part of a complete frame
    pub fn remainder(&self) -> &[u8] {
        &self.buffer
    }

    /// Number of frames dropped because their payload was not valid JSON
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// End of body: drop any partial frame and return its size in bytes
    pub fn finish(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        self.scanned = 0;
        dropped
    }
}

fn decode_frame(raw: &[u8], skipped: &mut usize) -> Option<Frame> {
    let text = String::from_utf8_lossy(raw);

    let mut event: Option<&str> = None;
    let mut data: Option<&str> = None;
    for line in text.split('\n').map(|l| l.trim_end_matches('\r')) {
        if event.is_none() {
            if let Some(rest) = line.strip_prefix("event:") {
                event = Some(rest.trim());
                continue;
            }
        }
        if data.is_none() {
            if let Some(rest) = line.strip_prefix("data:") {
                data = Some(rest.trim());
            }
        }
    }

    if event.is_none() && data.is_none() {
        return None;
    }

    let payload = match data.unwrap_or("") {
        "" => serde_json::Value::Null,
        raw_payload => match serde_json::from_str(raw_payload) {
            Ok(value) => value,
            Err(e) => {
                *skipped += 1;
                tracing::debug!("Skipping malformed stream frame: {}", e);
                return None;
            }
        },
    };

    // Frames without an event line name their kind in the payload
    let kind = match event.filter(|e| !e.is_empty()) {
        Some(kind) => kind.to_string(),
        None => payload
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string(),
    };

    match kind.as_str() {
        "chunk" => Some(Frame::Chunk(ChunkPayload(payload))),
        "complete" => Some(Frame::Complete(payload)),
        "error" | "timeout" => Some(Frame::Error(payload)),
        other => {
            tracing::debug!("Ignoring stream frame of kind {:?}", other);
            None
        }
    }
}

fn find_separator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(SEPARATOR.len())
        .position(|window| window == SEPARATOR)
}

/// Human-readable message of an `error` frame payload
pub fn error_message(payload: &serde_json::Value) -> String {
    ["message", "error", "detail"]
        .iter()
        .filter_map(|key| payload.get(*key).and_then(|v| v.as_str()))
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| match payload {
            serde_json::Value::Null => "stream reported an error".to_string(),
            other => other.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(text: &str) -> Frame {
        Frame::Chunk(ChunkPayload(json!({ "content": text })))
    }

    #[test]
    fn test_decodes_whole_frames() {
        let mut d = FrameDecoder::new();
        let frames = d.push(
            b"event: chunk\ndata: {\"content\":\"Ch\xc3\xa0o\"}\n\nevent: complete\ndata: {}\n\n",
        );
        assert_eq!(frames, vec![chunk("Chào"), Frame::Complete(json!({}))]);
        assert!(d.remainder().is_empty());
    }

    #[test]
    fn test_frame_split_across_reads() {
        let mut d = FrameDecoder::new();
        assert!(d.push(b"event: chu").is_empty());
        assert!(d.push(b"nk\ndata: {\"content\":").is_empty());
        assert!(d.push(b"\" b\xe1\xba\xa1n\"}\n").is_empty());
        let frames = d.push(b"\n");
        assert_eq!(frames, vec![chunk(" bạn")]);
    }

    #[test]
    fn test_multibyte_character_split_between_reads() {
        // "ạ" is e1 ba a1; cut it in the middle
        let mut d = FrameDecoder::new();
        assert!(d.push(b"event: chunk\ndata: {\"content\":\"b\xe1\xba").is_empty());
        let frames = d.push(b"\xa1n\"}\n\n");
        assert_eq!(frames, vec![chunk("bạn")]);
    }

    #[test]
    fn test_separator_split_between_reads() {
        let mut d = FrameDecoder::new();
        assert!(d.push(b"event: chunk\ndata: {\"content\":\"x\"}\n").is_empty());
        assert_eq!(d.push(b"\nevent: comp"), vec![chunk("x")]);
        assert_eq!(d.remainder(), b"event: comp");
    }

    #[test]
    fn test_large_frame_in_small_reads() {
        let text = "x".repeat(256 * 1024);
        let wire = format!("event: chunk\ndata: {{\"content\":\"{}\"}}\n\n", text);

        let mut d = FrameDecoder::new();
        let mut frames = Vec::new();
        for piece in wire.as_bytes().chunks(50) {
            frames.extend(d.push(piece));
        }
        assert_eq!(frames, vec![chunk(&text)]);
        assert!(d.remainder().is_empty());
    }

    #[test]
    fn test_separator_straddles_many_reads() {
        let mut d = FrameDecoder::new();
        for byte in b"event: chunk\ndata: {\"content\":\"a\"}\n".iter() {
            assert!(d.push(std::slice::from_ref(byte)).is_empty());
        }
        assert_eq!(d.push(b"\nevent: chunk\ndata: {\"content\":\"b\"}\n\n"), vec![chunk("a"), chunk("b")]);
    }

    #[test]
    fn test_malformed_json_is_skipped() {
        let mut d = FrameDecoder::new();
        let frames = d.push(
            b"event: chunk\ndata: {not json\n\nevent: chunk\ndata: {\"content\":\"ok\"}\n\n",
        );
        assert_eq!(frames, vec![chunk("ok")]);
        assert_eq!(d.skipped(), 1);
    }

    #[test]
    fn test_empty_payload_is_null() {
        let mut d = FrameDecoder::new();
        let frames = d.push(b"event: complete\ndata:\n\n");
        assert_eq!(frames, vec![Frame::Complete(serde_json::Value::Null)]);

        let frames = d.push(b"event: complete\n\n");
        assert_eq!(frames, vec![Frame::Complete(serde_json::Value::Null)]);
    }

    #[test]
    fn test_error_frame() {
        let mut d = FrameDecoder::new();
        let frames = d.push(b"event: error\ndata: {\"message\":\"model overloaded\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_terminal());
        match &frames[0] {
            Frame::Error(p) => assert_eq!(error_message(p), "model overloaded"),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_kind_from_payload_type_without_event_line() {
        let mut d = FrameDecoder::new();
        let frames = d.push(
            b"data: {\"type\":\"connected\",\"stream_id\":\"abc\"}\n\n\
              data: {\"type\":\"chunk\",\"content\":\"hi\"}\n\n\
              data: {\"type\":\"timeout\",\"message\":\"Stream timeout\"}\n\n",
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(
            frames[0],
            Frame::Chunk(ChunkPayload(json!({"type": "chunk", "content": "hi"})))
        );
        assert!(matches!(frames[1], Frame::Error(_)));
    }

    #[test]
    fn test_crlf_lines_and_unknown_events() {
        let mut d = FrameDecoder::new();
        let frames = d.push(b"event: ping\r\ndata: {}\r\n\n\nevent: chunk\r\ndata: {\"delta\":\"d\"}\r\n\n");
        assert_eq!(frames, vec![Frame::Chunk(ChunkPayload(json!({"delta": "d"})))]);
    }

    #[test]
    fn test_finish_drops_partial_frame() {
        let mut d = FrameDecoder::new();
        d.push(b"event: chunk\ndata: {\"content\":\"dangling\"}");
        assert_eq!(d.finish(), 41);
        assert!(d.remainder().is_empty());
    }

    #[test]
    fn test_error_message_fallbacks() {
        assert_eq!(error_message(&json!({"error": "boom"})), "boom");
        assert_eq!(error_message(&serde_json::Value::Null), "stream reported an error");
        assert_eq!(error_message(&json!({"code": 7})), r#"{"code":7}"#);
    }
}
