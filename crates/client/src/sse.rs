// crates/client/src/sse.rs
//! Incremental parser for the server's SSE wire format.
//!
//! The server emits data-only frames (`data: <JSON>\n\n`) terminated by
//! a `data: [DONE]` sentinel. The parser accepts arbitrary byte chunks,
//! so a frame split across network reads reassembles correctly. Comment
//! lines and unknown fields are skipped; multiple `data:` lines in one
//! frame join with `\n` per the SSE spec.

use skilldeck_core::events::DONE_SENTINEL;

/// One decoded frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A JSON event payload, undecoded.
    Data(String),
    /// The `[DONE]` terminator.
    Done,
}

impl Frame {
    fn from_payload(payload: String) -> Self {
        if payload.trim() == DONE_SENTINEL {
            Frame::Done
        } else {
            Frame::Data(payload)
        }
    }
}

/// Incremental frame decoder. Feed byte chunks with [`FrameParser::push`];
/// call [`FrameParser::finish`] when the transport closes to recover a
/// trailing frame that never saw its blank-line boundary.
#[derive(Debug, Default)]
pub struct FrameParser {
    partial_line: String,
    data_lines: Vec<String>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let text = String::from_utf8_lossy(chunk);
        let mut frames = Vec::new();

        for ch in text.chars() {
            if ch != '\n' {
                self.partial_line.push(ch);
                continue;
            }
            let line = std::mem::take(&mut self.partial_line);
            if let Some(frame) = self.take_line(line.strip_suffix('\r').unwrap_or(&line)) {
                frames.push(frame);
            }
        }

        frames
    }

    pub fn finish(&mut self) -> Option<Frame> {
        if !self.partial_line.is_empty() {
            let line = std::mem::take(&mut self.partial_line);
            self.take_line(line.strip_suffix('\r').unwrap_or(&line));
        }
        if self.data_lines.is_empty() {
            None
        } else {
            Some(Frame::from_payload(self.data_lines.drain(..).collect::<Vec<_>>().join("\n")))
        }
    }

    /// Returns a frame when `line` is the blank boundary of a non-empty
    /// frame.
    fn take_line(&mut self, line: &str) -> Option<Frame> {
        if line.is_empty() {
            if self.data_lines.is_empty() {
                return None;
            }
            let payload = self.data_lines.drain(..).collect::<Vec<_>>().join("\n");
            return Some(Frame::from_payload(payload));
        }

        if line.starts_with(':') {
            return None;
        }

        if let Some(rest) = line.strip_prefix("data:") {
            self.data_lines.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
        // Fields other than data (event, id, retry) are not used by this
        // wire format and are ignored.
        None
    }
}
