//! Frame reader for server-pushed event streams.
//!
//! A frame is the text between two blank-line separators (`\n\n`, or
//! `\r\n\r\n`). Raw bytes are buffered until a separator has been seen, so a
//! network chunk may end anywhere: mid separator, mid line, or in the middle
//! of a multi-byte character. Only frames whose first line carries the
//! `data: ` prefix are forwarded.
//!
//! # Example
//!
//! ```
//! use agentwire_core::frame::FrameReader;
//!
//! let mut reader = FrameReader::new();
//! assert!(reader.push(b"data: {\"type\":\"RUN_").is_empty());
//!
//! let frames = reader.push(b"STARTED\"}\n\n");
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].data, r#"{"type":"RUN_STARTED"}"#);
//! ```

use std::borrow::Cow;

/// Prefix that marks a payload line.
pub const DATA_PREFIX: &str = "data: ";

/// A complete frame with a `data: ` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload with the `data: ` prefix removed. Multiple payload lines are
    /// joined with `\n`.
    pub data: String,
}

/// Incremental frame reader.
///
/// One reader belongs to one connection. Call [`FrameReader::finish`] when
/// the connection ends and [`FrameReader::reset`] before reusing it.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,
    // Bytes before this offset cannot start a separator.
    scanned: usize,
}

impl FrameReader {
    /// Create an empty reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some((idx, sep_len)) = find_separator(&self.buf, self.scanned) {
            let raw: Vec<u8> = self.buf.drain(..idx + sep_len).take(idx).collect();
            self.scanned = 0;
            if let Some(frame) = parse_frame(&raw) {
                frames.push(frame);
            }
        }

        // A separator is at most four bytes, so the tail must be rescanned.
        self.scanned = self.buf.len().saturating_sub(3);
        frames
    }

    /// Append already-decoded text.
    pub fn push_str(&mut self, text: &str) -> Vec<Frame> {
        self.push(text.as_bytes())
    }

    /// Number of buffered bytes that do not yet form a complete frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// End of stream. A trailing partial frame cannot be interpreted and is
    /// dropped; returns how many bytes were discarded.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buf.len();
        if discarded > 0 {
            log::debug!("discarding {} bytes of incomplete frame at end of stream", discarded);
        }
        self.reset();
        discarded
    }

    /// Forget all buffered input.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.scanned = 0;
    }
}

/// Locate the first frame separator at or after `from`.
///
/// Returns the separator's offset and its length in bytes.
fn find_separator(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if buf[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

/// Extract the payload of one frame, or `None` if it is not a data frame.
fn parse_frame(raw: &[u8]) -> Option<Frame> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => Cow::Borrowed(text),
        Err(e) => {
            log::warn!("frame is not valid UTF-8 ({}), decoding lossily", e);
            String::from_utf8_lossy(raw)
        }
    };

    let mut lines = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line));

    let first = lines.next()?;
    let Some(payload) = first.strip_prefix(DATA_PREFIX) else {
        if !first.is_empty() {
            log::debug!("skipping non-data frame: {:.60}", first);
        }
        return None;
    };

    let mut data = payload.to_string();
    for line in lines {
        if let Some(more) = line.strip_prefix(DATA_PREFIX) {
            data.push('\n');
            data.push_str(more);
        }
    }

    Some(Frame { data })
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
