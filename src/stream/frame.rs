use bytes::BytesMut;

/// Bytes of an oversized frame kept for the error report
const OVERSIZED_HEAD: usize = 256;

/// A complete frame cut from the byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// A frame longer than the limit; `len` is how much was seen before it
    /// was given up on
    Oversized { len: usize, head: String },
    /// A frame that is not valid UTF-8; `raw` is a lossy rendering
    Undecodable { raw: String, reason: String },
}

/// Splits a chunked body into newline-delimited frames.
///
/// Chunk boundaries are arbitrary: a frame may arrive in many pieces and one
/// chunk may carry many frames. Surrounding whitespace (including `\r`) is
/// trimmed and blank lines are skipped. At most one partial frame is
/// buffered, bounded by `max_frame_len`.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    scanned: usize,
    max_frame_len: usize,
    discarding: bool,
}

impl FrameDecoder {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            max_frame_len,
            discarding: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete frame, or `None` until more bytes are pushed
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') else {
                return self.incomplete();
            };

            let line = self.buffer.split_to(self.scanned + offset + 1);
            self.scanned = 0;
            if self.discarding {
                self.discarding = false;
                continue;
            }

            let text = trim(&line);
            if text.is_empty() {
                continue;
            }
            if text.len() > self.max_frame_len {
                return Some(oversized(text));
            }
            return Some(match std::str::from_utf8(text) {
                Ok(text) => Frame::Text(text.to_string()),
                Err(e) => Frame::Undecodable {
                    raw: String::from_utf8_lossy(text).into_owned(),
                    reason: format!("invalid UTF-8: {}", e),
                },
            });
        }
    }

    /// Bytes currently held for an unfinished frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame, e.g. after the connection was replaced
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.discarding = false;
    }

    fn incomplete(&mut self) -> Option<Frame> {
        if self.discarding {
            self.buffer.clear();
            self.scanned = 0;
            return None;
        }
        if self.buffer.len() > self.max_frame_len {
            let frame = oversized(&self.buffer);
            self.buffer.clear();
            self.scanned = 0;
            self.discarding = true;
            return Some(frame);
        }
        self.scanned = self.buffer.len();
        None
    }
}

fn oversized(bytes: &[u8]) -> Frame {
    let head = &bytes[..bytes.len().min(OVERSIZED_HEAD)];
    Frame::Oversized {
        len: bytes.len(),
        head: String::from_utf8_lossy(head).into_owned(),
    }
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Option<Frame> {
        Some(Frame::Text(s.to_string()))
    }

    #[test]
    fn test_frames_split_across_chunks() {
        let mut decoder = FrameDecoder::new(1024);
        decoder.push(b"{\"Heart");
        assert_eq!(decoder.next_frame(), None);
        decoder.push(b"beat\":1}\n{\"Sym");
        assert_eq!(decoder.next_frame(), text("{\"Heartbeat\":1}"));
        assert_eq!(decoder.next_frame(), None);
        decoder.push(b"bol\":\"MSFT\"}\n");
        assert_eq!(decoder.next_frame(), text("{\"Symbol\":\"MSFT\"}"));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_many_frames_in_one_chunk() {
        let mut decoder = FrameDecoder::new(1024);
        decoder.push(b"{\"a\":1}\r\n\r\n  \n{\"b\":2}\n{\"c\"");
        assert_eq!(decoder.next_frame(), text("{\"a\":1}"));
        assert_eq!(decoder.next_frame(), text("{\"b\":2}"));
        assert_eq!(decoder.next_frame(), None);
        assert_eq!(decoder.buffered(), 4);
    }

    #[test]
    fn test_oversized_complete_line() {
        let mut decoder = FrameDecoder::new(8);
        decoder.push(b"0123456789\n{\"a\":1}\n");
        assert!(matches!(decoder.next_frame(), Some(Frame::Oversized { len: 10, .. })));
        assert_eq!(decoder.next_frame(), text("{\"a\":1}"));
    }

    #[test]
    fn test_oversized_partial_is_reported_once() {
        let mut decoder = FrameDecoder::new(8);
        decoder.push(b"0123456789");
        assert!(matches!(decoder.next_frame(), Some(Frame::Oversized { .. })));
        assert_eq!(decoder.buffered(), 0);

        decoder.push(b"abcdefghijkl");
        assert_eq!(decoder.next_frame(), None);
        decoder.push(b"xyz\n{\"ok\":1}\n");
        assert_eq!(decoder.next_frame(), text("{\"ok\":1}"));
        assert_eq!(decoder.next_frame(), None);
    }

    #[test]
    fn test_invalid_utf8_is_not_text() {
        let mut decoder = FrameDecoder::new(64);
        decoder.push(b"{\"Symbol\":\"MS\xffFT\"}\n{\"ok\":1}\n");
        match decoder.next_frame() {
            Some(Frame::Undecodable { raw, reason }) => {
                assert_eq!(raw, "{\"Symbol\":\"MS\u{fffd}FT\"}");
                assert!(reason.starts_with("invalid UTF-8"));
            }
            other => panic!("expected undecodable frame, got {:?}", other),
        }
        assert_eq!(decoder.next_frame(), text("{\"ok\":1}"));
    }

    #[test]
    fn test_clear_drops_partial_frame() {
        let mut decoder = FrameDecoder::new(64);
        decoder.push(b"{\"partial\":");
        assert_eq!(decoder.next_frame(), None);
        decoder.clear();
        decoder.push(b"{\"fresh\":1}\n");
        assert_eq!(decoder.next_frame(), text("{\"fresh\":1}"));
    }
}
