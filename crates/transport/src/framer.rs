//! Incremental framing of back-to-back JSON values
//!
//! Messages on the wire carry no length prefix and no delimiter: a message
//! ends where its top-level JSON value closes. [`StreamFramer`] scans the
//! bytes as they arrive, tracking nesting, string and escape state, and
//! hands every structurally complete value to `serde_json` for parsing.

use std::collections::VecDeque;

use bytes::{Buf, BytesMut};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    /// Between values, the buffer starts at the next unread byte
    Idle,
    /// Inside an object or array
    Container { depth: usize },
    /// Inside a top-level string
    Text,
    /// Inside a bare number or literal
    Scalar,
}

/// Splits a byte stream into complete top-level JSON values
///
/// Bytes are fed with [`StreamFramer::write`] in whatever chunks the socket
/// produced them; completed values queue up in arrival order until the
/// caller takes them with [`StreamFramer::pop`] or [`StreamFramer::drain`].
/// The queue is unbounded, so callers are expected to drain after every
/// write.
///
/// ```
/// use transport::StreamFramer;
///
/// let mut framer = StreamFramer::new();
/// framer.write(br#"{"type":"ru"#);
/// assert!(framer.is_empty());
/// framer.write(br#"n"}{"type":"break"}"#);
/// assert_eq!(framer.len(), 2);
/// ```
#[derive(Debug)]
pub struct StreamFramer {
    buffer: BytesMut,
    // number of bytes of `buffer` belonging to the value being scanned
    cursor: usize,
    token: Token,
    in_string: bool,
    escaped: bool,
    values: VecDeque<Value>,
    discarded: usize,
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFramer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            cursor: 0,
            token: Token::Idle,
            in_string: false,
            escaped: false,
            values: VecDeque::new(),
            discarded: 0,
        }
    }

    /// Feed more bytes from the stream
    pub fn write(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);

        while self.cursor < self.buffer.len() {
            let byte = self.buffer[self.cursor];
            match self.token {
                Token::Idle => {
                    if byte.is_ascii_whitespace() {
                        self.buffer.advance(1);
                        continue;
                    }
                    match byte {
                        b'{' | b'[' => self.token = Token::Container { depth: 1 },
                        b'"' => self.token = Token::Text,
                        b'}' | b']' | b',' | b':' => {
                            tracing::warn!(byte = %char::from(byte), "discarding stray byte between values");
                            self.discarded += 1;
                            self.buffer.advance(1);
                            continue;
                        }
                        _ => self.token = Token::Scalar,
                    }
                    self.cursor = 1;
                }
                Token::Container { depth } => {
                    self.cursor += 1;
                    if self.in_string {
                        self.scan_string_byte(byte);
                        continue;
                    }
                    match byte {
                        b'"' => self.in_string = true,
                        b'{' | b'[' => self.token = Token::Container { depth: depth + 1 },
                        b'}' | b']' if depth == 1 => self.complete(self.cursor),
                        b'}' | b']' => self.token = Token::Container { depth: depth - 1 },
                        _ => {}
                    }
                }
                Token::Text => {
                    self.cursor += 1;
                    // the opening quote was consumed when the token started
                    self.in_string = true;
                    self.scan_string_byte(byte);
                    if !self.in_string {
                        self.complete(self.cursor);
                    }
                }
                Token::Scalar => {
                    if byte.is_ascii_whitespace() || b"{}[],:\"".contains(&byte) {
                        // the terminating byte belongs to whatever comes next
                        self.complete(self.cursor);
                    } else {
                        self.cursor += 1;
                    }
                }
            }
        }
    }

    fn scan_string_byte(&mut self, byte: u8) {
        if self.escaped {
            self.escaped = false;
        } else if byte == b'\\' {
            self.escaped = true;
        } else if byte == b'"' {
            self.in_string = false;
        }
    }

    fn complete(&mut self, end: usize) {
        let chunk = self.buffer.split_to(end);
        self.cursor = 0;
        self.token = Token::Idle;
        self.in_string = false;
        self.escaped = false;

        match serde_json::from_slice::<Value>(&chunk) {
            Ok(value) => {
                tracing::trace!(bytes = chunk.len(), "framed value");
                self.values.push_back(value);
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    content = %String::from_utf8_lossy(&chunk),
                    "discarding malformed value"
                );
                self.discarded += 1;
            }
        }
    }

    /// Take the oldest complete value
    pub fn pop(&mut self) -> Option<Value> {
        self.values.pop_front()
    }

    /// Take every complete value in arrival order
    pub fn drain(&mut self) -> impl Iterator<Item = Value> + '_ {
        self.values.drain(..)
    }

    /// Number of complete values waiting to be taken
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bytes held for a value that has not closed yet
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// How many malformed values or stray bytes have been thrown away
    pub fn discarded(&self) -> usize {
        self.discarded
    }
}
