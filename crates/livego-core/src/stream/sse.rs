//! Text event stream framing
//!
//! [`SseDecoder`] turns a byte stream into [`RawFrame`]s. It understands the
//! `event`, `data` and `id` fields, ignores comments and `retry` (the channel
//! owns its own backoff), and dispatches a frame on each blank line.
//! A leading byte order mark is skipped and lines longer than the decoder's
//! limit fail the stream.

use std::io;
use std::mem;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Event type used for frames that carry no explicit name
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// Default cap on a single line, terminator excluded
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

const BOM: char = '\u{FEFF}';

/// One undecoded frame from the push channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl RawFrame {
    pub fn new(event: Option<&str>, data: impl Into<String>) -> Self {
        Self {
            event: event.map(str::to_string),
            data: data.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The frame's event name, or `"message"` when it has none.
    pub fn event_type(&self) -> &str {
        self.event.as_deref().unwrap_or(DEFAULT_EVENT_TYPE)
    }
}

/// Incremental decoder for `text/event-stream` bodies
#[derive(Debug)]
pub struct SseDecoder {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    max_line_length: usize,
    seen_first_line: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            event: None,
            data: Vec::new(),
            id: None,
            max_line_length,
            seen_first_line: false,
        }
    }

    fn line_too_long(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("event stream line exceeds {} bytes", self.max_line_length),
        )
    }

    /// Apply one line; returns a frame when the line completes one.
    fn process_line(&mut self, line: &str) -> Option<RawFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" if !value.contains('\0') => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<RawFrame> {
        let event = self.event.take().filter(|name| !name.is_empty());
        let id = self.id.take();
        if self.data.is_empty() {
            return None;
        }
        let data = mem::take(&mut self.data).join("\n");
        Some(RawFrame { event, data, id })
    }
}

impl Decoder for SseDecoder {
    type Item = RawFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>, io::Error> {
        while let Some(newline) = src.iter().position(|b| *b == b'\n') {
            let mut line = src.split_to(newline + 1);
            line.truncate(newline);
            if line.last() == Some(&b'\r') {
                line.truncate(newline - 1);
            }
            if line.len() > self.max_line_length {
                return Err(self.line_too_long());
            }
            let line = String::from_utf8_lossy(&line);
            let line = if self.seen_first_line {
                &*line
            } else {
                self.seen_first_line = true;
                line.strip_prefix(BOM).unwrap_or(&*line)
            };
            if let Some(frame) = self.process_line(line) {
                return Ok(Some(frame));
            }
        }
        // `+ 1` leaves room for a trailing `\r` still waiting on its `\n`.
        if src.len() > self.max_line_length + 1 {
            return Err(self.line_too_long());
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>, io::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        // An unterminated trailing frame is discarded.
        src.advance(src.len());
        *self = Self::with_max_line_length(self.max_line_length);
        Ok(None)
    }
}
